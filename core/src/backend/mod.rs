mod backend_trait;
mod push;

pub use backend_trait::TelemetryBackend;
pub use push::{PushConnector, PushStream};
