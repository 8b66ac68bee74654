pub mod client;
pub mod logging;
pub mod push;

pub use client::HttpBackend;
pub use push::WebSocketConnector;
