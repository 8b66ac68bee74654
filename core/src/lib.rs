pub mod backend;
pub mod config;
pub mod connection;
pub mod error;
pub mod live;
pub mod logs;
pub mod model;
pub mod rca;
pub mod session;
pub mod store;
pub mod trace;

#[cfg(test)]
mod testing;

pub use backend::{PushConnector, PushStream, TelemetryBackend};
pub use config::Config;
pub use connection::{
    parse_message, ConnectionHandle, ConnectionManager, ConnectionState, LiveEvent,
};
pub use error::{AnalysisError, ChannelError, FetchError};
pub use live::LiveFeed;
pub use logs::LogCorrelator;
pub use model::{
    Anomaly, LogEntry, MetricSample, NormalizedSpan, PushMessage, RawSpan, RawTrace, RcaResult,
    Severity, SpanKind, TraceContext,
};
pub use rca::{AnalysisRequest, AnalysisStatus, AnalysisTicket, RcaOrchestrator};
pub use session::{Completion, CompletionKind, InvestigationSession, SelectionTicket, ViewTab};
pub use store::{IncidentStore, MetricStore, MonitoringMode, ServiceScope};
pub use trace::TraceInspector;
