use crate::backend::TelemetryBackend;
use crate::error::FetchError;
use crate::model::{LogEntry, Severity};
use std::sync::Arc;

/// Fetches the logs correlated with a trace.
#[derive(Clone)]
pub struct LogCorrelator {
    backend: Arc<dyn TelemetryBackend>,
}

impl LogCorrelator {
    pub fn new(backend: Arc<dyn TelemetryBackend>) -> Self {
        Self { backend }
    }

    /// Logs for `trace_id` in the order the backend returned them. Not
    /// re-sorted by timestamp.
    pub async fn load_logs(&self, trace_id: &str) -> Result<Vec<LogEntry>, FetchError> {
        self.backend.fetch_logs(trace_id).await
    }
}

/// Per-severity counts for a log view, in display order.
pub fn severity_breakdown(logs: &[LogEntry]) -> Vec<(Severity, usize)> {
    const ORDER: [Severity; 6] = [
        Severity::Fatal,
        Severity::Error,
        Severity::Warning,
        Severity::Warn,
        Severity::Info,
        Severity::Debug,
    ];

    ORDER
        .iter()
        .map(|level| {
            let count = logs
                .iter()
                .filter(|entry| entry.severity.display_level() == *level)
                .count();
            (*level, count)
        })
        .filter(|(_, count)| *count > 0)
        .collect()
}
