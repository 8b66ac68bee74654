use crate::error::{AnalysisError, FetchError};
use crate::model::{Anomaly, LogEntry, MetricSample, RawTrace, RcaResult, TraceContext};
use crate::store::{MonitoringMode, ServiceScope};
use async_trait::async_trait;

/// Request/response collaborators behind the investigation client.
/// Implementations perform I/O only; ordering, caching and staleness are
/// handled by the callers in this crate.
#[async_trait]
pub trait TelemetryBackend: Send + Sync {
    // ========================================================================
    // Snapshots
    // ========================================================================

    /// `GET /api/alerts`: newest-first anomaly snapshot
    async fn fetch_alerts(&self) -> Result<Vec<Anomaly>, FetchError>;

    /// `GET /api/metrics/{service}/{metric_type}`: oldest-first samples for
    /// the scope and the metric type the mode charts
    async fn fetch_metrics(
        &self,
        scope: &ServiceScope,
        mode: MonitoringMode,
    ) -> Result<Vec<MetricSample>, FetchError>;

    // ========================================================================
    // Investigation
    // ========================================================================

    /// `GET /api/traces/{trace_id}`
    async fn fetch_trace(&self, trace_id: &str) -> Result<RawTrace, FetchError>;

    /// `GET /api/logs?trace_id={trace_id}`, in arrival order
    async fn fetch_logs(&self, trace_id: &str) -> Result<Vec<LogEntry>, FetchError>;

    /// `POST /api/rca/{trace_id}` with the full context as body
    async fn request_rca(&self, context: &TraceContext) -> Result<RcaResult, AnalysisError>;
}
