use crate::backend::TelemetryBackend;
use crate::error::FetchError;
use crate::model::{NormalizedSpan, RawSpan, RawTrace, SpanKind, TraceContext};
use std::sync::Arc;

/// Fetches raw traces and turns them into waterfall-ready contexts.
#[derive(Clone)]
pub struct TraceInspector {
    backend: Arc<dyn TelemetryBackend>,
    gateway_service: String,
}

impl TraceInspector {
    pub fn new(backend: Arc<dyn TelemetryBackend>, gateway_service: impl Into<String>) -> Self {
        Self {
            backend,
            gateway_service: gateway_service.into(),
        }
    }

    pub fn gateway_service(&self) -> &str {
        &self.gateway_service
    }

    /// Fetch and normalize one trace. On failure nothing is produced; the
    /// caller keeps whatever context it already had.
    pub async fn load_trace(&self, trace_id: &str) -> Result<TraceContext, FetchError> {
        let raw = self.backend.fetch_trace(trace_id).await?;
        Ok(normalize(trace_id, raw, &self.gateway_service))
    }
}

/// Build a [`TraceContext`] from a raw trace.
///
/// Spans are stably sorted by `start_time` and positioned relative to the
/// earliest one. Offsets plus durations are allowed to exceed the trace's
/// `duration_ms`; nothing is clamped.
pub fn normalize(trace_id: &str, raw: RawTrace, gateway_service: &str) -> TraceContext {
    let RawTrace {
        duration_ms,
        mut spans,
    } = raw;

    let first_start = spans.iter().map(|s| s.start_time).min();
    spans.sort_by_key(|s| s.start_time);

    let spans = spans
        .into_iter()
        .map(|span| {
            let start_offset_ms = first_start
                .map(|first| offset_ms(&span, first))
                .unwrap_or(0.0);
            let kind = classify(&span.name, &span.service, gateway_service);
            NormalizedSpan {
                name: span.name,
                service: span.service,
                start_offset_ms,
                duration_ms: span.duration_ms,
                kind,
            }
        })
        .collect();

    TraceContext {
        trace_id: trace_id.to_string(),
        duration_ms,
        spans,
    }
}

/// Gateway spans are API calls; anything with "db" in its name is treated
/// as a database call; the rest are plain service work. A span from a
/// service called e.g. `db-service` whose name lacks "db" is SERVICE.
pub fn classify(name: &str, service: &str, gateway_service: &str) -> SpanKind {
    if service == gateway_service {
        SpanKind::Api
    } else if name.contains("db") {
        SpanKind::Database
    } else {
        SpanKind::Service
    }
}

fn offset_ms(span: &RawSpan, first: chrono::DateTime<chrono::Utc>) -> f64 {
    let delta = span.start_time - first;
    match delta.num_microseconds() {
        Some(us) => (us as f64 / 1_000.0).max(0.0),
        None => delta.num_milliseconds().max(0) as f64,
    }
}
