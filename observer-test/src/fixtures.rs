use chrono::{DateTime, Duration, TimeZone, Utc};
use observer_core::{
    Anomaly, LiveFeed, LogEntry, MetricSample, RawSpan, RawTrace, RcaResult, Severity,
};
use serde_json::{json, Value};

pub const GATEWAY: &str = "api-gateway";

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
}

/// Trace ids of the tracked incidents, newest first.
pub fn trace_ids(feed: &LiveFeed) -> Vec<&str> {
    feed.incidents()
        .iter()
        .map(|a| a.trace_id.as_str())
        .collect()
}

pub fn anomaly(trace_id: &str, service: &str) -> Anomaly {
    Anomaly {
        service: service.into(),
        route: "/checkout".into(),
        trace_id: trace_id.into(),
        duration_ms: 812.5,
        timestamp: base_time(),
        anomaly_score: Some(0.93),
        is_anomaly: true,
    }
}

/// An alert row as the backend stores it: integer flag, serialized spans
/// alongside the parsed ones.
pub fn stored_alert_row(trace_id: &str) -> Value {
    json!({
        "id": 7,
        "trace_id": trace_id,
        "service": "python-service",
        "route": "/quote",
        "duration_ms": 1204.0,
        "timestamp": "2024-01-01T12:00:00.250000+00:00",
        "anomaly_score": 0.99,
        "is_anomaly": 1,
        "spans_json": "[]",
        "spans": []
    })
}

pub fn metric(service: &str, metric_type: &str, value: f64, second: i64) -> MetricSample {
    MetricSample {
        service: service.into(),
        metric_type: metric_type.into(),
        timestamp: base_time() + Duration::seconds(second),
        value,
    }
}

/// Checkout trace delivered out of order: the gateway root, a database
/// query and a downstream call.
pub struct TraceFixture {
    pub trace_id: String,
    pub raw: RawTrace,
    pub expected_order: Vec<&'static str>,
    pub expected_offsets: Vec<f64>,
}

pub fn checkout_trace(trace_id: &str) -> TraceFixture {
    let span = |name: &str, service: &str, offset_ms: i64, duration_ms: f64| RawSpan {
        name: name.into(),
        service: service.into(),
        start_time: base_time() + Duration::milliseconds(offset_ms),
        duration_ms,
    };

    TraceFixture {
        trace_id: trace_id.into(),
        raw: RawTrace {
            duration_ms: 812.5,
            spans: vec![
                span("POST /charge", "node-service", 300, 500.0),
                span("POST /checkout", GATEWAY, 0, 812.5),
                span("db.select quotes", "python-service", 20, 250.0),
            ],
        },
        expected_order: vec!["POST /checkout", "db.select quotes", "POST /charge"],
        expected_offsets: vec![0.0, 20.0, 300.0],
    }
}

pub fn log_line(trace_id: &str, severity: Severity, service: &str, body: &str) -> LogEntry {
    LogEntry {
        timestamp: base_time(),
        severity,
        service_name: service.into(),
        body: body.into(),
        trace_id: Some(trace_id.into()),
        span_id: Some("00f067aa0ba902b7".into()),
    }
}

pub fn rca_answer() -> RcaResult {
    RcaResult {
        root_cause: "quote lookups hold a connection for the whole request".into(),
        suggested_fixes: vec![
            "release the connection before calling node-service".into(),
            "add an index on quotes.symbol".into(),
        ],
        risk_prediction: "checkout p99 will breach the SLO under peak load".into(),
        confidence: Some(0.82),
    }
}
