use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// A recorded incident: a request that exceeded expected latency or was
/// otherwise flagged upstream. Identified by its `trace_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub service: String,
    pub route: String,
    pub trace_id: String,
    pub duration_ms: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anomaly_score: Option<f64>,
    /// SQLite-backed snapshots report this as `0`/`1`, push events as a bool.
    #[serde(default = "default_true", deserialize_with = "deserialize_flag")]
    pub is_anomaly: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub service: String,
    pub metric_type: String,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// One span as delivered by the trace source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSpan {
    pub name: String,
    pub service: String,
    pub start_time: DateTime<Utc>,
    pub duration_ms: f64,
}

/// Body of `GET /api/traces/{trace_id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTrace {
    pub duration_ms: f64,
    #[serde(default)]
    pub spans: Vec<RawSpan>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SpanKind {
    Api,
    Database,
    Service,
}

impl fmt::Display for SpanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SpanKind::Api => "API",
            SpanKind::Database => "DATABASE",
            SpanKind::Service => "SERVICE",
        };
        f.write_str(label)
    }
}

/// A span positioned on the waterfall, relative to the earliest span of its trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedSpan {
    pub name: String,
    pub service: String,
    pub start_offset_ms: f64,
    pub duration_ms: f64,
    pub kind: SpanKind,
}

/// Waterfall-ready view of one trace. Replaced wholesale on every new
/// selection and sent verbatim as the RCA request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceContext {
    pub trace_id: String,
    pub duration_ms: f64,
    pub spans: Vec<NormalizedSpan>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Warn,
    Error,
    Fatal,
    #[serde(other)]
    Unknown,
}

impl Severity {
    /// Severity used when presenting the entry. Unrecognised levels are
    /// shown as INFO.
    pub fn display_level(self) -> Severity {
        match self {
            Severity::Unknown => Severity::Info,
            other => other,
        }
    }

    pub fn is_error(self) -> bool {
        matches!(self, Severity::Error | Severity::Fatal)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.display_level() {
            Severity::Debug => "DEBUG",
            Severity::Warning => "WARNING",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
            Severity::Info | Severity::Unknown => "INFO",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub service_name: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span_id: Option<String>,
}

/// AI-generated root-cause explanation for one trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RcaResult {
    pub root_cause: String,
    #[serde(default)]
    pub suggested_fixes: Vec<String>,
    pub risk_prediction: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// Inbound push-channel frame, discriminated by its `type` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum PushMessage {
    History(Vec<Anomaly>),
    NewAnomaly(Anomaly),
    MetricUpdate(MetricSample),
}

fn default_true() -> bool {
    true
}

fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(value) => value,
        Flag::Int(value) => value != 0,
    })
}
