//! Scripted backend for unit tests: per-trace canned responses with delays,
//! driven under a paused tokio clock.

use crate::backend::TelemetryBackend;
use crate::error::{AnalysisError, FetchError};
use crate::model::{
    Anomaly, LogEntry, MetricSample, RawSpan, RawTrace, RcaResult, Severity, TraceContext,
};
use crate::store::{MonitoringMode, ServiceScope};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

type Scripted<T> = (Duration, Result<T, FetchError>);

#[derive(Default)]
pub(crate) struct ScriptedBackend {
    traces: Mutex<HashMap<String, Scripted<RawTrace>>>,
    logs: Mutex<HashMap<String, Scripted<Vec<LogEntry>>>>,
    alerts: Mutex<Vec<Anomaly>>,
    metrics: Mutex<Vec<MetricSample>>,
    rca_delay: Mutex<Duration>,
    rca_fails: Mutex<bool>,
    pub rca_calls: AtomicUsize,
    pub trace_calls: AtomicUsize,
    pub log_calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_trace(self, trace_id: &str, delay_ms: u64, trace: RawTrace) -> Self {
        self.traces
            .lock()
            .unwrap()
            .insert(trace_id.into(), (Duration::from_millis(delay_ms), Ok(trace)));
        self
    }

    pub fn with_trace_error(self, trace_id: &str, delay_ms: u64, err: FetchError) -> Self {
        self.traces
            .lock()
            .unwrap()
            .insert(trace_id.into(), (Duration::from_millis(delay_ms), Err(err)));
        self
    }

    pub fn with_logs(self, trace_id: &str, delay_ms: u64, logs: Vec<LogEntry>) -> Self {
        self.logs
            .lock()
            .unwrap()
            .insert(trace_id.into(), (Duration::from_millis(delay_ms), Ok(logs)));
        self
    }

    pub fn with_rca_delay(self, delay_ms: u64) -> Self {
        *self.rca_delay.lock().unwrap() = Duration::from_millis(delay_ms);
        self
    }

    pub fn with_failing_rca(self) -> Self {
        *self.rca_fails.lock().unwrap() = true;
        self
    }

    pub fn with_alerts(self, alerts: Vec<Anomaly>) -> Self {
        *self.alerts.lock().unwrap() = alerts;
        self
    }

    pub fn with_metrics(self, metrics: Vec<MetricSample>) -> Self {
        *self.metrics.lock().unwrap() = metrics;
        self
    }

    pub fn rca_calls(&self) -> usize {
        self.rca_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TelemetryBackend for ScriptedBackend {
    async fn fetch_alerts(&self) -> Result<Vec<Anomaly>, FetchError> {
        Ok(self.alerts.lock().unwrap().clone())
    }

    async fn fetch_metrics(
        &self,
        scope: &ServiceScope,
        mode: MonitoringMode,
    ) -> Result<Vec<MetricSample>, FetchError> {
        let metrics = self.metrics.lock().unwrap();
        Ok(metrics
            .iter()
            .filter(|m| scope.matches(&m.service) && m.metric_type == mode.metric_type())
            .cloned()
            .collect())
    }

    async fn fetch_trace(&self, trace_id: &str) -> Result<RawTrace, FetchError> {
        self.trace_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.traces.lock().unwrap().get(trace_id).cloned();
        match scripted {
            Some((delay, outcome)) => {
                tokio::time::sleep(delay).await;
                outcome
            }
            None => Err(FetchError::Status {
                url: format!("/api/traces/{}", trace_id),
                status: 404,
            }),
        }
    }

    async fn fetch_logs(&self, trace_id: &str) -> Result<Vec<LogEntry>, FetchError> {
        self.log_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.logs.lock().unwrap().get(trace_id).cloned();
        match scripted {
            Some((delay, outcome)) => {
                tokio::time::sleep(delay).await;
                outcome
            }
            None => Ok(vec![]),
        }
    }

    async fn request_rca(&self, context: &TraceContext) -> Result<RcaResult, AnalysisError> {
        self.rca_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.rca_delay.lock().unwrap();
        tokio::time::sleep(delay).await;
        if *self.rca_fails.lock().unwrap() {
            return Err(AnalysisError::Rejected("Gemini API not configured".into()));
        }
        Ok(RcaResult {
            root_cause: format!("connection pool exhausted in {}", context.trace_id),
            suggested_fixes: vec!["raise pool size".into(), "add timeouts".into()],
            risk_prediction: "checkout requests keep timing out".into(),
            confidence: Some(0.8),
        })
    }
}

pub(crate) fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
}

pub(crate) fn anomaly(trace_id: &str) -> Anomaly {
    Anomaly {
        service: "python-service".into(),
        route: "/quote".into(),
        trace_id: trace_id.into(),
        duration_ms: 750.0,
        timestamp: base_time(),
        anomaly_score: Some(0.97),
        is_anomaly: true,
    }
}

/// Two-span trace whose root span is named after the trace id.
pub(crate) fn raw_trace(trace_id: &str) -> RawTrace {
    RawTrace {
        duration_ms: 40.0,
        spans: vec![
            RawSpan {
                name: format!("db.query {}", trace_id),
                service: "python-service".into(),
                start_time: base_time() + chrono::Duration::milliseconds(10),
                duration_ms: 25.0,
            },
            RawSpan {
                name: format!("GET /quote {}", trace_id),
                service: "api-gateway".into(),
                start_time: base_time(),
                duration_ms: 40.0,
            },
        ],
    }
}

pub(crate) fn log_line(trace_id: &str, body: &str) -> LogEntry {
    LogEntry {
        timestamp: base_time(),
        severity: Severity::Error,
        service_name: "python-service".into(),
        body: body.into(),
        trace_id: Some(trace_id.into()),
        span_id: None,
    }
}
