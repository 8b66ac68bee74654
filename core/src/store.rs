use crate::model::{Anomaly, MetricSample};
use serde::{Deserialize, Serialize};
use std::collections::vec_deque::{self, VecDeque};
use std::fmt;
use std::str::FromStr;

/// Anomalies kept for the incident list, newest first.
pub const INCIDENT_CAPACITY: usize = 50;
/// Metric samples kept for charting, oldest first.
pub const METRIC_CAPACITY: usize = 60;
/// Samples shown by a single chart.
pub const CHART_WINDOW: usize = 30;

pub const P99_LATENCY: &str = "p99_latency";
pub const REDACTION_COUNT: &str = "redaction_count";

const ALL_SERVICES: &str = "All Services";

/// Ordered container that never holds more than `capacity` items.
#[derive(Debug, Clone)]
pub struct BoundedBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedBuffer<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Insert at the front, trimming the tail. Returns the evicted item, if any.
    pub fn push_front_capped(&mut self, item: T) -> Option<T> {
        if self.capacity == 0 {
            return Some(item);
        }
        self.items.push_front(item);
        if self.items.len() > self.capacity {
            self.items.pop_back()
        } else {
            None
        }
    }

    /// Insert at the back, trimming the head. Returns the evicted item, if any.
    pub fn push_back_capped(&mut self, item: T) -> Option<T> {
        if self.capacity == 0 {
            return Some(item);
        }
        self.items.push_back(item);
        if self.items.len() > self.capacity {
            self.items.pop_front()
        } else {
            None
        }
    }

    /// Replace the contents, keeping the first `capacity` items.
    pub fn replace_keep_front(&mut self, items: impl IntoIterator<Item = T>) {
        self.items = items.into_iter().take(self.capacity).collect();
    }

    /// Replace the contents, keeping the last `capacity` items.
    pub fn replace_keep_back(&mut self, items: impl IntoIterator<Item = T>) {
        let mut items: VecDeque<T> = items.into_iter().collect();
        while items.len() > self.capacity {
            items.pop_front();
        }
        self.items = items;
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn iter(&self) -> vec_deque::Iter<'_, T> {
        self.items.iter()
    }
}

/// Anomalies, most recent first, capped at [`INCIDENT_CAPACITY`].
#[derive(Debug, Clone)]
pub struct IncidentStore {
    buffer: BoundedBuffer<Anomaly>,
}

impl IncidentStore {
    pub fn new() -> Self {
        Self {
            buffer: BoundedBuffer::with_capacity(INCIDENT_CAPACITY),
        }
    }

    /// Authoritative snapshot: discards everything held before. The snapshot
    /// is already newest-first, so only its head is kept.
    pub fn replace(&mut self, anomalies: Vec<Anomaly>) {
        self.buffer.replace_keep_front(anomalies);
    }

    pub fn push_front_capped(&mut self, anomaly: Anomaly) -> Option<Anomaly> {
        self.buffer.push_front_capped(anomaly)
    }

    pub fn find(&self, trace_id: &str) -> Option<&Anomaly> {
        self.buffer.iter().find(|a| a.trace_id == trace_id)
    }

    pub fn latest(&self) -> Option<&Anomaly> {
        self.buffer.get(0)
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Anomaly> {
        self.buffer.iter()
    }
}

impl Default for IncidentStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Metric samples in arrival order, capped at [`METRIC_CAPACITY`].
#[derive(Debug, Clone)]
pub struct MetricStore {
    buffer: BoundedBuffer<MetricSample>,
}

impl MetricStore {
    pub fn new() -> Self {
        Self {
            buffer: BoundedBuffer::with_capacity(METRIC_CAPACITY),
        }
    }

    /// Snapshot replacement; the snapshot is oldest-first so its tail is kept.
    pub fn replace(&mut self, samples: Vec<MetricSample>) {
        self.buffer.replace_keep_back(samples);
    }

    pub fn push_back_capped(&mut self, sample: MetricSample) -> Option<MetricSample> {
        self.buffer.push_back_capped(sample)
    }

    /// Read-only projection onto one service scope and the metric type the
    /// monitoring mode charts.
    pub fn filter<'a>(
        &'a self,
        scope: &ServiceScope,
        mode: MonitoringMode,
    ) -> impl Iterator<Item = &'a MetricSample> + 'a {
        let scope = scope.clone();
        let metric_type = mode.metric_type();
        self.buffer
            .iter()
            .filter(move |m| scope.matches(&m.service) && m.metric_type == metric_type)
    }

    /// The most recent [`CHART_WINDOW`] samples of the projection, oldest first.
    pub fn chart_window(&self, scope: &ServiceScope, mode: MonitoringMode) -> Vec<&MetricSample> {
        let filtered: Vec<&MetricSample> = self.filter(scope, mode).collect();
        let skip = filtered.len().saturating_sub(CHART_WINDOW);
        filtered.into_iter().skip(skip).collect()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetricSample> {
        self.buffer.iter()
    }
}

impl Default for MetricStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Operator-selected monitoring lens. Decides which metric type is charted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum MonitoringMode {
    #[default]
    #[serde(rename = "SRE (Standard)")]
    Standard,
    #[serde(rename = "N+1 Detection")]
    NPlusOne,
    #[serde(rename = "Security (Redaction)")]
    Redaction,
    #[serde(rename = "Bimodal Analysis")]
    Bimodal,
}

impl MonitoringMode {
    pub fn metric_type(self) -> &'static str {
        match self {
            MonitoringMode::Redaction => REDACTION_COUNT,
            MonitoringMode::Standard | MonitoringMode::NPlusOne | MonitoringMode::Bimodal => {
                P99_LATENCY
            }
        }
    }

    pub fn chart_label(self) -> &'static str {
        match self.metric_type() {
            REDACTION_COUNT => "Security Redaction Count Over Time",
            _ => "P99 Latency (ms) Over Time",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MonitoringMode::Standard => "SRE (Standard)",
            MonitoringMode::NPlusOne => "N+1 Detection",
            MonitoringMode::Redaction => "Security (Redaction)",
            MonitoringMode::Bimodal => "Bimodal Analysis",
        }
    }
}

impl fmt::Display for MonitoringMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for MonitoringMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sre (standard)" | "sre" | "standard" => Ok(MonitoringMode::Standard),
            "n+1 detection" | "n+1" | "nplusone" => Ok(MonitoringMode::NPlusOne),
            "security (redaction)" | "security" | "redaction" => Ok(MonitoringMode::Redaction),
            "bimodal analysis" | "bimodal" => Ok(MonitoringMode::Bimodal),
            other => Err(format!("unknown monitoring mode: {}", other)),
        }
    }
}

/// Which services a metric view covers. Serialized as the service name,
/// or `All Services`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ServiceScope {
    #[default]
    All,
    Service(String),
}

impl ServiceScope {
    pub fn matches(&self, service: &str) -> bool {
        match self {
            ServiceScope::All => true,
            ServiceScope::Service(name) => name == service,
        }
    }

    /// Segment used in `/api/metrics/{service}/{metric_type}`; not yet
    /// percent-encoded.
    pub fn path_segment(&self) -> &str {
        match self {
            ServiceScope::All => ALL_SERVICES,
            ServiceScope::Service(name) => name,
        }
    }
}

impl fmt::Display for ServiceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path_segment())
    }
}

impl FromStr for ServiceScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err("service name cannot be empty".to_string());
        }
        if trimmed.eq_ignore_ascii_case(ALL_SERVICES) || trimmed.eq_ignore_ascii_case("all") {
            Ok(ServiceScope::All)
        } else {
            Ok(ServiceScope::Service(trimmed.to_string()))
        }
    }
}

impl TryFrom<String> for ServiceScope {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ServiceScope> for String {
    fn from(scope: ServiceScope) -> Self {
        scope.path_segment().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn anomaly(n: usize) -> Anomaly {
        Anomaly {
            service: "python-service".into(),
            route: "/quote".into(),
            trace_id: format!("trace-{}", n),
            duration_ms: 500.0 + n as f64,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
                + chrono::Duration::seconds(n as i64),
            anomaly_score: None,
            is_anomaly: true,
        }
    }

    fn sample(n: usize, service: &str, metric_type: &str) -> MetricSample {
        MetricSample {
            service: service.into(),
            metric_type: metric_type.into(),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
                + chrono::Duration::seconds(n as i64),
            value: n as f64,
        }
    }

    #[test]
    fn incident_store_caps_at_fifty_most_recent_first() {
        let mut store = IncidentStore::new();
        for n in 0..=50 {
            store.push_front_capped(anomaly(n));
        }

        assert_eq!(store.len(), INCIDENT_CAPACITY);
        assert!(store.find("trace-0").is_none());
        assert_eq!(store.latest().unwrap().trace_id, "trace-50");

        let ids: Vec<&str> = store.iter().map(|a| a.trace_id.as_str()).collect();
        assert_eq!(ids.first(), Some(&"trace-50"));
        assert_eq!(ids.last(), Some(&"trace-1"));
    }

    #[test]
    fn incident_push_returns_evicted_tail() {
        let mut store = IncidentStore::new();
        for n in 0..INCIDENT_CAPACITY {
            assert!(store.push_front_capped(anomaly(n)).is_none());
        }
        let evicted = store.push_front_capped(anomaly(99)).unwrap();
        assert_eq!(evicted.trace_id, "trace-0");
    }

    #[test]
    fn incident_replace_discards_previous_contents() {
        let mut store = IncidentStore::new();
        store.push_front_capped(anomaly(1));
        store.push_front_capped(anomaly(2));

        store.replace(vec![anomaly(7)]);

        assert_eq!(store.len(), 1);
        assert!(store.find("trace-1").is_none());
        assert!(store.find("trace-7").is_some());
    }

    #[test]
    fn incident_replace_truncates_oversized_snapshot() {
        let mut store = IncidentStore::new();
        store.replace((0..80).rev().map(anomaly).collect());

        assert_eq!(store.len(), INCIDENT_CAPACITY);
        assert_eq!(store.latest().unwrap().trace_id, "trace-79");
    }

    #[test]
    fn metric_store_caps_at_sixty_oldest_evicted() {
        let mut store = MetricStore::new();
        for n in 0..=60 {
            store.push_back_capped(sample(n, "api-gateway", P99_LATENCY));
        }

        assert_eq!(store.len(), METRIC_CAPACITY);
        let values: Vec<f64> = store.iter().map(|m| m.value).collect();
        assert_eq!(values.first(), Some(&1.0));
        assert_eq!(values.last(), Some(&60.0));
    }

    #[test]
    fn metric_replace_keeps_newest_tail() {
        let mut store = MetricStore::new();
        let samples = (0..70)
            .map(|n| sample(n, "api-gateway", P99_LATENCY))
            .collect();
        store.replace(samples);

        assert_eq!(store.len(), METRIC_CAPACITY);
        assert_eq!(store.iter().next().unwrap().value, 10.0);
    }

    #[test]
    fn filter_is_a_projection() {
        let mut store = MetricStore::new();
        store.push_back_capped(sample(1, "api-gateway", P99_LATENCY));
        store.push_back_capped(sample(2, "node-service", P99_LATENCY));
        store.push_back_capped(sample(3, "api-gateway", REDACTION_COUNT));

        let scope = ServiceScope::Service("api-gateway".into());
        let latency: Vec<f64> = store
            .filter(&scope, MonitoringMode::Standard)
            .map(|m| m.value)
            .collect();
        assert_eq!(latency, vec![1.0]);

        let redactions: Vec<f64> = store
            .filter(&ServiceScope::All, MonitoringMode::Redaction)
            .map(|m| m.value)
            .collect();
        assert_eq!(redactions, vec![3.0]);

        assert_eq!(store.len(), 3);
    }

    #[test]
    fn chart_window_takes_latest_thirty() {
        let mut store = MetricStore::new();
        for n in 0..45 {
            store.push_back_capped(sample(n, "api-gateway", P99_LATENCY));
        }

        let window = store.chart_window(&ServiceScope::All, MonitoringMode::Bimodal);
        assert_eq!(window.len(), CHART_WINDOW);
        assert_eq!(window[0].value, 15.0);
        assert_eq!(window[CHART_WINDOW - 1].value, 44.0);
    }

    #[test]
    fn chart_window_outlives_a_temporary_scope() {
        let mut store = MetricStore::new();
        store.push_back_capped(sample(1, "node-service", P99_LATENCY));
        store.push_back_capped(sample(2, "python-service", P99_LATENCY));

        let window = {
            let scope = ServiceScope::Service("node-service".to_string());
            store.chart_window(&scope, MonitoringMode::Standard)
        };
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].service, "node-service");
    }

    #[test]
    fn metric_type_follows_mode() {
        assert_eq!(MonitoringMode::Redaction.metric_type(), REDACTION_COUNT);
        assert_eq!(MonitoringMode::Standard.metric_type(), P99_LATENCY);
        assert_eq!(MonitoringMode::NPlusOne.metric_type(), P99_LATENCY);
        assert_eq!(MonitoringMode::Bimodal.metric_type(), P99_LATENCY);
    }

    #[test]
    fn parse_scope_and_mode() {
        assert_eq!(
            "All Services".parse::<ServiceScope>().unwrap(),
            ServiceScope::All
        );
        assert_eq!(
            "node-service".parse::<ServiceScope>().unwrap(),
            ServiceScope::Service("node-service".into())
        );
        assert_eq!(
            "Security (Redaction)".parse::<MonitoringMode>().unwrap(),
            MonitoringMode::Redaction
        );
        assert!("chaos".parse::<MonitoringMode>().is_err());
    }

    #[test]
    fn zero_capacity_buffer_rejects_everything() {
        let mut buffer = BoundedBuffer::with_capacity(0);
        assert_eq!(buffer.push_back_capped(1), Some(1));
        assert_eq!(buffer.push_front_capped(2), Some(2));
        assert!(buffer.is_empty());
    }
}
