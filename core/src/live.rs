use crate::backend::TelemetryBackend;
use crate::connection::{ConnectionState, LiveEvent};
use crate::error::FetchError;
use crate::model::{Anomaly, MetricSample, PushMessage};
use crate::store::{IncidentStore, MetricStore, MonitoringMode, ServiceScope};

/// The live dashboard state: both stores plus the channel status.
///
/// Sole writer of the stores. Push events and REST snapshots are applied
/// here, one at a time, in the order the caller hands them over.
#[derive(Debug, Clone)]
pub struct LiveFeed {
    incidents: IncidentStore,
    metrics: MetricStore,
    status: ConnectionState,
    scope: ServiceScope,
    mode: MonitoringMode,
}

impl LiveFeed {
    pub fn new(scope: ServiceScope, mode: MonitoringMode) -> Self {
        Self {
            incidents: IncidentStore::new(),
            metrics: MetricStore::new(),
            status: ConnectionState::Idle,
            scope,
            mode,
        }
    }

    pub fn apply(&mut self, event: LiveEvent) {
        match event {
            LiveEvent::Status(state) => {
                if state != self.status {
                    tracing::info!(from = %self.status, to = %state, "connection state changed");
                }
                self.status = state;
            }
            LiveEvent::Message(PushMessage::History(anomalies)) => {
                tracing::debug!(count = anomalies.len(), "replacing incidents from history");
                self.incidents.replace(anomalies);
            }
            LiveEvent::Message(PushMessage::NewAnomaly(anomaly)) => {
                tracing::debug!(
                    trace_id = %anomaly.trace_id,
                    service = %anomaly.service,
                    "new anomaly"
                );
                self.incidents.push_front_capped(anomaly);
            }
            LiveEvent::Message(PushMessage::MetricUpdate(sample)) => {
                self.metrics.push_back_capped(sample);
            }
        }
    }

    pub fn apply_alert_snapshot(&mut self, anomalies: Vec<Anomaly>) {
        self.incidents.replace(anomalies);
    }

    pub fn apply_metric_snapshot(&mut self, samples: Vec<MetricSample>) {
        self.metrics.replace(samples);
    }

    /// Reload both stores from REST snapshots. A failed fetch leaves its
    /// store untouched; the first error is returned after both were tried.
    pub async fn refresh(&mut self, backend: &dyn TelemetryBackend) -> Result<(), FetchError> {
        let (alerts, metrics) = futures::join!(
            backend.fetch_alerts(),
            backend.fetch_metrics(&self.scope, self.mode)
        );

        let mut first_error = None;
        match alerts {
            Ok(anomalies) => self.apply_alert_snapshot(anomalies),
            Err(err) => {
                tracing::warn!(error = %err, "failed to load alert snapshot");
                first_error = first_error.or(Some(err));
            }
        }
        match metrics {
            Ok(samples) => self.apply_metric_snapshot(samples),
            Err(err) => {
                tracing::warn!(error = %err, "failed to load metric snapshot");
                first_error = first_error.or(Some(err));
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Change the metric view. Stored samples are kept; call
    /// [`refresh`](Self::refresh) to reload the snapshot for the new view.
    pub fn set_view(&mut self, scope: ServiceScope, mode: MonitoringMode) {
        self.scope = scope;
        self.mode = mode;
    }

    /// Samples for the current view, newest last, limited to the chart window.
    pub fn chart(&self) -> Vec<&MetricSample> {
        self.metrics.chart_window(&self.scope, self.mode)
    }

    pub fn incidents(&self) -> &IncidentStore {
        &self.incidents
    }

    pub fn metrics(&self) -> &MetricStore {
        &self.metrics
    }

    pub fn status(&self) -> ConnectionState {
        self.status
    }

    pub fn is_live(&self) -> bool {
        self.status.is_live()
    }

    pub fn scope(&self) -> &ServiceScope {
        &self.scope
    }

    pub fn mode(&self) -> MonitoringMode {
        self.mode
    }
}

impl Default for LiveFeed {
    fn default() -> Self {
        Self::new(ServiceScope::All, MonitoringMode::default())
    }
}
