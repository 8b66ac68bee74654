use crate::backend::TelemetryBackend;
use crate::error::{AnalysisError, FetchError};
use crate::logs::LogCorrelator;
use crate::model::{Anomaly, LogEntry, RcaResult, TraceContext};
use crate::rca::{AnalysisRequest, AnalysisStatus, AnalysisTicket, RcaOrchestrator};
use crate::trace::TraceInspector;
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Tabs of the investigation panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViewTab {
    Overview,
    Traces,
    Logs,
    Metrics,
    #[serde(rename = "AI Analysis")]
    AiAnalysis,
}

impl ViewTab {
    pub const ALL: [ViewTab; 5] = [
        ViewTab::Overview,
        ViewTab::Traces,
        ViewTab::Logs,
        ViewTab::Metrics,
        ViewTab::AiAnalysis,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ViewTab::Overview => "Overview",
            ViewTab::Traces => "Traces",
            ViewTab::Logs => "Logs",
            ViewTab::Metrics => "Metrics",
            ViewTab::AiAnalysis => "AI Analysis",
        }
    }
}

impl fmt::Display for ViewTab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Handed out by [`InvestigationSession::select_anomaly`]. Results tagged with
/// an older generation are discarded on arrival.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionTicket {
    generation: u64,
    trace_id: String,
}

impl SelectionTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionKind {
    Trace,
    Logs,
    Analysis,
}

/// What happened when one in-flight fetch resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Applied(CompletionKind),
    /// Arrived after the selection moved on; dropped.
    Stale(CompletionKind),
    /// Fetch failed for the current selection; previous state was kept.
    Failed(CompletionKind, FetchError),
}

enum Pending {
    Trace {
        ticket: SelectionTicket,
        outcome: Result<TraceContext, FetchError>,
    },
    Logs {
        ticket: SelectionTicket,
        outcome: Result<Vec<LogEntry>, FetchError>,
    },
    Analysis {
        generation: u64,
        ticket: AnalysisTicket,
        outcome: Result<RcaResult, AnalysisError>,
    },
}

/// Everything shown for the one anomaly the operator is looking at.
///
/// The session is the only writer of selection state. Fetches run as
/// futures in a set owned by the session and are applied one at a time by
/// [`next_completion`](Self::next_completion), so no locking is involved.
pub struct InvestigationSession {
    inspector: TraceInspector,
    correlator: LogCorrelator,
    orchestrator: RcaOrchestrator,
    generation: u64,
    selected: Option<Anomaly>,
    active_tab: ViewTab,
    trace: Option<TraceContext>,
    logs: Vec<LogEntry>,
    analysis: Option<RcaResult>,
    loading_trace: bool,
    loading_logs: bool,
    pending: FuturesUnordered<BoxFuture<'static, Pending>>,
}

impl InvestigationSession {
    pub fn new(backend: Arc<dyn TelemetryBackend>, gateway_service: impl Into<String>) -> Self {
        Self {
            inspector: TraceInspector::new(Arc::clone(&backend), gateway_service),
            correlator: LogCorrelator::new(Arc::clone(&backend)),
            orchestrator: RcaOrchestrator::new(backend),
            generation: 0,
            selected: None,
            active_tab: ViewTab::Traces,
            trace: None,
            logs: Vec::new(),
            analysis: None,
            loading_trace: false,
            loading_logs: false,
            pending: FuturesUnordered::new(),
        }
    }

    /// Start investigating `anomaly`. Previous trace, logs and analysis are
    /// cleared before the trace and log fetches are issued.
    pub fn select_anomaly(&mut self, anomaly: Anomaly) -> SelectionTicket {
        self.reset();
        self.active_tab = ViewTab::Traces;

        let ticket = SelectionTicket {
            generation: self.generation,
            trace_id: anomaly.trace_id.clone(),
        };
        tracing::info!(
            trace_id = %anomaly.trace_id,
            service = %anomaly.service,
            generation = self.generation,
            "investigating anomaly"
        );
        self.selected = Some(anomaly);
        self.loading_trace = true;
        self.loading_logs = true;

        let inspector = self.inspector.clone();
        let trace_ticket = ticket.clone();
        self.pending.push(
            async move {
                let outcome = inspector.load_trace(trace_ticket.trace_id()).await;
                Pending::Trace {
                    ticket: trace_ticket,
                    outcome,
                }
            }
            .boxed(),
        );

        let correlator = self.correlator.clone();
        let logs_ticket = ticket.clone();
        self.pending.push(
            async move {
                let outcome = correlator.load_logs(logs_ticket.trace_id()).await;
                Pending::Logs {
                    ticket: logs_ticket,
                    outcome,
                }
            }
            .boxed(),
        );

        ticket
    }

    /// The operator closed the panel.
    pub fn clear_selection(&mut self) {
        self.reset();
        self.active_tab = ViewTab::Traces;
    }

    /// Switch tabs. Never refetches trace or logs; activating AI Analysis
    /// with a trace loaded requests an analysis. If the trace is still
    /// loading, the request goes out when it arrives.
    pub fn select_tab(&mut self, tab: ViewTab) {
        self.active_tab = tab;
        if tab == ViewTab::AiAnalysis && self.trace.is_some() {
            self.trigger_analysis();
        }
    }

    fn trigger_analysis(&mut self) {
        let Some(context) = self.trace.as_ref() else {
            return;
        };

        match self.orchestrator.request_analysis(context) {
            AnalysisRequest::Cached(result) => self.analysis = Some(result),
            AnalysisRequest::InFlight => {}
            AnalysisRequest::Dispatch(ticket) => {
                let generation = self.generation;
                let request = self.orchestrator.analyze(ticket, context.clone());
                self.pending.push(
                    async move {
                        let (ticket, outcome) = request.await;
                        Pending::Analysis {
                            generation,
                            ticket,
                            outcome,
                        }
                    }
                    .boxed(),
                );
            }
        }
    }

    /// Wait for the next in-flight fetch and apply it. `None` when nothing
    /// is in flight.
    pub async fn next_completion(&mut self) -> Option<Completion> {
        let pending = self.pending.next().await?;
        Some(self.apply(pending))
    }

    /// Drive every in-flight fetch, including analyses triggered along the
    /// way, to completion.
    pub async fn settle(&mut self) -> Vec<Completion> {
        let mut completions = Vec::new();
        while let Some(completion) = self.next_completion().await {
            completions.push(completion);
        }
        completions
    }

    fn apply(&mut self, pending: Pending) -> Completion {
        match pending {
            Pending::Trace { ticket, outcome } => {
                if ticket.generation != self.generation {
                    tracing::debug!(trace_id = %ticket.trace_id, "dropping stale trace");
                    return Completion::Stale(CompletionKind::Trace);
                }
                self.loading_trace = false;
                match outcome {
                    Ok(context) => {
                        tracing::debug!(
                            trace_id = %context.trace_id,
                            spans = context.spans.len(),
                            "trace loaded"
                        );
                        self.trace = Some(context);
                        if self.active_tab == ViewTab::AiAnalysis {
                            self.trigger_analysis();
                        }
                        Completion::Applied(CompletionKind::Trace)
                    }
                    Err(err) => {
                        tracing::warn!(
                            trace_id = %ticket.trace_id,
                            error = %err,
                            "failed to load trace"
                        );
                        Completion::Failed(CompletionKind::Trace, err)
                    }
                }
            }
            Pending::Logs { ticket, outcome } => {
                if ticket.generation != self.generation {
                    tracing::debug!(trace_id = %ticket.trace_id, "dropping stale logs");
                    return Completion::Stale(CompletionKind::Logs);
                }
                self.loading_logs = false;
                match outcome {
                    Ok(logs) => {
                        self.logs = logs;
                        Completion::Applied(CompletionKind::Logs)
                    }
                    Err(err) => {
                        tracing::warn!(
                            trace_id = %ticket.trace_id,
                            error = %err,
                            "failed to load logs"
                        );
                        Completion::Failed(CompletionKind::Logs, err)
                    }
                }
            }
            Pending::Analysis {
                generation,
                ticket,
                outcome,
            } => {
                let result = self.orchestrator.complete(ticket, outcome);
                match result {
                    Some(result) if generation == self.generation => {
                        self.analysis = Some(result);
                        Completion::Applied(CompletionKind::Analysis)
                    }
                    _ => Completion::Stale(CompletionKind::Analysis),
                }
            }
        }
    }

    fn reset(&mut self) {
        self.generation += 1;
        self.orchestrator.invalidate();
        self.selected = None;
        self.trace = None;
        self.logs.clear();
        self.analysis = None;
        self.loading_trace = false;
        self.loading_logs = false;
    }

    pub fn selected(&self) -> Option<&Anomaly> {
        self.selected.as_ref()
    }

    pub fn active_tab(&self) -> ViewTab {
        self.active_tab
    }

    pub fn trace(&self) -> Option<&TraceContext> {
        self.trace.as_ref()
    }

    pub fn logs(&self) -> &[LogEntry] {
        &self.logs
    }

    pub fn analysis(&self) -> Option<&RcaResult> {
        self.analysis.as_ref()
    }

    pub fn analysis_status(&self) -> AnalysisStatus {
        self.orchestrator.status()
    }

    pub fn is_loading_trace(&self) -> bool {
        self.loading_trace
    }

    pub fn is_loading_logs(&self) -> bool {
        self.loading_logs
    }

    /// Fetches not yet applied, stale ones included.
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}
