use crate::backend::TelemetryBackend;
use crate::error::AnalysisError;
use crate::model::{RcaResult, TraceContext};
use futures::future::{BoxFuture, FutureExt};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub const FALLBACK_ROOT_CAUSE: &str = "AI analysis is currently unavailable.";
pub const FALLBACK_RISK: &str = "N/A";
const FALLBACK_FIXES: [&str; 2] = [
    "Check GEMINI_API_KEY configuration",
    "Try again in a few moments",
];

/// Result shown when the RCA call fails. Cached like a real answer, so a
/// failure is only retried after the operator selects the anomaly again.
pub fn fallback_result() -> RcaResult {
    RcaResult {
        root_cause: FALLBACK_ROOT_CAUSE.to_string(),
        suggested_fixes: FALLBACK_FIXES.iter().map(|s| s.to_string()).collect(),
        risk_prediction: FALLBACK_RISK.to_string(),
        confidence: None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisStatus {
    Idle,
    Analyzing,
}

/// Identifies one dispatched RCA request. A ticket from before the last
/// [`RcaOrchestrator::invalidate`] no longer matches and its result is dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisTicket {
    epoch: u64,
    trace_id: String,
}

impl AnalysisTicket {
    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }
}

/// Outcome of asking for an analysis.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisRequest {
    /// A result is already cached; no request was issued.
    Cached(RcaResult),
    /// A request for this trace is already running.
    InFlight,
    /// The caller must drive [`RcaOrchestrator::analyze`] with this ticket
    /// and hand the outcome back to [`RcaOrchestrator::complete`].
    Dispatch(AnalysisTicket),
}

/// Lazily fetches and caches root-cause analyses, one in flight per trace.
pub struct RcaOrchestrator {
    backend: Arc<dyn TelemetryBackend>,
    epoch: u64,
    cache: HashMap<String, RcaResult>,
    in_flight: HashSet<String>,
}

impl RcaOrchestrator {
    pub fn new(backend: Arc<dyn TelemetryBackend>) -> Self {
        Self {
            backend,
            epoch: 0,
            cache: HashMap::new(),
            in_flight: HashSet::new(),
        }
    }

    pub fn request_analysis(&mut self, context: &TraceContext) -> AnalysisRequest {
        if let Some(result) = self.cache.get(&context.trace_id) {
            return AnalysisRequest::Cached(result.clone());
        }

        if !self.in_flight.insert(context.trace_id.clone()) {
            tracing::debug!(trace_id = %context.trace_id, "analysis already in flight");
            return AnalysisRequest::InFlight;
        }

        tracing::info!(trace_id = %context.trace_id, "requesting root-cause analysis");
        AnalysisRequest::Dispatch(AnalysisTicket {
            epoch: self.epoch,
            trace_id: context.trace_id.clone(),
        })
    }

    /// The network half of a dispatched request. Owns everything it needs,
    /// so it can sit in a pending set while the caller keeps mutating state.
    pub fn analyze(
        &self,
        ticket: AnalysisTicket,
        context: TraceContext,
    ) -> BoxFuture<'static, (AnalysisTicket, Result<RcaResult, AnalysisError>)> {
        let backend = Arc::clone(&self.backend);
        async move {
            let outcome = backend.request_rca(&context).await;
            (ticket, outcome)
        }
        .boxed()
    }

    /// Record the outcome of a dispatched request. Returns the cached result,
    /// or `None` when the ticket was orphaned by an invalidation.
    pub fn complete(
        &mut self,
        ticket: AnalysisTicket,
        outcome: Result<RcaResult, AnalysisError>,
    ) -> Option<RcaResult> {
        if ticket.epoch != self.epoch {
            tracing::debug!(
                trace_id = %ticket.trace_id,
                "discarding analysis for a previous selection"
            );
            return None;
        }

        self.in_flight.remove(&ticket.trace_id);

        let result = match outcome {
            Ok(result) => result,
            Err(err) => {
                tracing::warn!(
                    trace_id = %ticket.trace_id,
                    error = %err,
                    "analysis failed, using fallback"
                );
                fallback_result()
            }
        };

        self.cache.insert(ticket.trace_id, result.clone());
        Some(result)
    }

    /// Drop cached results and orphan anything in flight.
    pub fn invalidate(&mut self) {
        self.epoch += 1;
        self.cache.clear();
        self.in_flight.clear();
    }

    pub fn status(&self) -> AnalysisStatus {
        if self.in_flight.is_empty() {
            AnalysisStatus::Idle
        } else {
            AnalysisStatus::Analyzing
        }
    }

    pub fn is_in_flight(&self, trace_id: &str) -> bool {
        self.in_flight.contains(trace_id)
    }

    pub fn cached(&self, trace_id: &str) -> Option<&RcaResult> {
        self.cache.get(trace_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::model::{Anomaly, LogEntry, MetricSample, RawTrace};
    use crate::store::{MonitoringMode, ServiceScope};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingRca {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingRca {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail,
            })
        }
    }

    #[async_trait]
    impl TelemetryBackend for CountingRca {
        async fn fetch_alerts(&self) -> Result<Vec<Anomaly>, FetchError> {
            Ok(vec![])
        }

        async fn fetch_metrics(
            &self,
            _scope: &ServiceScope,
            _mode: MonitoringMode,
        ) -> Result<Vec<MetricSample>, FetchError> {
            Ok(vec![])
        }

        async fn fetch_trace(&self, _trace_id: &str) -> Result<RawTrace, FetchError> {
            Ok(RawTrace {
                duration_ms: 0.0,
                spans: vec![],
            })
        }

        async fn fetch_logs(&self, _trace_id: &str) -> Result<Vec<LogEntry>, FetchError> {
            Ok(vec![])
        }

        async fn request_rca(&self, context: &TraceContext) -> Result<RcaResult, AnalysisError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AnalysisError::Rejected("model not configured".into()));
            }
            Ok(RcaResult {
                root_cause: format!("slow query in {}", context.trace_id),
                suggested_fixes: vec!["add an index".into()],
                risk_prediction: "checkout latency keeps rising".into(),
                confidence: Some(0.9),
            })
        }
    }

    fn context(trace_id: &str) -> TraceContext {
        TraceContext {
            trace_id: trace_id.into(),
            duration_ms: 100.0,
            spans: vec![],
        }
    }

    async fn dispatch(orchestrator: &mut RcaOrchestrator, ctx: &TraceContext) -> Option<RcaResult> {
        match orchestrator.request_analysis(ctx) {
            AnalysisRequest::Dispatch(ticket) => {
                let (ticket, outcome) = orchestrator.analyze(ticket, ctx.clone()).await;
                orchestrator.complete(ticket, outcome)
            }
            other => panic!("expected dispatch, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn second_request_while_in_flight_is_not_dispatched() {
        let backend = CountingRca::new(false);
        let mut orchestrator = RcaOrchestrator::new(backend.clone());
        let ctx = context("t1");

        let first = orchestrator.request_analysis(&ctx);
        let second = orchestrator.request_analysis(&ctx);

        let ticket = match first {
            AnalysisRequest::Dispatch(ticket) => ticket,
            other => panic!("expected dispatch, got {:?}", other),
        };
        assert_eq!(second, AnalysisRequest::InFlight);
        assert_eq!(orchestrator.status(), AnalysisStatus::Analyzing);

        let (ticket, outcome) = orchestrator.analyze(ticket, ctx.clone()).await;
        orchestrator.complete(ticket, outcome);

        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert_eq!(orchestrator.status(), AnalysisStatus::Idle);
    }

    #[tokio::test]
    async fn cached_result_skips_the_network() {
        let backend = CountingRca::new(false);
        let mut orchestrator = RcaOrchestrator::new(backend.clone());
        let ctx = context("t1");

        let result = dispatch(&mut orchestrator, &ctx).await.unwrap();
        assert_eq!(result.root_cause, "slow query in t1");

        match orchestrator.request_analysis(&ctx) {
            AnalysisRequest::Cached(cached) => assert_eq!(cached, result),
            other => panic!("expected cached result, got {:?}", other),
        }
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_caches_fallback() {
        let backend = CountingRca::new(true);
        let mut orchestrator = RcaOrchestrator::new(backend.clone());
        let ctx = context("t1");

        let result = dispatch(&mut orchestrator, &ctx).await.unwrap();
        assert_eq!(result.root_cause, FALLBACK_ROOT_CAUSE);
        assert_eq!(result.risk_prediction, "N/A");
        assert_eq!(result.suggested_fixes.len(), 2);

        // no automatic retry
        assert!(matches!(
            orchestrator.request_analysis(&ctx),
            AnalysisRequest::Cached(_)
        ));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidation_orphans_in_flight_request() {
        let backend = CountingRca::new(false);
        let mut orchestrator = RcaOrchestrator::new(backend.clone());
        let ctx = context("t1");

        let ticket = match orchestrator.request_analysis(&ctx) {
            AnalysisRequest::Dispatch(ticket) => ticket,
            other => panic!("expected dispatch, got {:?}", other),
        };
        let pending = orchestrator.analyze(ticket, ctx.clone());

        orchestrator.invalidate();
        assert_eq!(orchestrator.status(), AnalysisStatus::Idle);

        let (ticket, outcome) = pending.await;
        assert!(orchestrator.complete(ticket, outcome).is_none());
        assert!(orchestrator.cached("t1").is_none());

        // a fresh request after invalidation is dispatched again
        assert!(matches!(
            orchestrator.request_analysis(&ctx),
            AnalysisRequest::Dispatch(_)
        ));
    }
}
