use anyhow::{Context, Result};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use observer_core::config::Config;
use observer_core::{Anomaly, LogEntry, MetricSample, RawTrace, RcaResult};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
enum PushFrame {
    Text(String),
    Close,
}

struct MockState {
    alerts: Mutex<Vec<Value>>,
    metrics: Mutex<Vec<MetricSample>>,
    traces: Mutex<HashMap<String, Value>>,
    logs: Mutex<Vec<LogEntry>>,
    rca: Mutex<Option<Value>>,
    rca_bodies: Mutex<Vec<Value>>,
    authorization: Mutex<Option<String>>,
    connections: AtomicUsize,
    push: broadcast::Sender<PushFrame>,
}

impl MockState {
    fn new() -> Self {
        let (push, _) = broadcast::channel(64);
        Self {
            alerts: Mutex::default(),
            metrics: Mutex::default(),
            traces: Mutex::default(),
            logs: Mutex::default(),
            rca: Mutex::default(),
            rca_bodies: Mutex::default(),
            authorization: Mutex::default(),
            connections: AtomicUsize::new(0),
            push,
        }
    }

    fn record_auth(&self, headers: &HeaderMap) {
        let value = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        *self.authorization.lock().unwrap() = value;
    }

    fn broadcast(&self, frame: PushFrame) {
        // no subscribers just means no client is connected
        let _ = self.push.send(frame);
    }
}

/// In-process stand-in for the telemetry backend: the REST endpoints plus
/// the `/ws` push channel, bound to an ephemeral port.
pub struct MockBackend {
    addr: SocketAddr,
    state: Arc<MockState>,
    server: JoinHandle<()>,
}

impl MockBackend {
    pub async fn start() -> Result<Self> {
        let state = Arc::new(MockState::new());

        let router = Router::new()
            .route("/api/alerts", get(alerts))
            .route("/api/metrics/:service/:metric_type", get(metrics))
            .route("/api/traces/:trace_id", get(trace))
            .route("/api/logs", get(logs))
            .route("/api/rca/:trace_id", post(rca))
            .route("/ws", get(push_channel))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .context("failed to bind mock backend")?;
        let addr = listener.local_addr()?;

        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        Ok(Self {
            addr,
            state,
            server,
        })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn push_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Defaults pointed at this backend, with a short reconnect delay.
    pub fn config(&self) -> Config {
        let mut config = Config::default();
        config.backend.base_url = self.base_url();
        config.backend.push_url = self.push_url();
        config.backend.request_timeout_secs = 5;
        config.live.reconnect_delay_ms = 50;
        config
    }

    pub fn set_alerts(&self, alerts: &[Anomaly]) {
        let rows = alerts
            .iter()
            .map(|a| serde_json::to_value(a).unwrap())
            .collect();
        *self.state.alerts.lock().unwrap() = rows;
    }

    pub fn set_alert_rows(&self, rows: Vec<Value>) {
        *self.state.alerts.lock().unwrap() = rows;
    }

    pub fn set_metrics(&self, samples: Vec<MetricSample>) {
        *self.state.metrics.lock().unwrap() = samples;
    }

    pub fn add_trace(&self, trace_id: &str, trace: &RawTrace) {
        self.add_trace_payload(trace_id, serde_json::to_value(trace).unwrap());
    }

    pub fn add_trace_payload(&self, trace_id: &str, payload: Value) {
        self.state
            .traces
            .lock()
            .unwrap()
            .insert(trace_id.to_string(), payload);
    }

    pub fn set_logs(&self, logs: Vec<LogEntry>) {
        *self.state.logs.lock().unwrap() = logs;
    }

    /// `None` makes the RCA endpoint answer 503, as when no model is configured.
    pub fn set_rca(&self, result: Option<RcaResult>) {
        *self.state.rca.lock().unwrap() = result.map(|r| serde_json::to_value(r).unwrap());
    }

    /// Answer the RCA endpoint with 200 and an arbitrary body.
    pub fn set_rca_payload(&self, payload: Value) {
        *self.state.rca.lock().unwrap() = Some(payload);
    }

    pub fn rca_bodies(&self) -> Vec<Value> {
        self.state.rca_bodies.lock().unwrap().clone()
    }

    pub fn last_authorization(&self) -> Option<String> {
        self.state.authorization.lock().unwrap().clone()
    }

    /// Push channels accepted so far.
    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    pub fn push(&self, message: Value) {
        self.state.broadcast(PushFrame::Text(message.to_string()));
    }

    pub fn push_raw(&self, text: &str) {
        self.state.broadcast(PushFrame::Text(text.to_string()));
    }

    /// Close every open push channel from the server side.
    pub fn drop_connections(&self) {
        self.state.broadcast(PushFrame::Close);
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn alerts(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Json<Vec<Value>> {
    state.record_auth(&headers);
    Json(state.alerts.lock().unwrap().clone())
}

async fn metrics(
    State(state): State<Arc<MockState>>,
    Path((service, metric_type)): Path<(String, String)>,
) -> Json<Vec<MetricSample>> {
    let samples = state
        .metrics
        .lock()
        .unwrap()
        .iter()
        .filter(|m| service == "All Services" || m.service == service)
        .filter(|m| m.metric_type == metric_type)
        .cloned()
        .collect();
    Json(samples)
}

async fn trace(
    State(state): State<Arc<MockState>>,
    Path(trace_id): Path<String>,
) -> Response {
    match state.traces.lock().unwrap().get(&trace_id) {
        Some(payload) => Json(payload.clone()).into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({"detail": "Trace not found"}))).into_response(),
    }
}

#[derive(Deserialize)]
struct LogQuery {
    trace_id: String,
}

async fn logs(
    State(state): State<Arc<MockState>>,
    Query(query): Query<LogQuery>,
) -> Json<Vec<LogEntry>> {
    let logs = state
        .logs
        .lock()
        .unwrap()
        .iter()
        .filter(|l| l.trace_id.as_deref() == Some(query.trace_id.as_str()))
        .cloned()
        .collect();
    Json(logs)
}

async fn rca(
    State(state): State<Arc<MockState>>,
    Path(_trace_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.record_auth(&headers);
    state.rca_bodies.lock().unwrap().push(body);
    match state.rca.lock().unwrap().clone() {
        Some(result) => Json(result).into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"detail": "Gemini API not configured"})),
        )
            .into_response(),
    }
}

async fn push_channel(ws: WebSocketUpgrade, State(state): State<Arc<MockState>>) -> Response {
    ws.on_upgrade(move |socket| serve_socket(socket, state))
}

async fn serve_socket(mut socket: WebSocket, state: Arc<MockState>) {
    state.connections.fetch_add(1, Ordering::SeqCst);
    let mut frames = state.push.subscribe();

    let history = {
        let alerts = state.alerts.lock().unwrap();
        json!({ "type": "history", "data": &*alerts }).to_string()
    };
    if socket.send(Message::Text(history)).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Ok(PushFrame::Text(text)) => {
                    if socket.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Ok(PushFrame::Close) | Err(RecvError::Closed) => {
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                }
                Err(RecvError::Lagged(_)) => continue,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
}
