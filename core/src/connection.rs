use crate::backend::PushConnector;
use crate::config::Config;
use crate::model::PushMessage;
use futures::StreamExt;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Disconnected,
    /// Terminal; only reached through an explicit shutdown.
    Closed,
}

impl ConnectionState {
    pub fn is_live(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Idle => "IDLE",
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Connected => "CONNECTED",
            ConnectionState::Disconnected => "DISCONNECTED",
            ConnectionState::Closed => "CLOSED",
        };
        f.write_str(label)
    }
}

/// Delivered to the connection's sink in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    Status(ConnectionState),
    Message(PushMessage),
}

/// Decode one push frame. Malformed frames are logged and dropped.
pub fn parse_message(text: &str) -> Option<PushMessage> {
    match serde_json::from_str::<PushMessage>(text) {
        Ok(message) => Some(message),
        Err(err) => {
            tracing::warn!(error = %err, frame_len = text.len(), "dropping malformed push frame");
            None
        }
    }
}

/// Keeps a push channel open, reconnecting after a fixed delay for as long
/// as it runs.
pub struct ConnectionManager {
    connector: Arc<dyn PushConnector>,
    endpoint: String,
    reconnect_delay: Duration,
}

impl ConnectionManager {
    pub fn new(
        connector: Arc<dyn PushConnector>,
        endpoint: impl Into<String>,
        reconnect_delay: Duration,
    ) -> Self {
        Self {
            connector,
            endpoint: endpoint.into(),
            reconnect_delay,
        }
    }

    pub fn from_config(connector: Arc<dyn PushConnector>, config: &Config) -> Self {
        Self::new(
            connector,
            config.backend.push_url.clone(),
            config.live.reconnect_delay(),
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Run the connection loop on its own task. Dropping the receiving end
    /// of `sink` stops the loop like a shutdown would.
    pub fn spawn(self, sink: mpsc::Sender<LiveEvent>) -> ConnectionHandle {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(self.run(sink, state_tx, shutdown_rx));

        ConnectionHandle {
            state: state_rx,
            shutdown: shutdown_tx,
            task,
        }
    }

    async fn run(
        self,
        sink: mpsc::Sender<LiveEvent>,
        state: watch::Sender<ConnectionState>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        'connection: loop {
            if !publish(&state, &sink, &mut shutdown, ConnectionState::Connecting).await {
                break;
            }

            let opened = tokio::select! {
                _ = shutdown.changed() => break,
                _ = sink.closed() => break,
                opened = self.connector.connect(&self.endpoint) => opened,
            };

            match opened {
                Ok(mut frames) => {
                    tracing::info!(endpoint = %self.endpoint, "push channel connected");
                    if !publish(&state, &sink, &mut shutdown, ConnectionState::Connected).await {
                        break;
                    }

                    loop {
                        tokio::select! {
                            _ = shutdown.changed() => break 'connection,
                            _ = sink.closed() => break 'connection,
                            frame = frames.next() => match frame {
                                Some(Ok(text)) => {
                                    let Some(message) = parse_message(&text) else {
                                        continue;
                                    };
                                    let event = LiveEvent::Message(message);
                                    if !deliver(&sink, &mut shutdown, event).await {
                                        break 'connection;
                                    }
                                }
                                Some(Err(err)) => {
                                    tracing::warn!(
                                        endpoint = %self.endpoint,
                                        error = %err,
                                        "push channel dropped"
                                    );
                                    break;
                                }
                                None => {
                                    tracing::info!(
                                        endpoint = %self.endpoint,
                                        "push channel closed"
                                    );
                                    break;
                                }
                            },
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        endpoint = %self.endpoint,
                        error = %err,
                        "push channel unavailable"
                    );
                }
            }

            if !publish(&state, &sink, &mut shutdown, ConnectionState::Disconnected).await {
                break;
            }

            tracing::debug!(
                delay_ms = self.reconnect_delay.as_millis() as u64,
                "reconnect scheduled"
            );
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = sink.closed() => break,
                _ = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }

        state.send_replace(ConnectionState::Closed);
        let _ = sink.try_send(LiveEvent::Status(ConnectionState::Closed));
        tracing::info!(endpoint = %self.endpoint, "push channel shut down");
    }
}

async fn publish(
    state: &watch::Sender<ConnectionState>,
    sink: &mpsc::Sender<LiveEvent>,
    shutdown: &mut watch::Receiver<bool>,
    next: ConnectionState,
) -> bool {
    state.send_replace(next);
    deliver(sink, shutdown, LiveEvent::Status(next)).await
}

/// Wait for room in the sink, giving up on shutdown so a consumer that
/// stopped reading cannot hold the loop open. `false` means stop.
async fn deliver(
    sink: &mpsc::Sender<LiveEvent>,
    shutdown: &mut watch::Receiver<bool>,
    event: LiveEvent,
) -> bool {
    tokio::select! {
        _ = shutdown.changed() => false,
        sent = sink.send(event) => sent.is_ok(),
    }
}

/// Control side of a spawned [`ConnectionManager`].
pub struct ConnectionHandle {
    state: watch::Receiver<ConnectionState>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ConnectionHandle {
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Stop the loop, cancelling any pending reconnect, and wait for it to
    /// exit. The state is `Closed` afterwards.
    pub async fn shutdown(self) -> Result<(), JoinError> {
        let _ = self.shutdown.send(true);
        self.task.await
    }
}
