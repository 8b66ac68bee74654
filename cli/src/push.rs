use async_trait::async_trait;
use futures::{future, StreamExt};
use observer_core::{ChannelError, PushConnector, PushStream};
use tokio_tungstenite::tungstenite::Message;

/// Opens the push channel over WebSocket. Only text frames are passed on;
/// the stream ends on a close frame.
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PushConnector for WebSocketConnector {
    async fn connect(&self, endpoint: &str) -> Result<PushStream, ChannelError> {
        let (socket, _response) = tokio_tungstenite::connect_async(endpoint)
            .await
            .map_err(|e| ChannelError::Connect {
                endpoint: endpoint.to_string(),
                message: e.to_string(),
            })?;

        // Writes are never needed; tungstenite answers pings while reading.
        let frames = socket
            .take_while(|frame| future::ready(!matches!(frame, Ok(Message::Close(_)))))
            .filter_map(|frame| async move {
                match frame {
                    Ok(Message::Text(text)) => Some(Ok(text)),
                    Ok(_) => None,
                    Err(e) => Some(Err(ChannelError::Dropped(e.to_string()))),
                }
            });

        Ok(frames.boxed())
    }
}
