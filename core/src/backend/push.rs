use crate::error::ChannelError;
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Text frames received on an open push channel. The stream ends when the
/// channel closes normally and yields an error when it drops.
pub type PushStream = BoxStream<'static, Result<String, ChannelError>>;

/// Opens the push channel. One call per connection attempt.
#[async_trait]
pub trait PushConnector: Send + Sync {
    async fn connect(&self, endpoint: &str) -> Result<PushStream, ChannelError>;
}
