use thiserror::Error;

/// Push channel failed to open or dropped. Never fatal: the connection
/// manager reacts by scheduling a reconnect.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("failed to open push channel to {endpoint}: {message}")]
    Connect { endpoint: String, message: String },

    #[error("push channel dropped: {0}")]
    Dropped(String),
}

/// A REST call failed or returned something we could not decode.
///
/// Surfaced to the caller; whatever state the caller held before the call
/// stays in place.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("request to {url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },
}

impl FetchError {
    pub fn url(&self) -> &str {
        match self {
            FetchError::Request { url, .. }
            | FetchError::Status { url, .. }
            | FetchError::Decode { url, .. } => url,
        }
    }
}

/// The RCA call failed. Converted into a fallback result by the
/// orchestrator rather than propagated.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("root-cause analysis unavailable: {0}")]
    Unavailable(#[from] FetchError),

    #[error("root-cause analysis rejected: {0}")]
    Rejected(String),
}
