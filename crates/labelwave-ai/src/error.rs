use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("rate limited by backend")]
    RateLimited { retry_after: Option<Duration> },

    #[error("backend call timed out")]
    Timeout,

    #[error("HTTP request failed: {0}")]
    Http(reqwest::Error),

    #[error("backend returned {status}: {body}")]
    Server { status: u16, body: String },

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("backend returned no text")]
    EmptyResponse,

    #[error("invalid provider configuration: {0}")]
    Config(String),
}

impl ProviderError {
    /// Rate limits and timeouts are worth another attempt; anything else is
    /// final for the batch.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Timeout)
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Http(e)
        }
    }
}
