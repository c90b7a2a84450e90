//! Backend contract and the named provider wrapper the dispatcher schedules.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;

use crate::{Prompt, ProviderError};

/// A text-classification service: prompt in, unstructured text out.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn classify(&self, prompt: &Prompt) -> Result<String, ProviderError>;
}

/// A named backend with its own backoff base delay.
#[derive(Clone)]
pub struct Provider {
    name: String,
    base_delay: Duration,
    backend: Arc<dyn Backend>,
}

impl Provider {
    pub fn new(name: impl Into<String>, base_delay: Duration, backend: Arc<dyn Backend>) -> Self {
        Self {
            name: name.into(),
            base_delay,
            backend,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub async fn classify(&self, prompt: &Prompt) -> Result<String, ProviderError> {
        self.backend.classify(prompt).await
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("name", &self.name)
            .field("base_delay", &self.base_delay)
            .finish_non_exhaustive()
    }
}

/// Send a request and decode a JSON reply, mapping HTTP failures onto
/// [`ProviderError`].
pub(crate) async fn send_json<T: DeserializeOwned>(
    request: RequestBuilder,
) -> Result<T, ProviderError> {
    let resp = request.send().await?;
    let status = resp.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = resp
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        return Err(ProviderError::RateLimited { retry_after });
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ProviderError::Server {
            status: status.as_u16(),
            body,
        });
    }
    let bytes = resp.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Shared HTTP client for all backends of a run.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .user_agent(concat!("labelwave/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()
        .map_err(ProviderError::Http)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl Backend for Echo {
        async fn classify(&self, prompt: &Prompt) -> Result<String, ProviderError> {
            Ok(prompt.user.clone())
        }
    }

    #[tokio::test]
    async fn provider_delegates_to_backend() {
        let provider = Provider::new("echo", Duration::from_millis(10), Arc::new(Echo));
        let prompt = Prompt {
            system: String::new(),
            user: "hello".into(),
        };
        assert_eq!(provider.classify(&prompt).await.unwrap(), "hello");
        assert_eq!(provider.name(), "echo");
        assert_eq!(provider.base_delay(), Duration::from_millis(10));
    }

    #[test]
    fn debug_omits_backend() {
        let provider = Provider::new("echo", Duration::ZERO, Arc::new(Echo));
        assert!(format!("{provider:?}").contains("echo"));
    }
}
