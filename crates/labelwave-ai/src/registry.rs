//! Provider registry: explicit credentials in, usable providers out.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::backend::http_client;
use crate::{AnthropicBackend, Backend, GeminiBackend, OpenAiBackend, Provider, ProviderError};
use crate::{anthropic, gemini, openai};

/// Per-request HTTP timeout unless configured otherwise.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    OpenAi,
    Anthropic,
    Gemini,
}

impl BackendKind {
    pub fn default_model(self) -> &'static str {
        match self {
            Self::OpenAi => openai::DEFAULT_MODEL,
            Self::Anthropic => anthropic::DEFAULT_MODEL,
            Self::Gemini => gemini::DEFAULT_MODEL,
        }
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::OpenAi => openai::DEFAULT_BASE_URL,
            Self::Anthropic => anthropic::DEFAULT_BASE_URL,
            Self::Gemini => gemini::DEFAULT_BASE_URL,
        }
    }

    /// First backoff delay after a rate limit. Gemini throttles harder.
    pub fn base_delay(self) -> Duration {
        match self {
            Self::OpenAi | Self::Anthropic => Duration::from_millis(1000),
            Self::Gemini => Duration::from_millis(2000),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "gemini" | "google" => Ok(Self::Gemini),
            other => Err(ProviderError::Config(format!("unknown backend kind {other:?}"))),
        }
    }
}

/// One configured backend account.
#[derive(Clone)]
pub struct Credential {
    pub name: String,
    pub kind: BackendKind,
    pub api_key: String,
    pub model: Option<String>,
    pub base_url: Option<String>,
}

impl Credential {
    pub fn new(name: impl Into<String>, kind: BackendKind, api_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            api_key: api_key.into(),
            model: None,
            base_url: None,
        }
    }

    /// Blank keys never work, and OpenAI keys always start with `sk-`.
    pub fn is_usable(&self) -> bool {
        let key = self.api_key.trim();
        if key.is_empty() {
            return false;
        }
        match self.kind {
            BackendKind::OpenAi => key.starts_with("sk-"),
            BackendKind::Anthropic | BackendKind::Gemini => true,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub credentials: Vec<Credential>,
    pub http_timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            credentials: Vec::new(),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

impl ProviderConfig {
    /// One credential per key in each comma-separated list, named
    /// `<kind>-<n>` with `n` counting from 1 within the kind.
    pub fn from_key_lists(
        openai: Option<&str>,
        anthropic: Option<&str>,
        gemini: Option<&str>,
    ) -> Self {
        let mut credentials = Vec::new();
        for (kind, list) in [
            (BackendKind::OpenAi, openai),
            (BackendKind::Anthropic, anthropic),
            (BackendKind::Gemini, gemini),
        ] {
            let keys = list
                .unwrap_or_default()
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty());
            for (n, key) in keys.enumerate() {
                credentials.push(Credential::new(format!("{kind}-{}", n + 1), kind, key));
            }
        }
        Self {
            credentials,
            ..Self::default()
        }
    }
}

/// Builds the provider set for a run from explicit configuration.
pub struct ProviderRegistry {
    config: ProviderConfig,
    custom: Vec<Provider>,
}

impl ProviderRegistry {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            config,
            custom: Vec::new(),
        }
    }

    /// Add a ready-made provider, listed after the configured credentials.
    pub fn with_provider(mut self, provider: Provider) -> Self {
        self.custom.push(provider);
        self
    }

    /// Providers for every usable credential in configuration order, then
    /// any custom providers.
    ///
    /// Unusable credentials are skipped; a repeated name keeps the first.
    /// An empty result is not an error here.
    pub fn discover(&self) -> Result<Vec<Provider>, ProviderError> {
        let mut seen = HashSet::new();
        let mut providers = Vec::new();
        if !self.config.credentials.is_empty() {
            self.discover_configured(&mut seen, &mut providers)?;
        }
        for provider in &self.custom {
            if seen.insert(provider.name().to_string()) {
                providers.push(provider.clone());
            } else {
                warn!(name = provider.name(), "duplicate provider name, keeping the first");
            }
        }
        Ok(providers)
    }

    fn discover_configured(
        &self,
        seen: &mut HashSet<String>,
        providers: &mut Vec<Provider>,
    ) -> Result<(), ProviderError> {
        let client = http_client(self.config.http_timeout)?;

        for cred in &self.config.credentials {
            if !cred.is_usable() {
                debug!(name = %cred.name, kind = %cred.kind, "skipping unusable credential");
                continue;
            }
            if !seen.insert(cred.name.clone()) {
                warn!(name = %cred.name, "duplicate provider name, keeping the first");
                continue;
            }

            let base_url = cred
                .base_url
                .as_deref()
                .unwrap_or(cred.kind.default_base_url());
            let model = cred
                .model
                .clone()
                .unwrap_or_else(|| cred.kind.default_model().to_string());
            let key = cred.api_key.trim().to_string();
            let backend: Arc<dyn Backend> = match cred.kind {
                BackendKind::OpenAi => {
                    Arc::new(OpenAiBackend::new(client.clone(), base_url, key, model.clone()))
                }
                BackendKind::Anthropic => Arc::new(AnthropicBackend::new(
                    client.clone(),
                    base_url,
                    key,
                    model.clone(),
                )),
                BackendKind::Gemini => {
                    Arc::new(GeminiBackend::new(client.clone(), base_url, key, model.clone()))
                }
            };
            info!(name = %cred.name, kind = %cred.kind, model = %model, "provider registered");
            providers.push(Provider::new(cred.name.clone(), cred.kind.base_delay(), backend));
        }
        Ok(())
    }
}
