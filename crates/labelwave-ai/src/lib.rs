//! Classification backends: prompt rendering, HTTP clients for the hosted
//! model APIs, and the registry that turns configured credentials into
//! providers.

pub mod anthropic;
mod backend;
mod error;
pub mod gemini;
pub mod openai;
pub mod prompt;
mod registry;

pub use anthropic::AnthropicBackend;
pub use backend::{Backend, Provider, http_client};
pub use error::ProviderError;
pub use gemini::GeminiBackend;
pub use openai::OpenAiBackend;
pub use prompt::Prompt;
pub use registry::{BackendKind, Credential, DEFAULT_HTTP_TIMEOUT, ProviderConfig, ProviderRegistry};
