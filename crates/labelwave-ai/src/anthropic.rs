//! Anthropic messages backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::send_json;
use crate::{Backend, Prompt, ProviderError};

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
pub const DEFAULT_MODEL: &str = "claude-3-haiku-20240307";

const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4000;

pub struct AnthropicBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: [UserMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct UserMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

impl AnthropicBackend {
    pub fn new(client: reqwest::Client, base_url: &str, api_key: String, model: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
        }
    }

    fn request<'a>(&'a self, prompt: &'a Prompt) -> MessagesRequest<'a> {
        MessagesRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            system: &prompt.system,
            messages: [UserMessage {
                role: "user",
                content: &prompt.user,
            }],
        }
    }
}

/// Text of the first `text` block.
fn extract_text(resp: MessagesResponse) -> Result<String, ProviderError> {
    resp.content
        .into_iter()
        .find(|block| block.kind == "text")
        .and_then(|block| block.text)
        .filter(|text| !text.trim().is_empty())
        .ok_or(ProviderError::EmptyResponse)
}

#[async_trait]
impl Backend for AnthropicBackend {
    async fn classify(&self, prompt: &Prompt) -> Result<String, ProviderError> {
        let url = format!("{}/messages", self.base_url);
        debug!(url = %url, model = %self.model, "calling Anthropic");
        let resp: MessagesResponse = send_json(
            self.client
                .post(&url)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", API_VERSION)
                .json(&self.request(prompt)),
        )
        .await?;
        extract_text(resp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_is_top_level() {
        let backend = AnthropicBackend::new(
            reqwest::Client::new(),
            DEFAULT_BASE_URL,
            "key".into(),
            DEFAULT_MODEL.into(),
        );
        let prompt = Prompt {
            system: "sys".into(),
            user: "posts".into(),
        };
        let json = serde_json::to_value(backend.request(&prompt)).unwrap();
        assert_eq!(json["system"], "sys");
        assert_eq!(json["model"], "claude-3-haiku-20240307");
        assert_eq!(json["messages"].as_array().unwrap().len(), 1);
        assert_eq!(json["messages"][0]["content"], "posts");
    }

    #[test]
    fn skips_non_text_blocks() {
        let resp: MessagesResponse = serde_json::from_str(
            r#"{"content": [{"type": "tool_use", "id": "x"}, {"type": "text", "text": "[]"}]}"#,
        )
        .unwrap();
        assert_eq!(extract_text(resp).unwrap(), "[]");
    }

    #[test]
    fn no_text_is_empty_response() {
        let resp: MessagesResponse = serde_json::from_str(r#"{"content": []}"#).unwrap();
        assert!(matches!(extract_text(resp), Err(ProviderError::EmptyResponse)));
    }
}
