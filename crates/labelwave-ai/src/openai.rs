//! OpenAI chat completions backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::send_json;
use crate::{Backend, Prompt, ProviderError};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

const TEMPERATURE: f32 = 0.1;
const MAX_TOKENS: u32 = 4000;

pub struct OpenAiBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl OpenAiBackend {
    pub fn new(client: reqwest::Client, base_url: &str, api_key: String, model: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
        }
    }

    fn request<'a>(&'a self, prompt: &'a Prompt) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        }
    }
}

fn extract_text(resp: ChatResponse) -> Result<String, ProviderError> {
    resp.choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|text| !text.trim().is_empty())
        .ok_or(ProviderError::EmptyResponse)
}

#[async_trait]
impl Backend for OpenAiBackend {
    async fn classify(&self, prompt: &Prompt) -> Result<String, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(url = %url, model = %self.model, "calling OpenAI");
        let resp: ChatResponse = send_json(
            self.client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&self.request(prompt)),
        )
        .await?;
        extract_text(resp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> OpenAiBackend {
        OpenAiBackend::new(
            reqwest::Client::new(),
            "https://api.openai.com/v1/",
            "sk-test".into(),
            DEFAULT_MODEL.into(),
        )
    }

    #[test]
    fn request_carries_system_and_user_messages() {
        let backend = backend();
        let prompt = Prompt {
            system: "sys".into(),
            user: "posts".into(),
        };
        let json = serde_json::to_value(backend.request(&prompt)).unwrap();
        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][0]["content"], "sys");
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["messages"][1]["content"], "posts");
        assert_eq!(json["max_tokens"], 4000);
    }

    #[test]
    fn base_url_is_trimmed() {
        assert_eq!(backend().base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn extracts_first_choice() {
        let resp: ChatResponse = serde_json::from_str(
            r#"{"choices": [{"message": {"role": "assistant", "content": "[{\"id\": 1}]"}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_text(resp).unwrap(), r#"[{"id": 1}]"#);
    }

    #[test]
    fn null_content_is_empty_response() {
        let resp: ChatResponse =
            serde_json::from_str(r#"{"choices": [{"message": {"content": null}}]}"#).unwrap();
        assert!(matches!(extract_text(resp), Err(ProviderError::EmptyResponse)));

        let resp: ChatResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(matches!(extract_text(resp), Err(ProviderError::EmptyResponse)));
    }
}
