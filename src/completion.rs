//! Chat-completion client
//!
//! The `CompletionBackend` trait is the seam between the pipelines and the
//! model provider, so tests can substitute a scripted backend. The real
//! implementation talks to the OpenAI chat-completions API.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{AppError, Result};

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const REQUEST_TIMEOUT_SECS: u64 = 60;

const CHAT_MODEL: &str = "gpt-4o-mini";
const ENRICHMENT_MODEL: &str = "gpt-4-turbo-preview";
const CHAT_TEMPERATURE: f32 = 0.7;
const CHAT_MAX_TOKENS: u32 = 1000;

#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Plain-text completion for chat turns
    async fn complete(&self, system: &str, user: &str) -> Result<String>;

    /// JSON-object completion for enrichment
    async fn complete_json(&self, system: &str, user: &str) -> Result<String>;
}

#[derive(Debug, Serialize, Clone)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

pub struct OpenAiClient {
    client: Client,
    api_key: Option<String>,
}

impl OpenAiClient {
    pub fn new(api_key: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        OpenAiClient { client, api_key }
    }

    async fn chat_completion(&self, request: ChatCompletionRequest) -> Result<String> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or(AppError::Configuration { integration: "OpenAI" })?;

        let response = self
            .client
            .post(OPENAI_API_URL)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::upstream("OpenAI", e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::upstream(
                "OpenAI",
                format!("({}): {}", status, error_text),
            ));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| AppError::upstream("OpenAI", e.to_string()))?;

        completion
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| AppError::upstream("OpenAI", "no choices in response"))
    }

    fn messages(system: &str, user: &str) -> Vec<ChatMessage> {
        vec![
            ChatMessage {
                role: "system".to_string(),
                content: system.to_string(),
            },
            ChatMessage {
                role: "user".to_string(),
                content: user.to_string(),
            },
        ]
    }
}

#[async_trait]
impl CompletionBackend for OpenAiClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        self.chat_completion(ChatCompletionRequest {
            model: CHAT_MODEL.to_string(),
            messages: Self::messages(system, user),
            temperature: CHAT_TEMPERATURE,
            max_tokens: Some(CHAT_MAX_TOKENS),
            response_format: None,
        })
        .await
    }

    async fn complete_json(&self, system: &str, user: &str) -> Result<String> {
        self.chat_completion(ChatCompletionRequest {
            model: ENRICHMENT_MODEL.to_string(),
            messages: Self::messages(system, user),
            temperature: CHAT_TEMPERATURE,
            max_tokens: None,
            response_format: Some(ResponseFormat {
                format_type: "json_object".to_string(),
            }),
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_key_is_configuration_error() {
        let client = OpenAiClient::new(None);
        let err = client.complete("system", "hello").await.unwrap_err();
        assert!(matches!(err, AppError::Configuration { integration: "OpenAI" }));
    }

    #[test]
    fn test_request_serialization_omits_unset_fields() {
        let request = ChatCompletionRequest {
            model: CHAT_MODEL.to_string(),
            messages: OpenAiClient::messages("s", "u"),
            temperature: CHAT_TEMPERATURE,
            max_tokens: Some(CHAT_MAX_TOKENS),
            response_format: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["max_tokens"], 1000);
        assert!(json.get("response_format").is_none());

        let request = ChatCompletionRequest {
            model: ENRICHMENT_MODEL.to_string(),
            messages: OpenAiClient::messages("s", "u"),
            temperature: CHAT_TEMPERATURE,
            max_tokens: None,
            response_format: Some(ResponseFormat {
                format_type: "json_object".to_string(),
            }),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["response_format"]["type"], "json_object");
        assert!(json.get("max_tokens").is_none());
    }
}
