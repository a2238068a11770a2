//! OpenRouterClient -- concrete [`TextGenerator`] for the OpenRouter API.
//!
//! Sends single-prompt chat completions to `/chat/completions`. The API key
//! is wrapped in [`secrecy::SecretString`] and only exposed when building the
//! Authorization header; it never appears in Debug output or logs.
//!
//! The client makes exactly one attempt per call. Deadlines, retries, and
//! circuit breaking belong to the node executor in `paperforge-core`.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use paperforge_core::llm::TextGenerator;
use paperforge_types::llm::{GenerateRequest, GenerateResponse, LlmError, Usage};

use crate::config::OpenRouterConfig;

pub struct OpenRouterClient {
    client: reqwest::Client,
    api_key: SecretString,
    config: OpenRouterConfig,
}

// Chat-completions wire format (OpenAI-compatible).

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: String,
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

impl OpenRouterClient {
    pub fn new(api_key: SecretString, config: OpenRouterConfig) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Provider {
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            api_key,
            config,
        })
    }

    fn url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url)
    }

    fn parse_retry_after(response: &reqwest::Response) -> Option<u64> {
        response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(|secs| secs * 1000)
    }
}

impl TextGenerator for OpenRouterClient {
    fn name(&self) -> &str {
        "openrouter"
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, LlmError> {
        let body = ChatRequest {
            model: request.model.clone(),
            messages: vec![ChatMessage {
                role: "user",
                content: request.prompt.clone(),
            }],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        tracing::debug!(
            model = request.model.as_str(),
            prompt_chars = request.prompt.len(),
            "sending generation request"
        );

        let response = self
            .client
            .post(self.url())
            .bearer_auth(self.api_key.expose_secret())
            .header("HTTP-Referer", &self.config.referer)
            .header("X-Title", &self.config.title)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout
                } else {
                    LlmError::Provider {
                        message: format!("HTTP request failed: {e}"),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after_ms = Self::parse_retry_after(&response);
            let error_body = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 | 403 => LlmError::AuthenticationFailed,
                400 | 404 | 422 => LlmError::InvalidRequest(error_body),
                429 => LlmError::RateLimited { retry_after_ms },
                502 | 503 | 529 => LlmError::Overloaded(error_body),
                _ => LlmError::Provider {
                    message: format!("HTTP {status}: {error_body}"),
                },
            });
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(format!("failed to parse response body: {e}")))?;

        let Some(choice) = chat.choices.into_iter().next() else {
            return Err(LlmError::Parse("response contained no choices".to_string()));
        };

        Ok(GenerateResponse {
            content: choice.message.content,
            model: if chat.model.is_empty() {
                request.model.clone()
            } else {
                chat.model
            },
            usage: chat.usage.map(|u| Usage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_format() {
        let body = ChatRequest {
            model: "deepseek/deepseek-r1-0528:free".to_string(),
            messages: vec![ChatMessage {
                role: "user",
                content: "hello".to_string(),
            }],
            max_tokens: 100,
            temperature: Some(0.7),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["max_tokens"], 100);

        let no_temp = ChatRequest {
            temperature: None,
            ..body
        };
        let json = serde_json::to_value(&no_temp).unwrap();
        assert!(json.get("temperature").is_none());
    }

    #[test]
    fn test_response_wire_format() {
        let chat: ChatResponse = serde_json::from_str(
            r#"{
                "model": "qwen/qwen-2.5-7b-instruct:free",
                "choices": [{"message": {"role": "assistant", "content": "hi"}}],
                "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
            }"#,
        )
        .unwrap();
        assert_eq!(chat.choices[0].message.content, "hi");
        assert_eq!(chat.usage.as_ref().unwrap().prompt_tokens, 12);
    }

    #[test]
    fn test_response_without_usage_parses() {
        let chat: ChatResponse = serde_json::from_str(
            r#"{"choices": [{"message": {"content": "hi"}}]}"#,
        )
        .unwrap();
        assert!(chat.usage.is_none());
        assert!(chat.model.is_empty());
    }
}
