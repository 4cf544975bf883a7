//! OpenAI-compatible chat completions backend.
//!
//! Covers every provider that speaks `POST {base_url}/chat/completions`.
//! One request per call; no retries.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{ChatResponse, GenerationOptions, LlmBackend, LlmError, Message};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenAiCompatConfig {
    /// Provider label for logs and results
    pub provider_name: String,
    /// API root, e.g. `http://localhost:11434/v1`
    pub base_url: String,
    /// Default model when the request does not name one
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for OpenAiCompatConfig {
    fn default() -> Self {
        Self {
            provider_name: "openai-compatible".to_string(),
            base_url: "http://localhost:11434/v1".to_string(),
            model: None,
            api_key: None,
            timeout_secs: 120,
        }
    }
}

pub struct OpenAiCompatBackend {
    config: OpenAiCompatConfig,
    client: Client,
}

impl OpenAiCompatBackend {
    pub fn new(config: OpenAiCompatConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            config: OpenAiCompatConfig {
                base_url: config.base_url.trim_end_matches('/').to_string(),
                ..config
            },
            client,
        })
    }

    pub fn config(&self) -> &OpenAiCompatConfig {
        &self.config
    }
}

// ============================================================================
// Wire format
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatCompletionsRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

fn status_error(status: StatusCode, body: String) -> LlmError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        LlmError::RateLimited
    } else {
        LlmError::Http {
            status: status.as_u16(),
            body,
        }
    }
}

fn transport_error(e: &reqwest::Error) -> LlmError {
    if e.is_timeout() {
        LlmError::Timeout
    } else {
        LlmError::Transport(e.to_string())
    }
}

#[async_trait]
impl LlmBackend for OpenAiCompatBackend {
    async fn chat(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<ChatResponse, LlmError> {
        let model = options
            .model
            .as_deref()
            .or(self.config.model.as_deref())
            .ok_or_else(|| {
                LlmError::Config(format!(
                    "no model configured for provider '{}'",
                    self.config.provider_name
                ))
            })?;

        let request = ChatCompletionsRequest {
            model,
            messages,
            temperature: options.temperature,
        };

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .json(&request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        tracing::debug!(
            provider = %self.config.provider_name,
            model = %model,
            messages = messages.len(),
            "Sending chat completion request"
        );

        let response = builder.send().await.map_err(|e| transport_error(&e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(status_error(status, body));
        }

        let parsed: ChatCompletionsResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout
            } else {
                LlmError::InvalidResponse(e.to_string())
            }
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("no choices in response".to_string()))?
            .message
            .content
            .unwrap_or_default();
        let usage = parsed.usage.unwrap_or(Usage {
            prompt_tokens: 0,
            completion_tokens: 0,
        });

        Ok(ChatResponse {
            content,
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            model: parsed.model.or_else(|| Some(model.to_string())),
        })
    }

    fn backend_name(&self) -> &str {
        &self.config.provider_name
    }

    fn default_model(&self) -> Option<&str> {
        self.config.model.as_deref()
    }
}
