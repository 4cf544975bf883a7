//! LLM Backend Module
//!
//! A single chat interface over whatever serves the model.
//!
//! ## Backends
//!
//! - **OpenAiCompatBackend**: any `/chat/completions` endpoint (OpenAI,
//!   OpenRouter, Ollama, LM Studio, vLLM)
//! - **ScriptedBackend**: replays canned replies; used by tests and dry runs
//!
//! [`ChatSession`] wraps a backend with the state that outlives one call:
//! system prompt, history and token counters.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

pub mod openai_compat;
pub mod scripted;
pub mod session;

pub use openai_compat::{OpenAiCompatBackend, OpenAiCompatConfig};
pub use scripted::ScriptedBackend;
pub use session::ChatSession;

use crate::config::LlmArgs;

/// Environment variables checked, in order, for an API key.
pub const API_KEY_ENV_VARS: &[&str] = &["PSYCHINTERPRETER_API_KEY", "OPENAI_API_KEY"];

// ============================================================================
// Messages
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Per-request generation settings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationOptions {
    /// Overrides the backend's default model
    pub model: Option<String>,
    pub temperature: Option<f64>,
}

impl From<&LlmArgs> for GenerationOptions {
    fn from(args: &LlmArgs) -> Self {
        Self {
            model: args.model.clone(),
            temperature: args.temperature,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Model that actually answered, when the backend reports it
    pub model: Option<String>,
}

// ============================================================================
// Errors
// ============================================================================

/// Provider and transport failures. Passed to callers unchanged.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LlmError {
    #[error("LLM request timed out")]
    Timeout,

    #[error("LLM provider rate limit exceeded")]
    RateLimited,

    #[error("LLM provider returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("LLM transport error: {0}")]
    Transport(String),

    #[error("LLM response could not be decoded: {0}")]
    InvalidResponse(String),

    #[error("LLM configuration error: {0}")]
    Config(String),
}

// ============================================================================
// Backend trait
// ============================================================================

/// Unified trait for LLM backends
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Send one chat request and wait for the complete reply
    async fn chat(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<ChatResponse, LlmError>;

    /// Backend name for logging
    fn backend_name(&self) -> &str;

    /// Model used when the request does not name one
    fn default_model(&self) -> Option<&str> {
        None
    }
}

/// Build the backend named by `args.provider`.
///
/// Known providers get their default base URL; anything else needs
/// `base_url`. The API key comes from [`API_KEY_ENV_VARS`].
pub fn create_backend(args: &LlmArgs) -> Result<Arc<dyn LlmBackend>, LlmError> {
    let provider = args.provider.to_lowercase();
    let base_url = match (args.base_url.as_deref(), default_base_url(&provider)) {
        (Some(url), _) => url.to_string(),
        (None, Some(url)) => url.to_string(),
        (None, None) => {
            return Err(LlmError::Config(format!(
                "unknown provider '{}' and no base_url given",
                args.provider
            )))
        }
    };

    let api_key = API_KEY_ENV_VARS
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|k| !k.trim().is_empty()));
    if api_key.is_none() && matches!(provider.as_str(), "openai" | "openrouter") {
        return Err(LlmError::Config(format!(
            "provider '{}' needs an API key in {}",
            args.provider,
            API_KEY_ENV_VARS.join(" or ")
        )));
    }

    let config = OpenAiCompatConfig {
        provider_name: provider,
        base_url,
        model: args.model.clone(),
        api_key,
        ..OpenAiCompatConfig::default()
    };

    tracing::info!(
        provider = %config.provider_name,
        base_url = %config.base_url,
        model = config.model.as_deref().unwrap_or("(provider default)"),
        "Creating LLM backend"
    );

    Ok(Arc::new(OpenAiCompatBackend::new(config)?))
}

/// Default endpoint for a known provider.
pub fn default_base_url(provider: &str) -> Option<&'static str> {
    match provider {
        "openai" => Some("https://api.openai.com/v1"),
        "openrouter" => Some("https://openrouter.ai/api/v1"),
        "ollama" => Some("http://localhost:11434/v1"),
        "lmstudio" | "lm_studio" => Some("http://localhost:1234/v1"),
        _ => None,
    }
}
