//! Reusable chat session.
//!
//! Holds the system prompt and running totals across interpretation calls
//! so a caller can interpret several models over one provider connection.
//! Each request carries only the system prompt and the current user
//! message; earlier turns are kept in `history` for inspection, not
//! resent.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use super::{ChatResponse, GenerationOptions, LlmBackend, LlmError, Message};
use crate::types::ModelType;

pub struct ChatSession {
    id: Uuid,
    model_type: ModelType,
    backend: Arc<dyn LlmBackend>,
    system_prompt: String,
    history: Vec<Message>,
    input_tokens: u64,
    output_tokens: u64,
    n_interpretations: u64,
    created_at: DateTime<Utc>,
}

impl ChatSession {
    pub fn new(
        model_type: ModelType,
        backend: Arc<dyn LlmBackend>,
        system_prompt: impl Into<String>,
    ) -> Self {
        let session = Self {
            id: Uuid::new_v4(),
            model_type,
            backend,
            system_prompt: system_prompt.into(),
            history: Vec::new(),
            input_tokens: 0,
            output_tokens: 0,
            n_interpretations: 0,
            created_at: Utc::now(),
        };
        debug!(
            session_id = %session.id,
            model_type = %model_type,
            backend = session.backend.backend_name(),
            "Created chat session"
        );
        session
    }

    /// Send `user_prompt` with the session's system prompt.
    ///
    /// Token counters only move through [`record_interpretation`], so a
    /// failed call leaves the session untouched.
    ///
    /// [`record_interpretation`]: Self::record_interpretation
    pub async fn chat(
        &mut self,
        user_prompt: &str,
        options: &GenerationOptions,
    ) -> Result<ChatResponse, LlmError> {
        let messages = [
            Message::system(self.system_prompt.clone()),
            Message::user(user_prompt),
        ];
        let response = self.backend.chat(&messages, options).await?;
        self.history.push(Message::user(user_prompt));
        self.history.push(Message::assistant(response.content.clone()));
        Ok(response)
    }

    /// Count one successful interpretation and its token usage.
    pub fn record_interpretation(&mut self, input_tokens: u64, output_tokens: u64) {
        self.input_tokens = self.input_tokens.saturating_add(input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(output_tokens);
        self.n_interpretations += 1;
    }

    /// Zero the counters and clear history. Identity, model type, system
    /// prompt and creation time stay.
    pub fn reset(&mut self) {
        self.history.clear();
        self.input_tokens = 0;
        self.output_tokens = 0;
        self.n_interpretations = 0;
        debug!(session_id = %self.id, "Session reset");
    }

    /// Swap in a different system prompt.
    ///
    /// Returns `true` when a non-empty stored prompt was overridden. A
    /// session created without a prompt adopts the first one it is given.
    pub fn replace_system_prompt(&mut self, system_prompt: &str) -> bool {
        if self.system_prompt == system_prompt {
            return false;
        }
        let overridden = !self.system_prompt.trim().is_empty();
        debug!(session_id = %self.id, overridden, "Replacing session system prompt");
        self.system_prompt = system_prompt.to_string();
        overridden
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn model_type(&self) -> ModelType {
        self.model_type
    }

    pub fn backend(&self) -> &Arc<dyn LlmBackend> {
        &self.backend
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn input_tokens(&self) -> u64 {
        self.input_tokens
    }

    pub fn output_tokens(&self) -> u64 {
        self.output_tokens
    }

    pub fn n_interpretations(&self) -> u64 {
        self.n_interpretations
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("id", &self.id)
            .field("model_type", &self.model_type)
            .field("backend", &self.backend.backend_name())
            .field("history_len", &self.history.len())
            .field("input_tokens", &self.input_tokens)
            .field("output_tokens", &self.output_tokens)
            .field("n_interpretations", &self.n_interpretations)
            .field("created_at", &self.created_at)
            .finish()
    }
}
