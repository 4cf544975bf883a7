//! Backend that replays scripted replies instead of calling a model.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use super::{ChatResponse, GenerationOptions, LlmBackend, LlmError, Message};

/// Replies in order from a queue and records every request it receives.
///
/// An exhausted queue answers with the fallback reply, or with an
/// [`LlmError::InvalidResponse`] when none is set. Token counts are word
/// counts of the prompt and reply.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    fallback: Option<String>,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend that always answers with `reply`.
    pub fn always(reply: impl Into<String>) -> Self {
        Self {
            fallback: Some(reply.into()),
            ..Self::default()
        }
    }

    pub fn with_reply(self, reply: impl Into<String>) -> Self {
        self.push(Ok(reply.into()))
    }

    pub fn with_error(self, error: LlmError) -> Self {
        self.push(Err(error))
    }

    fn push(self, item: Result<String, LlmError>) -> Self {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(item);
        self
    }

    /// Messages of every call so far, oldest first.
    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn n_calls(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

fn word_count(text: &str) -> u64 {
    u64::try_from(text.split_whitespace().count()).unwrap_or(u64::MAX)
}

#[async_trait]
impl LlmBackend for ScriptedBackend {
    async fn chat(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<ChatResponse, LlmError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(messages.to_vec());

        let next = self
            .replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        let content = match next {
            Some(reply) => reply?,
            None => self.fallback.clone().ok_or_else(|| {
                LlmError::InvalidResponse("scripted backend has no replies left".to_string())
            })?,
        };

        Ok(ChatResponse {
            input_tokens: messages.iter().map(|m| word_count(&m.content)).sum(),
            output_tokens: word_count(&content),
            content,
            model: options.model.clone().or_else(|| Some("scripted".to_string())),
        })
    }

    fn backend_name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replays_in_order_then_fallback() {
        let b = ScriptedBackend::always("fallback")
            .with_reply("one")
            .with_error(LlmError::Timeout);
        let opts = GenerationOptions::default();
        let msgs = [Message::user("two words")];

        let first = b.chat(&msgs, &opts).await.unwrap();
        assert_eq!(first.content, "one");
        assert_eq!(first.input_tokens, 2);
        assert_eq!(first.output_tokens, 1);

        assert_eq!(b.chat(&msgs, &opts).await.unwrap_err(), LlmError::Timeout);
        assert_eq!(b.chat(&msgs, &opts).await.unwrap().content, "fallback");
        assert_eq!(b.n_calls(), 3);
    }

    #[test]
    fn test_exhausted_without_fallback() {
        let b = ScriptedBackend::new();
        let res = tokio_test::block_on(b.chat(&[], &GenerationOptions::default()));
        assert!(matches!(res, Err(LlmError::InvalidResponse(_))));
    }
}
