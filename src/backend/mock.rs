//! Scripted backend for tests
//!
//! Returns canned responses in order, then falls back to echoing a marker.
//! Also usable to inject transient failures for retry tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::backend::{BackendError, GenerateParams, Generation, ModelBackend, TokenUsage};

/// One scripted reply
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    Transient(String),
    BadRequest(String),
}

/// Backend that replays a fixed script of responses
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<ScriptedReply>>,
    fallback: Mutex<Option<String>>,
    prompts: Mutex<Vec<String>>,
    usage: Arc<Mutex<TokenUsage>>,
    /// Tokens charged per successful reply
    tokens_per_reply: u64,
}

impl ScriptedBackend {
    /// Create a backend that answers every prompt with `text`
    pub fn always(text: impl Into<String>) -> Self {
        let backend = Self::new(vec![]);
        backend.set_fallback(text);
        backend
    }

    /// Create a backend with an ordered reply script
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            fallback: Mutex::new(None),
            prompts: Mutex::new(Vec::new()),
            usage: Arc::new(Mutex::new(TokenUsage::default())),
            tokens_per_reply: 10,
        }
    }

    /// Convenience: script plain-text replies in order
    pub fn with_texts(texts: Vec<&str>) -> Self {
        Self::new(
            texts
                .into_iter()
                .map(|t| ScriptedReply::Text(t.to_string()))
                .collect(),
        )
    }

    fn set_fallback(&self, text: impl Into<String>) {
        *self.fallback.lock().unwrap() = Some(text.into());
    }

    /// Prompts observed so far, in call order
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    /// Number of generate calls made
    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    fn next_reply(&self) -> ScriptedReply {
        let mut replies = self.replies.lock().unwrap();
        if let Some(reply) = replies.pop_front() {
            return reply;
        }
        if let Some(text) = self.fallback.lock().unwrap().clone() {
            return ScriptedReply::Text(text);
        }
        ScriptedReply::Text("scripted-response".to_string())
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    async fn generate(
        &self,
        prompt: &str,
        context: &str,
        _params: GenerateParams,
    ) -> Result<Generation, BackendError> {
        let recorded = if context.is_empty() {
            prompt.to_string()
        } else {
            format!("{}\n\n{}", context, prompt)
        };
        self.prompts.lock().unwrap().push(recorded);

        match self.next_reply() {
            ScriptedReply::Text(text) => {
                let usage = TokenUsage::new(self.tokens_per_reply);
                self.usage.lock().unwrap().add(&usage);
                Ok(Generation { text, usage })
            }
            ScriptedReply::Transient(msg) => Err(BackendError::Unavailable(msg)),
            ScriptedReply::BadRequest(msg) => Err(BackendError::BadRequest(msg)),
        }
    }

    fn total_usage(&self) -> TokenUsage {
        *self.usage.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replays_script_in_order() {
        let backend = ScriptedBackend::with_texts(vec!["first", "second"]);

        let a = backend.generate("p1", "", GenerateParams::default()).await.unwrap();
        let b = backend.generate("p2", "", GenerateParams::default()).await.unwrap();

        assert_eq!(a.text, "first");
        assert_eq!(b.text, "second");
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn test_falls_back_after_script_runs_out() {
        let backend = ScriptedBackend::with_texts(vec!["only"]);
        backend.generate("p1", "", GenerateParams::default()).await.unwrap();

        let extra = backend.generate("p2", "", GenerateParams::default()).await.unwrap();
        assert_eq!(extra.text, "scripted-response");
    }

    #[tokio::test]
    async fn test_transient_reply_is_unavailable() {
        let backend = ScriptedBackend::new(vec![
            ScriptedReply::Transient("down".into()),
            ScriptedReply::Text("up".into()),
        ]);

        let err = backend
            .generate("p", "", GenerateParams::default())
            .await
            .unwrap_err();
        assert!(err.is_retryable());

        let ok = backend.generate("p", "", GenerateParams::default()).await.unwrap();
        assert_eq!(ok.text, "up");
    }

    #[tokio::test]
    async fn test_records_context_with_prompt() {
        let backend = ScriptedBackend::always("ok");
        backend
            .generate("question", "digest", GenerateParams::default())
            .await
            .unwrap();

        let prompts = backend.prompts();
        assert!(prompts[0].contains("digest"));
        assert!(prompts[0].contains("question"));
    }

    #[tokio::test]
    async fn test_usage_accumulates() {
        let backend = ScriptedBackend::with_texts(vec!["a", "b"]);
        backend.generate("1", "", GenerateParams::default()).await.unwrap();
        backend.generate("2", "", GenerateParams::default()).await.unwrap();
        assert_eq!(backend.total_usage().tokens, 20);
    }
}
