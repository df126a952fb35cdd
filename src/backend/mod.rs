//! Model backend abstraction
//!
//! Every agent's language-model access goes through [`ModelBackend`], a
//! single opaque `generate(prompt, context, params)` call with token-usage
//! accounting. The backend distinguishes transient failures (retryable with
//! backoff) from bad requests (fatal to the call).

mod mock;
mod ollama;

pub use mock::{ScriptedBackend, ScriptedReply};
pub use ollama::OllamaBackend;

use crate::config::RetryPolicy;
use async_trait::async_trait;
use std::time::Duration;

/// Sampling parameters for one generation call
#[derive(Debug, Clone)]
pub struct GenerateParams {
    pub temperature: f32,
    /// Override of the configured model name
    pub model: Option<String>,
}

impl Default for GenerateParams {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            model: None,
        }
    }
}

impl GenerateParams {
    pub fn with_temperature(temperature: f32) -> Self {
        Self {
            temperature,
            ..Default::default()
        }
    }
}

/// Token accounting reported per call and accumulated per run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub tokens: u64,
}

impl TokenUsage {
    pub fn new(tokens: u64) -> Self {
        Self { tokens }
    }

    pub fn add(&mut self, other: &TokenUsage) {
        self.tokens += other.tokens;
    }
}

/// One completed generation
#[derive(Debug, Clone)]
pub struct Generation {
    pub text: String,
    pub usage: TokenUsage,
}

/// Errors from the model backend
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Backend unreachable or overloaded; safe to retry
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// The request itself was rejected; retrying is pointless
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Response arrived but could not be interpreted
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl BackendError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, BackendError::Unavailable(_))
    }
}

/// Opaque text-generation interface to the model backend
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Generate a completion for `prompt`, with `context` prepended when
    /// non-empty
    async fn generate(
        &self,
        prompt: &str,
        context: &str,
        params: GenerateParams,
    ) -> Result<Generation, BackendError>;

    /// Cumulative token usage across all calls on this backend
    fn total_usage(&self) -> TokenUsage;
}

/// Call `op` with bounded retries and exponential backoff on transient
/// failures. Non-retryable errors surface immediately.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, BackendError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, BackendError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                log::warn!(
                    "backend attempt {}/{} failed ({}), retrying in {:?}",
                    attempt,
                    policy.max_attempts,
                    err,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Clamp backend timeouts to something sane for tests
pub(crate) fn request_timeout(secs: u64) -> Duration {
    Duration::from_secs(secs.max(1))
}
