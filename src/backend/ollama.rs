//! Ollama REST backend
//!
//! Implements [`ModelBackend`] against a locally hosted Ollama endpoint
//! (`/api/generate`, non-streaming). Token usage is read from the
//! `eval_count` field and accumulated across calls.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};

use crate::backend::{
    BackendError, GenerateParams, Generation, ModelBackend, TokenUsage, request_timeout,
};
use crate::config::BackendConfig;

/// Client for a local Ollama inference endpoint
pub struct OllamaBackend {
    client: Client,
    config: BackendConfig,
    usage: Arc<Mutex<TokenUsage>>,
}

impl OllamaBackend {
    /// Create a new backend from endpoint settings
    pub fn new(config: BackendConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(request_timeout(config.timeout_secs))
            .build()
            .map_err(|e| BackendError::BadRequest(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            usage: Arc::new(Mutex::new(TokenUsage::default())),
        })
    }

    fn generate_url(&self) -> String {
        format!("{}/api/generate", self.config.base_url.trim_end_matches('/'))
    }

    fn build_request(&self, prompt: &str, context: &str, params: &GenerateParams) -> Value {
        let model = params.model.as_ref().unwrap_or(&self.config.model);
        let full_prompt = if context.is_empty() {
            prompt.to_string()
        } else {
            format!("{}\n\n{}", context, prompt)
        };

        json!({
            "model": model,
            "prompt": full_prompt,
            "temperature": params.temperature,
            "stream": false,
        })
    }

    fn parse_response(&self, body: Value) -> Result<Generation, BackendError> {
        let text = body
            .get("response")
            .and_then(Value::as_str)
            .ok_or_else(|| BackendError::InvalidResponse("missing 'response' field".into()))?
            .trim()
            .to_string();

        let tokens = body.get("eval_count").and_then(Value::as_u64).unwrap_or(0);
        let usage = TokenUsage::new(tokens);

        {
            let mut total = self.usage.lock().unwrap();
            total.add(&usage);
        }

        Ok(Generation { text, usage })
    }
}

#[async_trait]
impl ModelBackend for OllamaBackend {
    async fn generate(
        &self,
        prompt: &str,
        context: &str,
        params: GenerateParams,
    ) -> Result<Generation, BackendError> {
        let body = self.build_request(prompt, context, &params);

        let response = self
            .client
            .post(self.generate_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    BackendError::Unavailable(e.to_string())
                } else {
                    BackendError::BadRequest(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_server_error() {
            return Err(BackendError::Unavailable(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(BackendError::BadRequest(format!("HTTP {}: {}", status, detail)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;

        self.parse_response(body)
    }

    fn total_usage(&self) -> TokenUsage {
        *self.usage.lock().unwrap()
    }
}
