//! Inference client
//!
//! `infer(prompt, options) -> text` over any [`LlmBackend`], with a per-call
//! timeout and exponential-backoff retries for timeouts and transient
//! network failures. The client holds no per-call state, so one instance is
//! shared by every agent and session.

use std::sync::Arc;
use std::time::Duration;

use docchat_config::InferenceConfig;

use crate::backend::{InferenceOptions, LlmBackend};
use crate::prompt::{Message, Prompt};
use crate::LlmError;

/// Timeout and retry policy
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Per-call timeout
    pub timeout: Duration,
    /// Retries after the first call
    pub max_retries: u32,
    /// First retry delay; doubles on each retry
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&InferenceConfig::default())
    }
}

impl From<&InferenceConfig> for RetryPolicy {
    fn from(config: &InferenceConfig) -> Self {
        Self {
            timeout: config.timeout(),
            max_retries: config.max_retries,
            initial_backoff: config.initial_backoff(),
        }
    }
}

/// Shared inference entry point for the agents
#[derive(Clone)]
pub struct InferenceClient {
    backend: Arc<dyn LlmBackend>,
    policy: RetryPolicy,
}

impl InferenceClient {
    pub fn new(backend: Arc<dyn LlmBackend>, policy: RetryPolicy) -> Self {
        Self { backend, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn model_name(&self) -> &str {
        self.backend.model_name()
    }

    pub async fn is_available(&self) -> bool {
        self.backend.is_available().await
    }

    /// Run a prompt and return the trimmed reply text
    pub async fn infer(&self, prompt: &Prompt, options: &InferenceOptions) -> Result<String, LlmError> {
        self.infer_messages(&prompt.to_messages(), options).await
    }

    /// Run a message list and return the trimmed reply text
    pub async fn infer_messages(
        &self,
        messages: &[Message],
        options: &InferenceOptions,
    ) -> Result<String, LlmError> {
        let timeout = options.timeout.unwrap_or(self.policy.timeout);
        let mut backoff = self.policy.initial_backoff;
        let mut last_error = None;

        for attempt in 0..=self.policy.max_retries {
            if attempt > 0 {
                tracing::warn!(
                    model = self.backend.model_name(),
                    attempt,
                    max_retries = self.policy.max_retries,
                    backoff_ms = backoff.as_millis() as u64,
                    error = ?last_error,
                    "Inference call failed, retrying"
                );
                metrics::counter!("docchat_inference_retries_total", "model" => self.backend.model_name().to_string())
                    .increment(1);
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }

            match tokio::time::timeout(timeout, self.backend.generate(messages, options)).await {
                Ok(Ok(result)) => return Ok(result.text.trim().to_string()),
                Ok(Err(e)) if e.is_retryable() => last_error = Some(e),
                Ok(Err(e)) => return Err(e),
                Err(_) => last_error = Some(LlmError::Timeout),
            }
        }

        Err(last_error.unwrap_or(LlmError::Timeout))
    }
}
