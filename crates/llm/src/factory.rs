//! LLM Factory
//!
//! Creates the configured backend and wraps it in an [`InferenceClient`].
//!
//! ## Example
//! ```ignore
//! let settings = docchat_config::load_settings(None)?;
//! let client = LlmFactory::create_client(&settings.inference)?;
//! ```

use std::sync::Arc;

use docchat_config::{InferenceBackend, InferenceConfig};

use crate::backend::{LlmBackend, LlmConfig, OllamaBackend, OpenAIBackend, OpenAIConfig};
use crate::client::{InferenceClient, RetryPolicy};
use crate::LlmError;

/// Factory for creating LLM backends from configuration
pub struct LlmFactory;

impl LlmFactory {
    /// Create the configured backend
    pub fn create(config: &InferenceConfig) -> Result<Arc<dyn LlmBackend>, LlmError> {
        // HTTP timeout sits above the per-call limit so the client's timeout fires first
        let http_timeout = config.timeout() * 2;

        match config.backend {
            InferenceBackend::Ollama => {
                let backend = OllamaBackend::new(LlmConfig {
                    model: config.model.clone(),
                    endpoint: config.endpoint.clone(),
                    max_tokens: config.max_tokens,
                    temperature: config.temperature,
                    timeout: http_timeout,
                    ..Default::default()
                })?;
                tracing::info!(model = %config.model, endpoint = %config.endpoint, "Created Ollama backend");
                Ok(Arc::new(backend))
            }
            InferenceBackend::OpenAI => {
                let backend = OpenAIBackend::new(OpenAIConfig {
                    endpoint: config.endpoint.clone(),
                    api_key: config.api_key.clone().unwrap_or_default(),
                    model: config.model.clone(),
                    max_tokens: config.max_tokens,
                    temperature: config.temperature,
                    timeout: http_timeout,
                    ..Default::default()
                })?;
                tracing::info!(model = %config.model, endpoint = %config.endpoint, "Created OpenAI-compatible backend");
                Ok(Arc::new(backend))
            }
        }
    }

    /// Create the configured backend wrapped with the configured retry policy
    pub fn create_client(config: &InferenceConfig) -> Result<InferenceClient, LlmError> {
        let backend = Self::create(config)?;
        Ok(InferenceClient::new(backend, RetryPolicy::from(config)))
    }
}
