//! LLM integration for DocChat
//!
//! Features:
//! - Multiple backend support (Ollama, OpenAI-compatible)
//! - Per-call timeout with exponential-backoff retries
//! - Prompt types and lenient JSON reply parsing

pub mod backend;
pub mod client;
pub mod factory;
pub mod prompt;

pub use backend::{
    FinishReason, GenerationResult, InferenceOptions, LlmBackend, LlmConfig, OllamaBackend,
    OpenAIBackend, OpenAIConfig,
};
pub use client::{InferenceClient, RetryPolicy};
pub use factory::LlmFactory;
pub use prompt::{parse_json_array, parse_json_object, truncate_text, Message, Prompt, Role};

use thiserror::Error;

/// LLM errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("Generation error: {0}")]
    Generation(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout")]
    Timeout,

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl LlmError {
    /// Timeouts and transient network failures are worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(self, LlmError::Network(_) | LlmError::Timeout)
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}
