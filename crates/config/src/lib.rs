//! Configuration management for DocChat
//!
//! Supports loading configuration from:
//! - TOML/YAML/JSON files under `config/` (`default.*`, then `{env}.*`)
//! - Environment variables (`DOCCHAT__SECTION__FIELD`)
//! - Built-in defaults from [`constants`]

pub mod constants;
pub mod settings;

pub use settings::{
    load_settings, load_settings_from, EmbeddingBackend, EmbeddingConfig, InferenceBackend,
    InferenceConfig, IngestionConfig, ObservabilityConfig, OrchestratorConfig, RetrievalConfig,
    RouterConfig, RouterMode, SemanticBackend, ServerConfig, SessionConfig, Settings,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        match err {
            config::ConfigError::NotFound(key) => ConfigError::FileNotFound(key),
            other => ConfigError::ParseError(other.to_string()),
        }
    }
}
