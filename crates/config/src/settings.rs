//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::constants::{
    embedding, endpoints, inference, ingestion, orchestrator, retrieval, router, sessions,
};
use crate::ConfigError;

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Chat model used by the router, research and verification agents
    #[serde(default)]
    pub inference: InferenceConfig,

    /// Embedding model for the semantic index
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Hybrid retrieval and fusion
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Relevance router
    #[serde(default)]
    pub router: RouterConfig,

    /// Draft/verify loop
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Document ingestion limits
    #[serde(default)]
    pub ingestion: IngestionConfig,

    /// Session registry
    #[serde(default)]
    pub sessions: SessionConfig,

    /// Logging and metrics
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    /// Create default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_inference()?;
        self.validate_retrieval()?;
        self.validate_router()?;
        self.validate_orchestrator()?;
        self.validate_ingestion()?;
        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(invalid("server.port", "Port cannot be 0"));
        }
        if self.server.request_timeout_seconds == 0 {
            return Err(invalid(
                "server.request_timeout_seconds",
                "Request timeout must be at least 1 second",
            ));
        }
        Ok(())
    }

    fn validate_inference(&self) -> Result<(), ConfigError> {
        let inference = &self.inference;

        if inference.timeout_ms == 0 {
            return Err(invalid("inference.timeout_ms", "Timeout must be positive"));
        }
        if !(0.0..=2.0).contains(&inference.temperature) {
            return Err(invalid(
                "inference.temperature",
                format!("Must be between 0.0 and 2.0, got {}", inference.temperature),
            ));
        }
        if inference.max_tokens == 0 {
            return Err(invalid("inference.max_tokens", "Must be at least 1"));
        }
        if inference.backend == InferenceBackend::OpenAI
            && inference.api_key.as_deref().unwrap_or("").is_empty()
            && !inference.endpoint.starts_with("http://localhost")
        {
            return Err(invalid(
                "inference.api_key",
                "API key required for remote OpenAI-compatible endpoints",
            ));
        }
        Ok(())
    }

    fn validate_retrieval(&self) -> Result<(), ConfigError> {
        let retrieval = &self.retrieval;

        if retrieval.top_k == 0 {
            return Err(invalid("retrieval.top_k", "Must be at least 1"));
        }
        if retrieval.lexical_top_k == 0 || retrieval.semantic_top_k == 0 {
            return Err(invalid(
                "retrieval.lexical_top_k",
                "Per-index candidate counts must be at least 1",
            ));
        }
        if !(retrieval.rrf_k > 0.0) {
            return Err(invalid(
                "retrieval.rrf_k",
                format!("Must be positive, got {}", retrieval.rrf_k),
            ));
        }
        if self.embedding.dimension == 0 {
            return Err(invalid("embedding.dimension", "Must be at least 1"));
        }
        Ok(())
    }

    fn validate_router(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.router.threshold) {
            return Err(invalid(
                "router.threshold",
                format!("Must be between 0.0 and 1.0, got {}", self.router.threshold),
            ));
        }
        if self.router.probe_chunks == 0 {
            return Err(invalid("router.probe_chunks", "Must be at least 1"));
        }
        Ok(())
    }

    fn validate_orchestrator(&self) -> Result<(), ConfigError> {
        if self.orchestrator.max_attempts == 0 {
            return Err(invalid("orchestrator.max_attempts", "Must be at least 1"));
        }
        Ok(())
    }

    fn validate_ingestion(&self) -> Result<(), ConfigError> {
        if self.ingestion.max_total_bytes == 0 {
            return Err(invalid("ingestion.max_total_bytes", "Must be positive"));
        }
        if self.ingestion.allowed_extensions.is_empty() {
            return Err(invalid(
                "ingestion.allowed_extensions",
                "At least one extension must be allowed",
            ));
        }
        Ok(())
    }
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.into(),
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds; covers a full draft/verify loop
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,

    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// CORS allowed origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_request_timeout() -> u64 {
    120
}
fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_seconds: default_request_timeout(),
            cors_enabled: true,
            cors_origins: Vec::new(),
        }
    }
}

/// Inference provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InferenceBackend {
    #[default]
    Ollama,
    #[serde(alias = "open_ai")]
    OpenAI,
}

/// Chat model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    #[serde(default)]
    pub backend: InferenceBackend,

    #[serde(default = "default_ollama_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_inference_model")]
    pub model: String,

    /// API key for OpenAI-compatible endpoints
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    #[serde(default)]
    pub temperature: f32,

    /// Per-call timeout
    #[serde(default = "default_inference_timeout")]
    pub timeout_ms: u64,

    /// Retries after a timeout or network failure
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First retry delay; doubles on each retry
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
}

fn default_ollama_endpoint() -> String {
    endpoints::OLLAMA_DEFAULT.to_string()
}
fn default_inference_model() -> String {
    inference::DEFAULT_MODEL.to_string()
}
fn default_max_tokens() -> usize {
    inference::MAX_TOKENS
}
fn default_inference_timeout() -> u64 {
    inference::TIMEOUT_MS
}
fn default_max_retries() -> u32 {
    inference::MAX_RETRIES
}
fn default_initial_backoff() -> u64 {
    inference::INITIAL_BACKOFF_MS
}

impl InferenceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            backend: InferenceBackend::Ollama,
            endpoint: default_ollama_endpoint(),
            model: default_inference_model(),
            api_key: None,
            max_tokens: default_max_tokens(),
            temperature: inference::TEMPERATURE,
            timeout_ms: default_inference_timeout(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
        }
    }
}

/// Embedding provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Deterministic hashed bag-of-words; no model required
    #[default]
    Hash,
    Ollama,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub backend: EmbeddingBackend,

    #[serde(default = "default_ollama_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default = "default_embedding_dim")]
    pub dimension: usize,
}

fn default_embedding_model() -> String {
    embedding::DEFAULT_MODEL.to_string()
}
fn default_embedding_dim() -> usize {
    embedding::DIMENSION
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Hash,
            endpoint: default_ollama_endpoint(),
            model: default_embedding_model(),
            dimension: default_embedding_dim(),
        }
    }
}

/// Semantic index backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SemanticBackend {
    #[default]
    Memory,
    Qdrant,
}

/// Hybrid retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Final evidence set size
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default = "default_lexical_top_k")]
    pub lexical_top_k: usize,

    #[serde(default = "default_semantic_top_k")]
    pub semantic_top_k: usize,

    /// Reciprocal rank fusion constant
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f64,

    #[serde(default)]
    pub semantic_backend: SemanticBackend,

    #[serde(default = "default_qdrant_endpoint")]
    pub qdrant_endpoint: String,

    #[serde(default = "default_qdrant_prefix")]
    pub qdrant_collection_prefix: String,
}

fn default_top_k() -> usize {
    retrieval::TOP_K
}
fn default_lexical_top_k() -> usize {
    retrieval::LEXICAL_TOP_K
}
fn default_semantic_top_k() -> usize {
    retrieval::SEMANTIC_TOP_K
}
fn default_rrf_k() -> f64 {
    retrieval::RRF_K
}
fn default_qdrant_endpoint() -> String {
    endpoints::QDRANT_DEFAULT.to_string()
}
fn default_qdrant_prefix() -> String {
    retrieval::QDRANT_COLLECTION_PREFIX.to_string()
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            lexical_top_k: default_lexical_top_k(),
            semantic_top_k: default_semantic_top_k(),
            rrf_k: default_rrf_k(),
            semantic_backend: SemanticBackend::Memory,
            qdrant_endpoint: default_qdrant_endpoint(),
            qdrant_collection_prefix: default_qdrant_prefix(),
        }
    }
}

/// How the router scores relevance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RouterMode {
    /// One classification call over representative chunks
    #[default]
    Classifier,
    /// Max embedding similarity against representative chunks
    Similarity,
}

/// Relevance router configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(default)]
    pub mode: RouterMode,

    /// Scores at or below this are out of scope
    #[serde(default = "default_router_threshold")]
    pub threshold: f32,

    #[serde(default = "default_probe_chunks")]
    pub probe_chunks: usize,
}

fn default_router_threshold() -> f32 {
    router::THRESHOLD
}
fn default_probe_chunks() -> usize {
    router::PROBE_CHUNKS
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            mode: RouterMode::Classifier,
            threshold: default_router_threshold(),
            probe_chunks: default_probe_chunks(),
        }
    }
}

/// Draft/verify loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_max_sub_queries")]
    pub max_sub_queries: usize,
}

fn default_max_attempts() -> u32 {
    orchestrator::MAX_ATTEMPTS
}
fn default_max_sub_queries() -> usize {
    orchestrator::MAX_SUB_QUERIES
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            max_sub_queries: default_max_sub_queries(),
        }
    }
}

/// Ingestion limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    #[serde(default = "default_max_total_bytes")]
    pub max_total_bytes: usize,

    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,

    /// Seconds a file's parsed sections stay cached by content hash; 0 disables the cache
    #[serde(default = "default_cache_ttl_seconds")]
    pub cache_ttl_seconds: u64,
}

fn default_max_total_bytes() -> usize {
    ingestion::MAX_TOTAL_BYTES
}
fn default_allowed_extensions() -> Vec<String> {
    ingestion::ALLOWED_EXTENSIONS
        .iter()
        .map(|e| e.to_string())
        .collect()
}
fn default_cache_ttl_seconds() -> u64 {
    ingestion::CACHE_TTL_SECS
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            max_total_bytes: default_max_total_bytes(),
            allowed_extensions: default_allowed_extensions(),
            cache_ttl_seconds: default_cache_ttl_seconds(),
        }
    }
}

/// Session registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_seconds: u64,

    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_seconds: u64,
}

fn default_max_sessions() -> usize {
    sessions::MAX_SESSIONS
}
fn default_idle_timeout() -> u64 {
    sessions::IDLE_TIMEOUT_SECS
}
fn default_cleanup_interval() -> u64 {
    sessions::CLEANUP_INTERVAL_SECS
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: default_max_sessions(),
            idle_timeout_seconds: default_idle_timeout(),
            cleanup_interval_seconds: default_cleanup_interval(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit JSON log lines
    #[serde(default)]
    pub log_json: bool,

    /// Expose Prometheus metrics at /metrics
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            metrics_enabled: true,
        }
    }
}

/// Load settings from `config/` and `DOCCHAT__*` environment variables
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    load_settings_from(Path::new("config"), env)
}

/// Load settings from a specific config directory.
///
/// Priority: env vars > `{dir}/{env}.*` > `{dir}/default.*` > defaults
pub fn load_settings_from(dir: &Path, env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::from(dir.join("default")).required(false));

    if let Some(env_name) = env {
        builder = builder.add_source(File::from(dir.join(env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("DOCCHAT")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    tracing::debug!(dir = %dir.display(), env = ?env, "Settings loaded");
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.orchestrator.max_attempts, 3);
        assert_eq!(settings.retrieval.rrf_k, 60.0);
        assert_eq!(settings.router.mode, RouterMode::Classifier);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_settings_validation() {
        let mut settings = Settings::default();
        settings.orchestrator.max_attempts = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.router.threshold = 1.5;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.retrieval.rrf_k = 0.0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.retrieval.top_k = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.inference.temperature = 3.0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.server.port = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_remote_openai_requires_key() {
        let mut settings = Settings::default();
        settings.inference.backend = InferenceBackend::OpenAI;
        settings.inference.endpoint = endpoints::OPENAI_DEFAULT.to_string();
        assert!(settings.validate().is_err());

        settings.inference.api_key = Some("sk-test".to_string());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_invalid_value_names_field() {
        let mut settings = Settings::default();
        settings.router.threshold = -0.1;
        match settings.validate() {
            Err(ConfigError::InvalidValue { field, .. }) => assert_eq!(field, "router.threshold"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("default.toml"),
            "[orchestrator]\nmax_attempts = 5\n\n[router]\nmode = \"similarity\"\nthreshold = 0.3\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("staging.toml"),
            "[retrieval]\ntop_k = 4\n",
        )
        .unwrap();

        let settings = load_settings_from(dir.path(), Some("staging")).unwrap();
        assert_eq!(settings.orchestrator.max_attempts, 5);
        assert_eq!(settings.router.mode, RouterMode::Similarity);
        assert_eq!(settings.router.threshold, 0.3);
        assert_eq!(settings.retrieval.top_k, 4);
        assert_eq!(settings.retrieval.lexical_top_k, retrieval::LEXICAL_TOP_K);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("default.toml"), "[orchestrator]\nmax_attempts = 0\n")
            .unwrap();
        assert!(load_settings_from(dir.path(), None).is_err());
    }

    #[test]
    fn test_settings_serialize_roundtrip_shape() {
        let json = serde_json::to_value(Settings::default()).unwrap();
        assert_eq!(json["inference"]["backend"], "ollama");
        assert_eq!(json["retrieval"]["semantic_backend"], "memory");
    }
}
