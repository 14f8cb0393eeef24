//! Centralized defaults for DocChat
//!
//! Single source of truth for the default values used by `Settings` and by
//! the component configs in other crates.

/// Service endpoints (defaults for local development)
pub mod endpoints {
    /// Ollama inference and embedding endpoint
    pub const OLLAMA_DEFAULT: &str = "http://localhost:11434";

    /// Qdrant vector store endpoint
    pub const QDRANT_DEFAULT: &str = "http://127.0.0.1:6334";

    /// OpenAI API endpoint
    pub const OPENAI_DEFAULT: &str = "https://api.openai.com/v1";
}

/// Inference call defaults
pub mod inference {
    /// Default chat model
    pub const DEFAULT_MODEL: &str = "llama3.2";

    /// Per-call timeout (ms)
    pub const TIMEOUT_MS: u64 = 30_000;

    /// Retries after a timed-out or network-failed call
    pub const MAX_RETRIES: u32 = 2;

    /// First retry delay (ms); doubles on each retry
    pub const INITIAL_BACKOFF_MS: u64 = 200;

    /// Maximum tokens to generate per call
    pub const MAX_TOKENS: usize = 512;

    /// Sampling temperature; zero keeps agents deterministic
    pub const TEMPERATURE: f32 = 0.0;
}

/// Embedding defaults
pub mod embedding {
    /// Ollama embedding model
    pub const DEFAULT_MODEL: &str = "nomic-embed-text";

    /// nomic-embed-text output dimension
    pub const DIMENSION: usize = 768;
}

/// Retrieval and fusion defaults
pub mod retrieval {
    /// Final evidence set size
    pub const TOP_K: usize = 8;

    /// Candidates requested from the lexical index
    pub const LEXICAL_TOP_K: usize = 20;

    /// Candidates requested from the semantic index
    pub const SEMANTIC_TOP_K: usize = 20;

    /// Reciprocal rank fusion constant
    pub const RRF_K: f64 = 60.0;

    /// Qdrant collection name prefix; one collection per corpus version
    pub const QDRANT_COLLECTION_PREFIX: &str = "docchat";
}

/// Relevance router defaults
pub mod router {
    /// Scores at or below this value are out of scope
    pub const THRESHOLD: f32 = 0.5;

    /// Representative chunks shown to the relevance check
    pub const PROBE_CHUNKS: usize = 5;
}

/// Orchestrator defaults
pub mod orchestrator {
    /// Draft/verify attempts before giving up
    pub const MAX_ATTEMPTS: u32 = 3;

    /// Refined sub-queries issued per retry
    pub const MAX_SUB_QUERIES: usize = 3;
}

/// Document ingestion defaults
pub mod ingestion {
    /// Maximum combined upload size (200 MiB)
    pub const MAX_TOTAL_BYTES: usize = 200 * 1024 * 1024;

    /// Extensions accepted for plain-text and markdown ingestion
    pub const ALLOWED_EXTENSIONS: &[&str] = &["md", "markdown", "txt"];

    /// Lifetime of cached per-file sections (7 days)
    pub const CACHE_TTL_SECS: u64 = 7 * 24 * 60 * 60;
}

/// Session registry defaults
pub mod sessions {
    pub const MAX_SESSIONS: usize = 1000;

    /// Idle time before a session is reaped (seconds)
    pub const IDLE_TIMEOUT_SECS: u64 = 3600;

    /// Reaper interval (seconds)
    pub const CLEANUP_INTERVAL_SECS: u64 = 60;
}
