//! Retrieval for DocChat
//!
//! Features:
//! - Sparse BM25 search via Tantivy
//! - Dense vector search, in memory or via Qdrant
//! - Hybrid fusion with reciprocal rank fusion (RRF)
//! - Markdown ingestion into versioned corpus snapshots

pub mod embeddings;
pub mod ingestion;
pub mod ollama_embeddings;
pub mod processor;
pub mod retriever;
pub mod semantic;
pub mod sparse_search;
pub mod vector_store;

pub use embeddings::{create_embedder, Embedder, HashEmbedder};
pub use ingestion::{CorpusBuilder, IngestReport, IngestionService};
pub use ollama_embeddings::OllamaEmbedder;
pub use processor::{DocumentProcessor, SourceFile};
pub use retriever::{rrf_fuse, HybridRetriever, RetrieverConfig};
pub use semantic::{cosine_similarity, InMemoryVectorIndex};
pub use sparse_search::SparseIndex;
pub use vector_store::{QdrantVectorIndex, VectorStoreConfig};

use thiserror::Error;

/// Retrieval errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RagError {
    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Upload too large: {size} bytes exceeds limit of {limit} bytes")]
    UploadTooLarge { size: usize, limit: usize },

    #[error(transparent)]
    Core(#[from] docchat_core::Error),
}

impl From<RagError> for docchat_core::Error {
    fn from(err: RagError) -> Self {
        match err {
            RagError::Core(e) => e,
            RagError::Embedding(msg) => docchat_core::Error::Embedding(msg),
            RagError::Search(msg) => docchat_core::Error::Search(msg),
            RagError::InvalidDocument(msg) => docchat_core::Error::InvalidInput(msg),
            other => docchat_core::Error::Index(other.to_string()),
        }
    }
}
