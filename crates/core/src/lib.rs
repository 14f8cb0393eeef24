//! Core traits and types for DocChat
//!
//! This crate provides foundational types used across all other crates:
//! - Corpus data model (chunks, versions)
//! - Retrieval results and session audit records
//! - Index traits for lexical and semantic search
//! - The versioned, read-mostly corpus store
//! - Error types

pub mod cancel;
pub mod corpus;
pub mod error;
pub mod retrieval;
pub mod session;
pub mod store;
pub mod traits;

pub use cancel::CancellationToken;
pub use corpus::{Chunk, ChunkId, Corpus, CorpusVersion};
pub use error::{Error, Result};
pub use retrieval::{RetrievalResult, ScoredChunk};
pub use session::{
    Answer, IterationRecord, Query, QueryResponse, QueryStatus, RouteDecision, RouteOutcome,
    SessionState, TerminalStatus, VerificationVerdict,
};
pub use store::{CorpusSnapshot, CorpusStore};
pub use traits::{LexicalHit, LexicalIndex, SemanticHit, SemanticIndex};
