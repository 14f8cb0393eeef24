//! Core traits for the retrieval core
//!
//! Index implementations live in other crates; the orchestration logic only
//! sees these traits, which keeps it testable with fixed-ranking mocks.
//!
//! ```text
//! Retrieval:
//!   - LexicalIndex: term-frequency search over chunk text
//!   - SemanticIndex: nearest-neighbour search over chunk embeddings
//! ```

mod index;

pub use index::{LexicalHit, LexicalIndex, SemanticHit, SemanticIndex};
