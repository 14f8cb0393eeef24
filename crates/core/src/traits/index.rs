//! Index query interfaces
//!
//! Both indexes are built for exactly one corpus version and answer only
//! queries tagged with that version.

use async_trait::async_trait;

use crate::corpus::{ChunkId, CorpusVersion};
use crate::error::{Error, Result};

/// `(chunk id, score)` pair from the lexical index
pub type LexicalHit = (ChunkId, f32);

/// `(chunk id, similarity)` pair from the semantic index
pub type SemanticHit = (ChunkId, f32);

/// Term-frequency search over chunk text
///
/// Search is synchronous and CPU-bound; async callers should run it on a
/// blocking thread.
pub trait LexicalIndex: Send + Sync {
    /// Corpus version this index was built from
    fn version(&self) -> CorpusVersion;

    /// Top-`k` hits ordered by descending score
    fn search(&self, text: &str, version: CorpusVersion, k: usize) -> Result<Vec<LexicalHit>>;

    /// Number of indexed chunks
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reject queries tagged with a different corpus version
    fn check_version(&self, version: CorpusVersion) -> Result<()> {
        check_version(self.version(), version)
    }
}

/// Nearest-neighbour search over chunk embeddings
#[async_trait]
pub trait SemanticIndex: Send + Sync {
    /// Corpus version this index was built from
    fn version(&self) -> CorpusVersion;

    /// Embed query text with the same model used for the chunks
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Top-`k` hits ordered by descending similarity
    async fn search(
        &self,
        embedding: &[f32],
        version: CorpusVersion,
        k: usize,
    ) -> Result<Vec<SemanticHit>>;

    /// Stored embedding for a chunk, if the index keeps them locally
    fn chunk_embedding(&self, _id: &str) -> Option<Vec<f32>> {
        None
    }

    /// Reject queries tagged with a different corpus version
    fn check_version(&self, version: CorpusVersion) -> Result<()> {
        check_version(self.version(), version)
    }
}

fn check_version(expected: CorpusVersion, actual: CorpusVersion) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(Error::VersionMismatch { expected, actual })
    }
}
