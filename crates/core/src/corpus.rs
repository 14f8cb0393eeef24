//! Corpus data model
//!
//! A corpus is the immutable set of chunks produced by one ingestion run.
//! Every rebuild produces a new [`CorpusVersion`]; chunk ids embed the
//! version so they are never reused across rebuilds.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::error::{Error, Result};

/// Chunk identifier, unique within a corpus version
pub type ChunkId = String;

/// Monotonically increasing corpus version token
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct CorpusVersion(pub u64);

impl CorpusVersion {
    /// The version that follows this one
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CorpusVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A retrieval-unit slice of a source document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique id within the corpus version
    pub id: ChunkId,
    /// Chunk text
    pub text: String,
    /// Document this chunk was cut from
    pub source_doc_id: String,
    /// Header trail, e.g. "Setup > Requirements"
    pub header_path: String,
    /// Position of the chunk within its source document
    pub sequence_index: usize,
}

impl Chunk {
    pub fn new(
        id: impl Into<ChunkId>,
        text: impl Into<String>,
        source_doc_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            source_doc_id: source_doc_id.into(),
            header_path: String::new(),
            sequence_index: 0,
        }
    }

    pub fn with_header_path(mut self, header_path: impl Into<String>) -> Self {
        self.header_path = header_path.into();
        self
    }

    pub fn with_sequence_index(mut self, sequence_index: usize) -> Self {
        self.sequence_index = sequence_index;
        self
    }
}

/// The set of chunks behind one corpus version
#[derive(Debug, Clone)]
pub struct Corpus {
    version: CorpusVersion,
    chunks: Vec<Chunk>,
    by_id: HashMap<ChunkId, usize>,
}

impl Corpus {
    /// Build a corpus, rejecting duplicate chunk ids
    pub fn new(version: CorpusVersion, chunks: Vec<Chunk>) -> Result<Self> {
        let mut by_id = HashMap::with_capacity(chunks.len());
        for (pos, chunk) in chunks.iter().enumerate() {
            if by_id.insert(chunk.id.clone(), pos).is_some() {
                return Err(Error::InvalidInput(format!(
                    "duplicate chunk id {} in corpus {}",
                    chunk.id, version
                )));
            }
        }

        Ok(Self {
            version,
            chunks,
            by_id,
        })
    }

    pub fn version(&self) -> CorpusVersion {
        self.version
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn get(&self, id: &str) -> Option<&Chunk> {
        self.by_id.get(id).map(|&pos| &self.chunks[pos])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Number of distinct source documents
    pub fn document_count(&self) -> usize {
        self.chunks
            .iter()
            .map(|c| c.source_doc_id.as_str())
            .collect::<HashSet<_>>()
            .len()
    }

    /// Pick a small, spread-out sample of the corpus.
    ///
    /// The leading chunk of every source document comes first (in order of
    /// first appearance), then remaining chunks in corpus order until `n`
    /// chunks are selected.
    pub fn representative_chunks(&self, n: usize) -> Vec<&Chunk> {
        let mut leaders: Vec<&Chunk> = Vec::new();
        let mut leader_pos: HashMap<&str, usize> = HashMap::new();

        for chunk in &self.chunks {
            match leader_pos.get(chunk.source_doc_id.as_str()) {
                Some(&pos) if leaders[pos].sequence_index <= chunk.sequence_index => {}
                Some(&pos) => leaders[pos] = chunk,
                None => {
                    leader_pos.insert(chunk.source_doc_id.as_str(), leaders.len());
                    leaders.push(chunk);
                }
            }
        }

        let mut picked: Vec<&Chunk> = leaders.into_iter().take(n).collect();
        if picked.len() < n {
            let taken: HashSet<&str> = picked.iter().map(|c| c.id.as_str()).collect();
            let rest: Vec<&Chunk> = self
                .chunks
                .iter()
                .filter(|c| !taken.contains(c.id.as_str()))
                .take(n - picked.len())
                .collect();
            picked.extend(rest);
        }
        picked
    }
}
