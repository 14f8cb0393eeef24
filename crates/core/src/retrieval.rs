//! Retrieval result types

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::corpus::Chunk;

/// A chunk with its per-index and fused scores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// BM25 score, absent when the lexical index did not return the chunk
    pub lexical_score: Option<f32>,
    /// Similarity score, absent when the semantic index did not return the chunk
    pub semantic_score: Option<f32>,
    /// Reciprocal rank fusion score
    pub fused_score: f64,
    /// 1-based rank used for fusion in the lexical list
    pub lexical_rank: usize,
    /// 1-based rank used for fusion in the semantic list
    pub semantic_rank: usize,
}

impl ScoredChunk {
    pub fn id(&self) -> &str {
        &self.chunk.id
    }

    /// Combined rank used as the first tie-breaker
    pub fn rank_sum(&self) -> usize {
        self.lexical_rank + self.semantic_rank
    }
}

/// Ordered, id-deduplicated evidence set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RetrievalResult {
    chunks: Vec<ScoredChunk>,
}

impl RetrievalResult {
    /// Build from an ordered list; later duplicates of an id are dropped
    pub fn new(chunks: Vec<ScoredChunk>) -> Self {
        let mut result = Self::default();
        result.extend(chunks);
        result
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn chunks(&self) -> &[ScoredChunk] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.chunks.iter().any(|c| c.id() == id)
    }

    pub fn get(&self, id: &str) -> Option<&Chunk> {
        self.chunks.iter().find(|c| c.id() == id).map(|c| &c.chunk)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.chunks.iter().map(|c| c.id())
    }

    /// Append chunks whose ids are not already present, keeping order
    pub fn extend(&mut self, chunks: impl IntoIterator<Item = ScoredChunk>) {
        let mut seen: HashSet<String> = self.chunks.iter().map(|c| c.chunk.id.clone()).collect();
        for chunk in chunks {
            if seen.insert(chunk.chunk.id.clone()) {
                self.chunks.push(chunk);
            }
        }
    }

    /// Merge another result into this one; first occurrence wins
    pub fn merge(&mut self, other: RetrievalResult) {
        self.extend(other.chunks);
    }

    pub fn truncate(&mut self, k: usize) {
        self.chunks.truncate(k);
    }
}
