//! In-memory semantic index
//!
//! Brute-force cosine similarity over chunk embeddings computed at build
//! time. Suitable for corpora up to a few tens of thousands of chunks.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use docchat_core::{Chunk, ChunkId, CorpusVersion, SemanticHit, SemanticIndex};

use crate::embeddings::Embedder;
use crate::RagError;

/// Cosine similarity; zero when either vector is zero or lengths differ
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Text embedded for a chunk; the header trail adds topical context
pub(crate) fn embedding_text(chunk: &Chunk) -> String {
    if chunk.header_path.is_empty() {
        chunk.text.clone()
    } else {
        format!("{}\n{}", chunk.header_path, chunk.text)
    }
}

/// Brute-force vector index for one corpus version
pub struct InMemoryVectorIndex {
    version: CorpusVersion,
    embedder: Arc<dyn Embedder>,
    entries: Vec<(ChunkId, Vec<f32>)>,
    positions: HashMap<ChunkId, usize>,
}

impl InMemoryVectorIndex {
    /// Embed every chunk and build the index
    pub async fn build(
        version: CorpusVersion,
        chunks: &[Chunk],
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, RagError> {
        let texts: Vec<String> = chunks.iter().map(embedding_text).collect();
        let embeddings = embedder.embed_batch(&texts).await?;

        let entries: Vec<(ChunkId, Vec<f32>)> = chunks
            .iter()
            .map(|c| c.id.clone())
            .zip(embeddings)
            .collect();

        tracing::debug!(
            version = %version,
            chunks = entries.len(),
            embedder = embedder.name(),
            "Built in-memory vector index"
        );

        Ok(Self::from_embeddings(version, embedder, entries))
    }

    /// Build from precomputed embeddings
    pub fn from_embeddings(
        version: CorpusVersion,
        embedder: Arc<dyn Embedder>,
        entries: Vec<(ChunkId, Vec<f32>)>,
    ) -> Self {
        let positions = entries
            .iter()
            .enumerate()
            .map(|(i, (id, _))| (id.clone(), i))
            .collect();

        Self {
            version,
            embedder,
            entries,
            positions,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl SemanticIndex for InMemoryVectorIndex {
    fn version(&self) -> CorpusVersion {
        self.version
    }

    async fn embed(&self, text: &str) -> docchat_core::Result<Vec<f32>> {
        Ok(self.embedder.embed(text).await?)
    }

    async fn search(
        &self,
        embedding: &[f32],
        version: CorpusVersion,
        k: usize,
    ) -> docchat_core::Result<Vec<SemanticHit>> {
        self.check_version(version)?;

        let mut hits: Vec<SemanticHit> = self
            .entries
            .iter()
            .map(|(id, vector)| (id.clone(), cosine_similarity(embedding, vector)))
            .filter(|(_, score)| *score > 0.0)
            .collect();

        hits.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        hits.truncate(k);
        Ok(hits)
    }

    fn chunk_embedding(&self, id: &str) -> Option<Vec<f32>> {
        self.positions.get(id).map(|&i| self.entries[i].1.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashEmbedder;

    fn chunks() -> Vec<Chunk> {
        vec![
            Chunk::new("c1", "Rotate API keys from the security settings page", "security.md"),
            Chunk::new("c2", "Lunch is served in the cafeteria at noon", "office.md"),
            Chunk::new("c3", "API keys expire after ninety days", "security.md"),
        ]
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[tokio::test]
    async fn test_search_ranks_related_chunks() {
        let embedder = Arc::new(HashEmbedder::new(256));
        let index = InMemoryVectorIndex::build(CorpusVersion(1), &chunks(), embedder)
            .await
            .unwrap();
        assert_eq!(index.len(), 3);

        let query = index.embed("api keys").await.unwrap();
        let hits = index.search(&query, CorpusVersion(1), 2).await.unwrap();

        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|(id, _)| id != "c2"));
        assert!(hits[0].1 >= hits[1].1);
    }

    #[tokio::test]
    async fn test_version_mismatch_rejected() {
        let embedder = Arc::new(HashEmbedder::new(32));
        let index = InMemoryVectorIndex::build(CorpusVersion(2), &chunks(), embedder)
            .await
            .unwrap();

        let result = index.search(&[1.0; 32], CorpusVersion(1), 5).await;
        assert!(matches!(
            result,
            Err(docchat_core::Error::VersionMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_chunk_embedding_lookup() {
        let embedder = Arc::new(HashEmbedder::new(32));
        let index = InMemoryVectorIndex::build(CorpusVersion(1), &chunks(), embedder)
            .await
            .unwrap();

        assert_eq!(index.chunk_embedding("c1").map(|v| v.len()), Some(32));
        assert!(index.chunk_embedding("missing").is_none());
    }
}
