//! Hybrid Retriever
//!
//! Runs lexical and semantic search concurrently against one pinned corpus
//! snapshot and fuses the two rankings with reciprocal rank fusion:
//!
//! ```text
//! fused = 1 / (rank_lexical + c) + 1 / (rank_semantic + c)
//! ```
//!
//! A chunk missing from one list takes that list's length + 1 as its rank.
//! Retrieval never mutates the corpus or its indexes.

use std::collections::HashMap;
use std::sync::Arc;

use docchat_config::RetrievalConfig;
use docchat_core::{Corpus, CorpusSnapshot, LexicalHit, RetrievalResult, ScoredChunk, SemanticHit};

use crate::RagError;

/// Retriever configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RetrieverConfig {
    /// Fused results kept
    pub top_k: usize,
    /// Candidates requested from the lexical index
    pub lexical_top_k: usize,
    /// Candidates requested from the semantic index
    pub semantic_top_k: usize,
    /// RRF constant
    pub rrf_k: f64,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self::from(&RetrievalConfig::default())
    }
}

impl From<&RetrievalConfig> for RetrieverConfig {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            top_k: config.top_k,
            lexical_top_k: config.lexical_top_k,
            semantic_top_k: config.semantic_top_k,
            rrf_k: config.rrf_k,
        }
    }
}

/// Lexical + semantic retriever with RRF fusion
#[derive(Debug, Clone, Default)]
pub struct HybridRetriever {
    config: RetrieverConfig,
}

impl HybridRetriever {
    pub fn new(config: RetrieverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    /// Retrieve with the configured `top_k`
    pub async fn retrieve_default(
        &self,
        query: &str,
        snapshot: &CorpusSnapshot,
    ) -> Result<RetrievalResult, RagError> {
        self.retrieve(query, snapshot, self.config.top_k).await
    }

    /// Fused top-`k` chunks for `query` from `snapshot`.
    ///
    /// One failing index degrades to the other's ranking; both failing is an
    /// error. Both returning nothing yields an empty result.
    pub async fn retrieve(
        &self,
        query: &str,
        snapshot: &CorpusSnapshot,
        k: usize,
    ) -> Result<RetrievalResult, RagError> {
        let version = snapshot.version();

        // Tantivy search is CPU-bound, so it runs off the async executor
        let lexical = Arc::clone(snapshot.lexical());
        let lexical_query = query.to_string();
        let lexical_k = self.config.lexical_top_k;
        let lexical_future = async move {
            tokio::task::spawn_blocking(move || lexical.search(&lexical_query, version, lexical_k))
                .await
                .map_err(|e| RagError::Search(format!("Lexical search task failed: {}", e)))?
                .map_err(RagError::from)
        };

        let semantic = snapshot.semantic();
        let semantic_k = self.config.semantic_top_k;
        let semantic_future = async move {
            let embedding = semantic.embed(query).await?;
            let hits = semantic.search(&embedding, version, semantic_k).await?;
            Ok::<Vec<SemanticHit>, RagError>(hits)
        };

        let (lexical_result, semantic_result) = tokio::join!(lexical_future, semantic_future);

        let (lexical_hits, semantic_hits) = match (lexical_result, semantic_result) {
            (Ok(l), Ok(s)) => (l, s),
            (Ok(l), Err(e)) => {
                tracing::warn!(version = %version, error = %e, "Semantic search failed, using lexical ranking only");
                (l, Vec::new())
            }
            (Err(e), Ok(s)) => {
                tracing::warn!(version = %version, error = %e, "Lexical search failed, using semantic ranking only");
                (Vec::new(), s)
            }
            (Err(lexical_err), Err(semantic_err)) => {
                tracing::error!(
                    version = %version,
                    lexical_error = %lexical_err,
                    semantic_error = %semantic_err,
                    "Both indexes failed"
                );
                return Err(lexical_err);
            }
        };

        let result = rrf_fuse(
            &lexical_hits,
            &semantic_hits,
            snapshot.corpus(),
            self.config.rrf_k,
            k,
        );

        tracing::debug!(
            version = %version,
            lexical = lexical_hits.len(),
            semantic = semantic_hits.len(),
            fused = result.len(),
            "Hybrid retrieval complete"
        );

        Ok(result)
    }
}

#[derive(Default)]
struct Candidate {
    lexical: Option<(usize, f32)>,
    semantic: Option<(usize, f32)>,
}

/// Reciprocal rank fusion of two ranked hit lists.
///
/// Ids not present in `corpus` are ignored; duplicate ids within a list keep
/// their best rank. Ties on fused score break on the lower rank sum, then on
/// chunk id.
pub fn rrf_fuse(
    lexical: &[LexicalHit],
    semantic: &[SemanticHit],
    corpus: &Corpus,
    c: f64,
    k: usize,
) -> RetrievalResult {
    let mut candidates: HashMap<&str, Candidate> = HashMap::new();

    for (rank, (id, score)) in lexical.iter().enumerate() {
        let entry = candidates.entry(id.as_str()).or_default();
        entry.lexical.get_or_insert((rank + 1, *score));
    }
    for (rank, (id, score)) in semantic.iter().enumerate() {
        let entry = candidates.entry(id.as_str()).or_default();
        entry.semantic.get_or_insert((rank + 1, *score));
    }

    let lexical_missing = lexical.len() + 1;
    let semantic_missing = semantic.len() + 1;

    let mut scored: Vec<ScoredChunk> = candidates
        .into_iter()
        .filter_map(|(id, candidate)| {
            let Some(chunk) = corpus.get(id) else {
                tracing::debug!(chunk_id = id, "Index returned id missing from corpus");
                return None;
            };

            let lexical_rank = candidate.lexical.map_or(lexical_missing, |(r, _)| r);
            let semantic_rank = candidate.semantic.map_or(semantic_missing, |(r, _)| r);
            let fused_score =
                1.0 / (lexical_rank as f64 + c) + 1.0 / (semantic_rank as f64 + c);

            Some(ScoredChunk {
                chunk: chunk.clone(),
                lexical_score: candidate.lexical.map(|(_, s)| s),
                semantic_score: candidate.semantic.map(|(_, s)| s),
                fused_score,
                lexical_rank,
                semantic_rank,
            })
        })
        .collect();

    scored.sort_by(|a, b| {
        b.fused_score
            .total_cmp(&a.fused_score)
            .then_with(|| a.rank_sum().cmp(&b.rank_sum()))
            .then_with(|| a.id().cmp(b.id()))
    });
    scored.truncate(k);

    RetrievalResult::new(scored)
}
