//! Relevance router
//!
//! Decides whether a question is answerable from the current corpus before
//! any retrieval or drafting happens. The check runs against a handful of
//! representative chunks, either as one classification call or as the best
//! embedding similarity. Any failure while scoring is treated as out of
//! scope.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use docchat_config::{RouterConfig, RouterMode};
use docchat_core::session::OUT_OF_SCOPE_EXPLANATION;
use docchat_core::{Chunk, CorpusSnapshot, RouteOutcome};
use docchat_llm::{parse_json_object, truncate_text, InferenceClient, InferenceOptions, LlmError, Prompt};
use docchat_rag::cosine_similarity;

use crate::traits::Agent;
use crate::AgentError;

/// System prompt of the relevance classification call
pub const SYSTEM_PROMPT: &str = "You decide whether a question can be answered from a collection of documents. \
You are shown excerpts that represent the collection. Judge whether the question is about the same subject \
matter, not whether the excerpts already contain the answer. \
Reply with JSON only: {\"relevance\": <number between 0 and 1>, \"reason\": \"<one sentence>\"}";

const PROBE_CHARS: usize = 400;

/// Router input: the question and the snapshot it is pinned to
#[derive(Debug, Clone)]
pub struct RouteRequest {
    pub query: String,
    pub snapshot: Arc<CorpusSnapshot>,
}

/// Router configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RouterSettings {
    pub mode: RouterMode,
    /// In scope only when the score is strictly above this
    pub threshold: f32,
    /// Representative chunks shown to the scorer
    pub probe_chunks: usize,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self::from(&RouterConfig::default())
    }
}

impl From<&RouterConfig> for RouterSettings {
    fn from(config: &RouterConfig) -> Self {
        Self {
            mode: config.mode,
            threshold: config.threshold,
            probe_chunks: config.probe_chunks,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Classification {
    relevance: f32,
    #[serde(default)]
    reason: String,
}

/// Fail-closed relevance gate
pub struct RelevanceRouter {
    llm: InferenceClient,
    settings: RouterSettings,
}

impl RelevanceRouter {
    pub fn new(llm: InferenceClient, settings: RouterSettings) -> Self {
        Self { llm, settings }
    }

    pub fn settings(&self) -> &RouterSettings {
        &self.settings
    }

    async fn classify(&self, query: &str, probes: &[&Chunk]) -> Result<f32, AgentError> {
        let excerpts: Vec<String> = probes
            .iter()
            .map(|chunk| {
                if chunk.header_path.is_empty() {
                    format!("- {}", truncate_text(&chunk.text, PROBE_CHARS))
                } else {
                    format!("- ({}) {}", chunk.header_path, truncate_text(&chunk.text, PROBE_CHARS))
                }
            })
            .collect();

        let prompt = Prompt::new(format!(
            "Document excerpts:\n{}\n\nQuestion: {}",
            excerpts.join("\n"),
            query
        ))
        .with_system(SYSTEM_PROMPT);

        let reply = self.llm.infer(&prompt, &InferenceOptions::json()).await?;
        let classification: Classification = parse_json_object(&reply)?;

        if !classification.relevance.is_finite() {
            return Err(LlmError::InvalidResponse(format!(
                "relevance is not a number: {}",
                classification.relevance
            ))
            .into());
        }

        tracing::debug!(
            relevance = classification.relevance,
            reason = %classification.reason,
            "Relevance classified"
        );
        Ok(classification.relevance.clamp(0.0, 1.0))
    }

    async fn similarity(
        &self,
        query: &str,
        snapshot: &CorpusSnapshot,
        probes: &[&Chunk],
    ) -> Result<f32, AgentError> {
        let semantic = snapshot.semantic();
        let query_embedding = semantic.embed(query).await?;

        let mut best = 0.0f32;
        for chunk in probes {
            let embedding = match semantic.chunk_embedding(&chunk.id) {
                Some(embedding) => embedding,
                None => semantic.embed(&chunk.text).await?,
            };
            best = best.max(cosine_similarity(&query_embedding, &embedding));
        }

        Ok(best.clamp(0.0, 1.0))
    }

    fn decide(&self, score: f32) -> RouteOutcome {
        if score > self.settings.threshold {
            RouteOutcome::in_scope(score)
        } else {
            RouteOutcome::out_of_scope(score, OUT_OF_SCOPE_EXPLANATION)
        }
    }
}

#[async_trait]
impl Agent for RelevanceRouter {
    type Input = RouteRequest;
    type Output = RouteOutcome;

    fn name(&self) -> &'static str {
        "router"
    }

    async fn run(&self, request: RouteRequest) -> RouteOutcome {
        let corpus = request.snapshot.corpus();
        if corpus.is_empty() {
            return RouteOutcome::out_of_scope(0.0, OUT_OF_SCOPE_EXPLANATION);
        }

        let probes = corpus.representative_chunks(self.settings.probe_chunks.max(1));
        let scored = match self.settings.mode {
            RouterMode::Classifier => self.classify(&request.query, &probes).await,
            RouterMode::Similarity => {
                self.similarity(&request.query, &request.snapshot, &probes)
                    .await
            }
        };

        match scored {
            Ok(score) => {
                let outcome = self.decide(score);
                tracing::info!(
                    version = %request.snapshot.version(),
                    score,
                    in_scope = outcome.is_in_scope(),
                    "Routed query"
                );
                outcome
            }
            Err(e) => {
                tracing::warn!(error = %e, "Relevance check failed, treating query as out of scope");
                RouteOutcome::failed_closed(e)
            }
        }
    }
}
