//! Research agent
//!
//! Drafts an answer from retrieved evidence, citing every factual sentence
//! with `[[chunk:<id>]]`. On a retry it first turns the previous verdict's
//! unsupported claims into refined sub-queries and widens the evidence
//! with their results.

use async_trait::async_trait;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;

use docchat_config::OrchestratorConfig;
use docchat_core::{Answer, CorpusSnapshot, RetrievalResult, VerificationVerdict};
use docchat_llm::{parse_json_array, truncate_text, InferenceClient, InferenceOptions, Prompt};
use docchat_rag::HybridRetriever;

use crate::citation::{citation_set, is_hedge, retain_citations};
use crate::traits::Agent;
use crate::AgentError;

/// Fixed reply when there is no evidence to draft from
pub const NO_ANSWER: &str = "I cannot answer this question based on the provided documents.";

/// System prompt of the drafting call
pub const SYSTEM_PROMPT: &str = "You answer questions using only the evidence passages you are given. \
Every sentence that states a fact must end with the marker of the passage that supports it, written \
exactly as [[chunk:<id>]] before the full stop, for example: Backups run nightly [[chunk:v1:3f2a9c:0]]. \
Cite only ids that appear in the evidence. Do not use outside knowledge. If the evidence does not answer \
the question, reply: I cannot answer this question based on the provided documents.";

/// System prompt of the sub-query planning call
pub const SUB_QUERY_PROMPT: &str = "A drafted answer contained claims that could not be verified against \
the retrieved passages. Write short search queries that would find passages confirming or refuting those \
claims for the original question. Reply with a JSON array of strings only.";

const VERIFICATION_FAILURE_PREFIX: &str = "verification failed:";
const RESEARCH_FAILURE_PREFIX: &str = "research failed:";

/// Research agent configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ResearchConfig {
    /// Refined sub-queries issued per retry
    pub max_sub_queries: usize,
    /// Per-chunk character limit in the drafting prompt
    pub max_chunk_chars: usize,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self::from(&OrchestratorConfig::default())
    }
}

impl From<&OrchestratorConfig> for ResearchConfig {
    fn from(config: &OrchestratorConfig) -> Self {
        Self {
            max_sub_queries: config.max_sub_queries,
            max_chunk_chars: 1500,
        }
    }
}

/// One drafting request
#[derive(Debug, Clone)]
pub struct ResearchRequest {
    pub query: String,
    /// 1-based attempt number
    pub attempt: u32,
    /// Verdict of the previous attempt, if any
    pub previous: Option<VerificationVerdict>,
    /// Evidence retrieved for the query itself
    pub evidence: RetrievalResult,
    /// Snapshot sub-queries must run against
    pub snapshot: Arc<CorpusSnapshot>,
}

/// Draft plus the evidence it was written from
#[derive(Debug, Clone, PartialEq)]
pub struct ResearchOutput {
    pub answer: Answer,
    /// Query evidence merged with sub-query evidence
    pub evidence: RetrievalResult,
    pub sub_queries: Vec<String>,
}

/// Evidence-grounded drafting agent
pub struct ResearchAgent {
    llm: InferenceClient,
    retriever: HybridRetriever,
    config: ResearchConfig,
}

impl ResearchAgent {
    pub fn new(llm: InferenceClient, retriever: HybridRetriever, config: ResearchConfig) -> Self {
        Self {
            llm,
            retriever,
            config,
        }
    }

    /// Sub-queries targeting the claims the last verdict rejected.
    ///
    /// Falls back to the claims themselves when planning fails.
    async fn plan_sub_queries(&self, query: &str, previous: &VerificationVerdict) -> Vec<String> {
        let fallback: Vec<String> = if previous.unsupported_claims.is_empty() {
            vec![query.to_string()]
        } else {
            previous
                .unsupported_claims
                .iter()
                .map(|claim| {
                    if claim.starts_with(VERIFICATION_FAILURE_PREFIX)
                        || claim.starts_with(RESEARCH_FAILURE_PREFIX)
                    {
                        query.to_string()
                    } else {
                        claim.clone()
                    }
                })
                .collect()
        };

        let claims = fallback
            .iter()
            .map(|c| format!("- {}", c))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = Prompt::new(format!(
            "Question: {}\n\nUnverified claims:\n{}\n\nReturn at most {} queries.",
            query, claims, self.config.max_sub_queries
        ))
        .with_system(SUB_QUERY_PROMPT);

        let planned = match self.llm.infer(&prompt, &InferenceOptions::json()).await {
            Ok(reply) => parse_json_array::<Vec<String>>(&reply).map_err(AgentError::from),
            Err(e) => Err(e.into()),
        };

        let candidates = match planned {
            Ok(queries) if queries.iter().any(|q| !q.trim().is_empty()) => queries,
            Ok(_) => fallback,
            Err(e) => {
                tracing::warn!(error = %e, "Sub-query planning failed, searching for the claims directly");
                fallback
            }
        };

        let mut seen = HashSet::new();
        candidates
            .into_iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty() && seen.insert(q.to_lowercase()))
            .take(self.config.max_sub_queries)
            .collect()
    }

    /// Retrieve every sub-query concurrently and merge results in order
    async fn retrieve_sub_queries(
        &self,
        sub_queries: &[String],
        snapshot: &CorpusSnapshot,
    ) -> RetrievalResult {
        let results = join_all(
            sub_queries
                .iter()
                .map(|q| self.retriever.retrieve_default(q, snapshot)),
        )
        .await;

        let mut merged = RetrievalResult::empty();
        for (query, result) in sub_queries.iter().zip(results) {
            match result {
                Ok(found) => merged.merge(found),
                Err(e) => {
                    tracing::warn!(sub_query = %query, error = %e, "Sub-query retrieval failed");
                }
            }
        }
        merged
    }

    fn drafting_prompt(&self, request: &ResearchRequest, evidence: &RetrievalResult) -> Prompt {
        let passages: Vec<String> = evidence
            .chunks()
            .iter()
            .map(|scored| {
                let chunk = &scored.chunk;
                let text = truncate_text(&chunk.text, self.config.max_chunk_chars);
                if chunk.header_path.is_empty() {
                    format!("[chunk:{}] {}", chunk.id, text)
                } else {
                    format!("[chunk:{}] ({}) {}", chunk.id, chunk.header_path, text)
                }
            })
            .collect();

        let mut user = format!("Evidence:\n{}\n\n", passages.join("\n\n"));

        if let Some(previous) = request.previous.as_ref().filter(|_| request.attempt > 1) {
            let claims: Vec<String> = previous
                .unsupported_claims
                .iter()
                .filter(|c| {
                    !c.starts_with(VERIFICATION_FAILURE_PREFIX) && !c.starts_with(RESEARCH_FAILURE_PREFIX)
                })
                .map(|c| format!("- {}", c))
                .collect();
            if !claims.is_empty() {
                user.push_str(&format!(
                    "A previous draft made claims that could not be verified against the evidence:\n{}\n\
                     Only repeat them if a passage above supports them.\n\n",
                    claims.join("\n")
                ));
            }
        }

        user.push_str(&format!("Question: {}", request.query));
        Prompt::new(user).with_system(SYSTEM_PROMPT)
    }
}

#[async_trait]
impl Agent for ResearchAgent {
    type Input = ResearchRequest;
    type Output = Result<ResearchOutput, AgentError>;

    fn name(&self) -> &'static str {
        "research"
    }

    async fn run(&self, request: ResearchRequest) -> Result<ResearchOutput, AgentError> {
        let attempt = request.attempt;
        let mut evidence = request.evidence.clone();
        let mut sub_queries = Vec::new();

        if attempt > 1 {
            if let Some(previous) = request.previous.as_ref() {
                sub_queries = self.plan_sub_queries(&request.query, previous).await;
                let extra = self
                    .retrieve_sub_queries(&sub_queries, &request.snapshot)
                    .await;
                tracing::debug!(
                    attempt,
                    sub_queries = sub_queries.len(),
                    extra = extra.len(),
                    "Refined evidence"
                );
                evidence.merge(extra);
            }
        }

        if evidence.is_empty() {
            tracing::info!(attempt, "No evidence, returning no-answer draft");
            return Ok(ResearchOutput {
                answer: Answer::hedged(NO_ANSWER, attempt),
                evidence,
                sub_queries,
            });
        }

        let prompt = self.drafting_prompt(&request, &evidence);
        let draft = self.llm.infer(&prompt, &InferenceOptions::default()).await?;

        let text = retain_citations(&draft, |id| evidence.contains(id));
        let citations = citation_set(&text);
        let hedged = citations.is_empty() && is_hedge(&text);

        let mut answer = Answer::new(text, citations, attempt);
        answer.hedged = hedged;

        tracing::info!(
            attempt,
            evidence = evidence.len(),
            citations = answer.citations.len(),
            hedged,
            "Drafted answer"
        );

        Ok(ResearchOutput {
            answer,
            evidence,
            sub_queries,
        })
    }
}
