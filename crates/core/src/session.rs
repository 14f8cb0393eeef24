//! Query, answer, and session audit types
//!
//! A [`SessionState`] is created when a query is submitted and is mutated
//! only by the orchestrator. Its iteration history is append-only and is
//! kept for every terminal outcome.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::corpus::{ChunkId, CorpusVersion};
use crate::error::{Error, Result};
use crate::retrieval::RetrievalResult;

/// Default explanation for out-of-scope questions
pub const OUT_OF_SCOPE_EXPLANATION: &str =
    "This question does not appear to be answerable from the uploaded documents.";

/// A user question pinned to a corpus version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    pub session_id: String,
    pub corpus_version: CorpusVersion,
}

impl Query {
    pub fn new(
        text: impl Into<String>,
        session_id: impl Into<String>,
        corpus_version: CorpusVersion,
    ) -> Self {
        Self {
            text: text.into(),
            session_id: session_id.into(),
            corpus_version,
        }
    }
}

/// Router decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RouteDecision {
    InScope,
    OutOfScope,
}

/// Router decision with its score and diagnostics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteOutcome {
    pub decision: RouteDecision,
    /// Relevance score in [0, 1]
    pub score: f32,
    /// User-facing explanation, set for out-of-scope decisions
    pub explanation: Option<String>,
    /// Underlying failure when the router failed closed
    pub error: Option<String>,
}

impl RouteOutcome {
    pub fn in_scope(score: f32) -> Self {
        Self {
            decision: RouteDecision::InScope,
            score,
            explanation: None,
            error: None,
        }
    }

    pub fn out_of_scope(score: f32, explanation: impl Into<String>) -> Self {
        Self {
            decision: RouteDecision::OutOfScope,
            score,
            explanation: Some(explanation.into()),
            error: None,
        }
    }

    /// Fail closed after the relevance check itself failed
    pub fn failed_closed(error: impl fmt::Display) -> Self {
        Self {
            decision: RouteDecision::OutOfScope,
            score: 0.0,
            explanation: Some(OUT_OF_SCOPE_EXPLANATION.to_string()),
            error: Some(error.to_string()),
        }
    }

    pub fn is_in_scope(&self) -> bool {
        self.decision == RouteDecision::InScope
    }
}

/// A drafted answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    /// Chunk ids cited by the text
    pub citations: BTreeSet<ChunkId>,
    /// Attempt number that produced this draft
    pub draft_iteration: u32,
    /// True when the draft declines to answer
    pub hedged: bool,
}

impl Answer {
    pub fn new(text: impl Into<String>, citations: BTreeSet<ChunkId>, draft_iteration: u32) -> Self {
        Self {
            text: text.into(),
            citations,
            draft_iteration,
            hedged: false,
        }
    }

    /// A no-answer draft carrying no citations
    pub fn hedged(text: impl Into<String>, draft_iteration: u32) -> Self {
        Self {
            text: text.into(),
            citations: BTreeSet::new(),
            draft_iteration,
            hedged: true,
        }
    }
}

/// Result of checking a draft against its evidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationVerdict {
    pub supported: bool,
    /// Failing claim texts, in answer order
    pub unsupported_claims: Vec<String>,
    /// Fraction of claims that passed, in [0, 1]
    pub confidence: f32,
}

impl VerificationVerdict {
    pub fn pass(confidence: f32) -> Self {
        Self {
            supported: true,
            unsupported_claims: Vec::new(),
            confidence,
        }
    }

    pub fn fail(unsupported_claims: Vec<String>, confidence: f32) -> Self {
        Self {
            supported: false,
            unsupported_claims,
            confidence,
        }
    }

    /// Verdict for a draft with nothing to check
    pub fn no_claims() -> Self {
        Self::fail(vec!["draft contained no verifiable claims".to_string()], 0.0)
    }

    /// Verdict recorded when the check itself could not run
    pub fn failure(reason: impl fmt::Display) -> Self {
        Self::fail(vec![format!("verification failed: {}", reason)], 0.0)
    }
}

/// One retrieve-draft-verify pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub attempt_number: u32,
    pub retrieval_result: RetrievalResult,
    pub answer: Answer,
    pub verdict: VerificationVerdict,
    /// Refined sub-queries issued for this attempt
    #[serde(default)]
    pub sub_queries: Vec<String>,
}

/// Terminal orchestrator outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TerminalStatus {
    Finalized,
    Rejected,
    UnverifiedExit,
    Cancelled,
}

/// Audit record for one submitted query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    query: Query,
    route: Option<RouteOutcome>,
    iterations: Vec<IterationRecord>,
    terminal_status: Option<TerminalStatus>,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl SessionState {
    pub fn new(query: Query) -> Self {
        Self {
            query,
            route: None,
            iterations: Vec::new(),
            terminal_status: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn route(&self) -> Option<&RouteOutcome> {
        self.route.as_ref()
    }

    pub fn iterations(&self) -> &[IterationRecord] {
        &self.iterations
    }

    pub fn last_iteration(&self) -> Option<&IterationRecord> {
        self.iterations.last()
    }

    pub fn terminal_status(&self) -> Option<TerminalStatus> {
        self.terminal_status
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal_status.is_some()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Number of recorded attempts
    pub fn attempts(&self) -> u32 {
        self.iterations.len() as u32
    }

    pub fn record_route(&mut self, route: RouteOutcome) -> Result<()> {
        self.ensure_open()?;
        self.route = Some(route);
        Ok(())
    }

    /// Append an iteration; attempt numbers must strictly increase
    pub fn push_iteration(&mut self, record: IterationRecord) -> Result<()> {
        self.ensure_open()?;
        if let Some(last) = self.iterations.last() {
            if record.attempt_number <= last.attempt_number {
                return Err(Error::InvalidInput(format!(
                    "attempt {} does not follow attempt {}",
                    record.attempt_number, last.attempt_number
                )));
            }
        }
        self.iterations.push(record);
        Ok(())
    }

    pub fn finish(&mut self, status: TerminalStatus) -> Result<()> {
        self.ensure_open()?;
        self.terminal_status = Some(status);
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        match self.terminal_status {
            Some(status) => Err(Error::InvalidInput(format!(
                "session state already terminal ({:?})",
                status
            ))),
            None => Ok(()),
        }
    }
}

/// Status values visible to session callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryStatus {
    Finalized,
    Rejected,
    Unverified,
    Cancelled,
}

/// Caller-facing result of `submit_query`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub status: QueryStatus,
    pub answer_text: Option<String>,
    pub citations: Vec<ChunkId>,
    pub explanation: String,
    #[serde(default)]
    pub unsupported_claims: Vec<String>,
    pub corpus_version: CorpusVersion,
    pub attempts: u32,
}

impl From<&SessionState> for QueryResponse {
    fn from(state: &SessionState) -> Self {
        let last = state.last_iteration();
        let corpus_version = state.query.corpus_version;
        let attempts = state.attempts();

        match state.terminal_status {
            Some(TerminalStatus::Finalized) => {
                let (answer_text, citations) = last
                    .map(|it| {
                        (
                            Some(it.answer.text.clone()),
                            it.answer.citations.iter().cloned().collect(),
                        )
                    })
                    .unwrap_or((None, Vec::new()));
                Self {
                    status: QueryStatus::Finalized,
                    explanation: format!(
                        "Answer verified against the cited passages on attempt {}.",
                        attempts
                    ),
                    answer_text,
                    citations,
                    unsupported_claims: Vec::new(),
                    corpus_version,
                    attempts,
                }
            }
            Some(TerminalStatus::Rejected) => Self {
                status: QueryStatus::Rejected,
                answer_text: None,
                citations: Vec::new(),
                explanation: state
                    .route
                    .as_ref()
                    .and_then(|r| r.explanation.clone())
                    .unwrap_or_else(|| OUT_OF_SCOPE_EXPLANATION.to_string()),
                unsupported_claims: Vec::new(),
                corpus_version,
                attempts,
            },
            Some(TerminalStatus::UnverifiedExit) => {
                let unsupported_claims = last
                    .map(|it| it.verdict.unsupported_claims.clone())
                    .unwrap_or_default();
                Self {
                    status: QueryStatus::Unverified,
                    answer_text: last.map(|it| it.answer.text.clone()),
                    citations: last
                        .map(|it| it.answer.citations.iter().cloned().collect())
                        .unwrap_or_default(),
                    explanation: format!(
                        "NOT FULLY VERIFIED: {} claim(s) could not be verified against the documents after {} attempt(s).",
                        unsupported_claims.len(),
                        attempts
                    ),
                    unsupported_claims,
                    corpus_version,
                    attempts,
                }
            }
            Some(TerminalStatus::Cancelled) | None => Self {
                status: QueryStatus::Cancelled,
                answer_text: None,
                citations: Vec::new(),
                explanation: "The request was cancelled before an answer was verified.".to_string(),
                unsupported_claims: Vec::new(),
                corpus_version,
                attempts,
            },
        }
    }
}
