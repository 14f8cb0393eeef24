//! DocChat agents and orchestration
//!
//! Features:
//! - Relevance router that fails closed before any drafting
//! - Research agent drafting cited answers, with sub-query refinement on retries
//! - Verification agent checking each claim against its cited chunks
//! - Orchestrator state machine with bounded retries and cancellation
//! - Session service with append-only audit history

pub mod citation;
pub mod orchestrator;
pub mod research;
pub mod router;
pub mod session;
pub mod traits;
pub mod verification;

#[cfg(test)]
mod testing;

pub use citation::{extract_citations, is_hedge, split_claims, strip_citations, Claim};
pub use orchestrator::{transition, Orchestrator, OrchestratorConfig, OrchestratorEvent, OrchestratorState};
pub use research::{ResearchAgent, ResearchConfig, ResearchOutput, ResearchRequest, NO_ANSWER};
pub use router::{RelevanceRouter, RouteRequest, RouterSettings};
pub use session::{Session, SessionService, SessionSettings};
pub use traits::{Agent, DynResearcher, DynRouter, DynVerifier};
pub use verification::{VerificationAgent, VerificationRequest};

use thiserror::Error;

/// Agent errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("Core error: {0}")]
    Core(String),

    #[error("Invalid transition from {from:?} on {event:?}")]
    InvalidTransition {
        from: OrchestratorState,
        event: OrchestratorEvent,
    },

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session busy: {0} is already running a query")]
    SessionBusy(String),

    #[error("Session limit reached: {0}")]
    SessionLimit(usize),

    #[error("No corpus installed")]
    NoCorpus,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Query task failed: {0}")]
    Task(String),
}

impl From<docchat_llm::LlmError> for AgentError {
    fn from(err: docchat_llm::LlmError) -> Self {
        AgentError::Llm(err.to_string())
    }
}

impl From<docchat_rag::RagError> for AgentError {
    fn from(err: docchat_rag::RagError) -> Self {
        match err {
            docchat_rag::RagError::Core(e) => e.into(),
            other => AgentError::Retrieval(other.to_string()),
        }
    }
}

impl From<docchat_core::Error> for AgentError {
    fn from(err: docchat_core::Error) -> Self {
        match err {
            docchat_core::Error::NoCorpus => AgentError::NoCorpus,
            other => AgentError::Core(other.to_string()),
        }
    }
}
