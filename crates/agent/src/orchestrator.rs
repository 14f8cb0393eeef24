//! Orchestrator state machine
//!
//! Drives one query through routing, retrieval, drafting and verification
//! with a bounded number of attempts:
//!
//! ```text
//! Routing --in scope--> Retrieving --> Drafting --> Verifying --supported--> Finalized
//!    |                      ^             |            |
//!    +--out of scope--> Rejected          +--retry-----+
//!
//! retry with no attempts left --> UnverifiedExit
//! ```
//!
//! Any non-terminal state moves to `Cancelled` when the session's
//! cancellation token is set; the token is checked before every state runs.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use docchat_core::{
    Answer, CancellationToken, CorpusSnapshot, IterationRecord, Query, RetrievalResult,
    SessionState, TerminalStatus, VerificationVerdict,
};
use docchat_rag::HybridRetriever;

use crate::research::{ResearchOutput, ResearchRequest};
use crate::router::RouteRequest;
use crate::traits::{DynResearcher, DynRouter, DynVerifier};
use crate::verification::VerificationRequest;
use crate::AgentError;

/// Orchestrator states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorState {
    Routing,
    Retrieving,
    Drafting,
    Verifying,
    Finalized,
    Rejected,
    UnverifiedExit,
    Cancelled,
}

impl OrchestratorState {
    pub fn is_terminal(&self) -> bool {
        self.terminal_status().is_some()
    }

    /// Session status for terminal states
    pub fn terminal_status(&self) -> Option<TerminalStatus> {
        match self {
            OrchestratorState::Finalized => Some(TerminalStatus::Finalized),
            OrchestratorState::Rejected => Some(TerminalStatus::Rejected),
            OrchestratorState::UnverifiedExit => Some(TerminalStatus::UnverifiedExit),
            OrchestratorState::Cancelled => Some(TerminalStatus::Cancelled),
            _ => None,
        }
    }
}

/// Inputs to the transition table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorEvent {
    InScope,
    OutOfScope,
    Retrieved,
    Drafted,
    Supported,
    Unsupported { can_retry: bool },
    ResearchFailed { can_retry: bool },
    Cancel,
}

/// The transition table
pub fn transition(
    state: OrchestratorState,
    event: OrchestratorEvent,
) -> Result<OrchestratorState, AgentError> {
    use OrchestratorEvent as E;
    use OrchestratorState as S;

    let next = match (state, event) {
        (s, E::Cancel) if !s.is_terminal() => S::Cancelled,
        (S::Routing, E::InScope) => S::Retrieving,
        (S::Routing, E::OutOfScope) => S::Rejected,
        (S::Retrieving, E::Retrieved) => S::Drafting,
        (S::Drafting, E::Drafted) => S::Verifying,
        (S::Drafting, E::ResearchFailed { can_retry: true }) => S::Retrieving,
        (S::Drafting, E::ResearchFailed { can_retry: false }) => S::UnverifiedExit,
        (S::Verifying, E::Supported) => S::Finalized,
        (S::Verifying, E::Unsupported { can_retry: true }) => S::Retrieving,
        (S::Verifying, E::Unsupported { can_retry: false }) => S::UnverifiedExit,
        (from, event) => return Err(AgentError::InvalidTransition { from, event }),
    };

    Ok(next)
}

/// Orchestrator configuration
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    /// Attempts before giving up with an unverified answer
    pub max_attempts: u32,
    /// Chunks retrieved for the query on each attempt
    pub top_k: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::new(
            &docchat_config::OrchestratorConfig::default(),
            &docchat_config::RetrievalConfig::default(),
        )
    }
}

impl OrchestratorConfig {
    pub fn new(
        orchestrator: &docchat_config::OrchestratorConfig,
        retrieval: &docchat_config::RetrievalConfig,
    ) -> Self {
        Self {
            max_attempts: orchestrator.max_attempts.max(1),
            top_k: retrieval.top_k,
        }
    }
}

/// Route → retrieve → draft → verify loop over pluggable agents
pub struct Orchestrator {
    router: DynRouter,
    researcher: DynResearcher,
    verifier: DynVerifier,
    retriever: HybridRetriever,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        router: DynRouter,
        researcher: DynResearcher,
        verifier: DynVerifier,
        retriever: HybridRetriever,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            router,
            researcher,
            verifier,
            retriever,
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run `query` to a terminal state against `snapshot`.
    ///
    /// Agent failures become retries or terminal states; only programming
    /// errors (bad transitions, a snapshot that does not match the query's
    /// version) are returned as `Err`.
    pub async fn run(
        &self,
        query: Query,
        snapshot: Arc<CorpusSnapshot>,
        cancel: &CancellationToken,
    ) -> Result<SessionState, AgentError> {
        if snapshot.version() != query.corpus_version {
            return Err(docchat_core::Error::VersionMismatch {
                expected: snapshot.version(),
                actual: query.corpus_version,
            }
            .into());
        }

        let max_attempts = self.config.max_attempts;
        let mut session = SessionState::new(query.clone());
        let mut state = OrchestratorState::Routing;
        let mut attempt = 0u32;
        let mut evidence = RetrievalResult::empty();
        let mut draft: Option<ResearchOutput> = None;
        let mut previous: Option<VerificationVerdict> = None;

        while !state.is_terminal() {
            if cancel.is_cancelled() {
                tracing::info!(session_id = %query.session_id, ?state, attempt, "Query cancelled");
                state = self.step(state, OrchestratorEvent::Cancel)?;
                continue;
            }

            let event = match state {
                OrchestratorState::Routing => {
                    let route = self
                        .router
                        .run(RouteRequest {
                            query: query.text.clone(),
                            snapshot: Arc::clone(&snapshot),
                        })
                        .await;
                    if let Some(ref error) = route.error {
                        tracing::warn!(session_id = %query.session_id, error = %error, "Router failed closed");
                    }
                    let event = if route.is_in_scope() {
                        OrchestratorEvent::InScope
                    } else {
                        OrchestratorEvent::OutOfScope
                    };
                    session.record_route(route)?;
                    event
                }
                OrchestratorState::Retrieving => {
                    attempt += 1;
                    evidence = match self
                        .retriever
                        .retrieve(&query.text, &snapshot, self.config.top_k)
                        .await
                    {
                        Ok(result) => result,
                        Err(e) => {
                            tracing::warn!(
                                session_id = %query.session_id,
                                attempt,
                                error = %e,
                                "Retrieval failed, continuing with no evidence"
                            );
                            RetrievalResult::empty()
                        }
                    };
                    OrchestratorEvent::Retrieved
                }
                OrchestratorState::Drafting => {
                    let request = ResearchRequest {
                        query: query.text.clone(),
                        attempt,
                        previous: previous.clone(),
                        evidence: evidence.clone(),
                        snapshot: Arc::clone(&snapshot),
                    };
                    match self.researcher.run(request).await {
                        Ok(output) => {
                            draft = Some(output);
                            OrchestratorEvent::Drafted
                        }
                        Err(e) => {
                            tracing::warn!(session_id = %query.session_id, attempt, error = %e, "Research failed");
                            let verdict = VerificationVerdict::fail(
                                vec![format!("research failed: {}", e)],
                                0.0,
                            );
                            session.push_iteration(IterationRecord {
                                attempt_number: attempt,
                                retrieval_result: std::mem::take(&mut evidence),
                                answer: Answer::hedged("", attempt),
                                verdict: verdict.clone(),
                                sub_queries: Vec::new(),
                            })?;
                            previous = Some(verdict);
                            OrchestratorEvent::ResearchFailed {
                                can_retry: attempt < max_attempts,
                            }
                        }
                    }
                }
                OrchestratorState::Verifying => {
                    let output = draft.take().ok_or_else(|| {
                        AgentError::Core("verification reached without a draft".to_string())
                    })?;
                    let verdict = self
                        .verifier
                        .run(VerificationRequest {
                            answer: output.answer.clone(),
                            evidence: output.evidence.clone(),
                        })
                        .await;
                    let event = if verdict.supported {
                        OrchestratorEvent::Supported
                    } else {
                        OrchestratorEvent::Unsupported {
                            can_retry: attempt < max_attempts,
                        }
                    };
                    session.push_iteration(IterationRecord {
                        attempt_number: attempt,
                        retrieval_result: output.evidence,
                        answer: output.answer,
                        verdict: verdict.clone(),
                        sub_queries: output.sub_queries,
                    })?;
                    previous = Some(verdict);
                    event
                }
                terminal => {
                    return Err(AgentError::Core(format!(
                        "orchestrator loop entered terminal state {:?}",
                        terminal
                    )))
                }
            };

            state = self.step(state, event)?;
        }

        if let Some(status) = state.terminal_status() {
            session.finish(status)?;
        }

        tracing::info!(
            session_id = %query.session_id,
            version = %query.corpus_version,
            ?state,
            attempts = session.attempts(),
            "Query finished"
        );

        Ok(session)
    }

    fn step(
        &self,
        state: OrchestratorState,
        event: OrchestratorEvent,
    ) -> Result<OrchestratorState, AgentError> {
        let next = transition(state, event)?;
        tracing::debug!(from = ?state, ?event, to = ?next, "Orchestrator transition");
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        ops_chunks, snapshot, CitingResearcher, FailingResearcher, FixedVerifier, StaticRouter,
    };
    use docchat_core::CorpusVersion;
    use OrchestratorEvent as E;
    use OrchestratorState as S;

    fn orchestrator(router: StaticRouter, researcher: DynResearcher, verifier: FixedVerifier) -> Orchestrator {
        Orchestrator::new(
            Arc::new(router),
            researcher,
            Arc::new(verifier),
            HybridRetriever::default(),
            OrchestratorConfig::default(),
        )
    }

    fn query() -> Query {
        Query::new("When do backups run?", "s1", CorpusVersion(1))
    }

    #[tokio::test]
    async fn test_run_finalizes() {
        let orchestrator = orchestrator(
            StaticRouter::in_scope(),
            Arc::new(CitingResearcher),
            FixedVerifier::supported(),
        );
        let state = orchestrator
            .run(query(), snapshot(ops_chunks()).await, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(state.terminal_status(), Some(TerminalStatus::Finalized));
        assert_eq!(state.attempts(), 1);
        let record = &state.iterations()[0];
        assert!(record
            .answer
            .citations
            .iter()
            .all(|id| record.retrieval_result.contains(id)));
    }

    #[tokio::test]
    async fn test_run_rejected_skips_attempts() {
        let orchestrator = orchestrator(
            StaticRouter::out_of_scope(),
            Arc::new(CitingResearcher),
            FixedVerifier::supported(),
        );
        let state = orchestrator
            .run(query(), snapshot(ops_chunks()).await, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(state.terminal_status(), Some(TerminalStatus::Rejected));
        assert!(state.iterations().is_empty());
        assert!(state.route().is_some());
    }

    #[tokio::test]
    async fn test_run_exhausts_attempts() {
        let orchestrator = orchestrator(
            StaticRouter::in_scope(),
            Arc::new(CitingResearcher),
            FixedVerifier::unsupported(),
        );
        let state = orchestrator
            .run(query(), snapshot(ops_chunks()).await, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(state.terminal_status(), Some(TerminalStatus::UnverifiedExit));
        let attempts: Vec<u32> = state.iterations().iter().map(|r| r.attempt_number).collect();
        assert_eq!(attempts, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_research_failure_is_recorded_and_retried() {
        let orchestrator = orchestrator(
            StaticRouter::in_scope(),
            Arc::new(FailingResearcher),
            FixedVerifier::supported(),
        );
        let state = orchestrator
            .run(query(), snapshot(ops_chunks()).await, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(state.terminal_status(), Some(TerminalStatus::UnverifiedExit));
        assert_eq!(state.attempts(), 3);
        let last = state.last_iteration().unwrap();
        assert!(!last.verdict.supported);
        assert!(last.verdict.unsupported_claims[0].starts_with("research failed:"));
        assert!(last.answer.citations.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_routing() {
        let orchestrator = orchestrator(
            StaticRouter::in_scope(),
            Arc::new(CitingResearcher),
            FixedVerifier::supported(),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let state = orchestrator
            .run(query(), snapshot(ops_chunks()).await, &cancel)
            .await
            .unwrap();
        assert_eq!(state.terminal_status(), Some(TerminalStatus::Cancelled));
        assert!(state.route().is_none());
    }

    #[tokio::test]
    async fn test_snapshot_must_match_query_version() {
        let orchestrator = orchestrator(
            StaticRouter::in_scope(),
            Arc::new(CitingResearcher),
            FixedVerifier::supported(),
        );
        let query = Query::new("When do backups run?", "s1", CorpusVersion(2));
        let result = orchestrator
            .run(query, snapshot(ops_chunks()).await, &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(AgentError::Core(_))));
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut state = S::Routing;
        for event in [E::InScope, E::Retrieved, E::Drafted, E::Supported] {
            state = transition(state, event).unwrap();
        }
        assert_eq!(state, S::Finalized);
    }

    #[test]
    fn test_retry_transitions() {
        assert_eq!(
            transition(S::Verifying, E::Unsupported { can_retry: true }).unwrap(),
            S::Retrieving
        );
        assert_eq!(
            transition(S::Verifying, E::Unsupported { can_retry: false }).unwrap(),
            S::UnverifiedExit
        );
        assert_eq!(
            transition(S::Drafting, E::ResearchFailed { can_retry: true }).unwrap(),
            S::Retrieving
        );
        assert_eq!(
            transition(S::Drafting, E::ResearchFailed { can_retry: false }).unwrap(),
            S::UnverifiedExit
        );
    }

    #[test]
    fn test_out_of_scope_rejects() {
        assert_eq!(transition(S::Routing, E::OutOfScope).unwrap(), S::Rejected);
    }

    #[test]
    fn test_cancel_from_any_running_state() {
        for state in [S::Routing, S::Retrieving, S::Drafting, S::Verifying] {
            assert_eq!(transition(state, E::Cancel).unwrap(), S::Cancelled);
        }
    }

    #[test]
    fn test_terminal_states_accept_nothing() {
        for state in [S::Finalized, S::Rejected, S::UnverifiedExit, S::Cancelled] {
            assert!(state.is_terminal());
            assert!(transition(state, E::Cancel).is_err());
            assert!(transition(state, E::InScope).is_err());
        }
    }

    #[test]
    fn test_invalid_transition_error() {
        let err = transition(S::Retrieving, E::Supported).unwrap_err();
        assert_eq!(
            err,
            AgentError::InvalidTransition {
                from: S::Retrieving,
                event: E::Supported
            }
        );
        assert!(transition(S::Routing, E::Drafted).is_err());
    }

    #[test]
    fn test_terminal_status_mapping() {
        assert_eq!(S::UnverifiedExit.terminal_status(), Some(TerminalStatus::UnverifiedExit));
        assert_eq!(S::Drafting.terminal_status(), None);
    }

    #[test]
    fn test_config_has_at_least_one_attempt() {
        let config = OrchestratorConfig::new(
            &docchat_config::OrchestratorConfig {
                max_attempts: 0,
                max_sub_queries: 3,
            },
            &docchat_config::RetrievalConfig::default(),
        );
        assert_eq!(config.max_attempts, 1);
        assert_eq!(OrchestratorConfig::default().max_attempts, 3);
    }
}
