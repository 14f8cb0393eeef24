//! Orchestration properties: routing short-circuit, citation grounding,
//! attempt bounds, determinism, cancellation, and version pinning.

mod common;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use common::*;
use docchat_agent::AgentError;
use docchat_core::{
    CancellationToken, Chunk, CorpusVersion, Query, QueryResponse, QueryStatus, TerminalStatus,
};

const WAIT: Duration = Duration::from_secs(10);

fn query(text: &str) -> Query {
    Query::new(text, "session-1", CorpusVersion(1))
}

/// Test that no research or verification call happens below the threshold
#[tokio::test]
async fn test_router_short_circuits() {
    for relevance in [0.0, 0.2, 0.5] {
        let llm = MockLlm::new()
            .relevance(relevance)
            .drafts(&["Backups run nightly [[chunk:c1]]."])
            .verdicts(&[verdict(&[true])])
            .build();

        let state = orchestrator(llm.clone(), 3)
            .run(
                query("When do backups run?"),
                Arc::new(snapshot(CorpusVersion(1), chunks()).await),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(state.terminal_status(), Some(TerminalStatus::Rejected));
        assert_eq!(llm.calls(DRAFT), 0, "relevance {}", relevance);
        assert_eq!(llm.calls(SUB_QUERY), 0);
        assert_eq!(llm.calls(VERIFY), 0);
    }
}

/// Test that finalized citations always come from the same attempt's evidence
#[tokio::test]
async fn test_finalized_citations_within_evidence() {
    let llm = MockLlm::new()
        .drafts(&["Backups run nightly [[chunk:c1]][[chunk:c42]]. Restores need an administrator [[chunk:c5]]."])
        .verdicts(&[verdict(&[true, true])])
        .build();

    let state = orchestrator(llm, 3)
        .run(
            query("When do backups run?"),
            Arc::new(snapshot(CorpusVersion(1), chunks()).await),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    if state.terminal_status() == Some(TerminalStatus::Finalized) {
        let record = state.last_iteration().unwrap();
        assert!(!record.answer.citations.is_empty());
        for id in &record.answer.citations {
            assert!(record.retrieval_result.contains(id), "{} not in evidence", id);
        }
        assert!(!record.answer.citations.contains("c42"));
    }

    for record in state.iterations() {
        assert!(record
            .answer
            .citations
            .iter()
            .all(|id| record.retrieval_result.contains(id)));
    }
}

/// Test that attempts never exceed the configured maximum
#[tokio::test]
async fn test_attempts_bounded() {
    for max_attempts in 1..=4 {
        let llm = MockLlm::new()
            .drafts(&["Backups run every hour [[chunk:c1]]."])
            .verdicts(&[verdict(&[false])])
            .sub_queries(&["backup schedule"])
            .build();

        let state = orchestrator(llm.clone(), max_attempts)
            .run(
                query("How often do backups run?"),
                Arc::new(snapshot(CorpusVersion(1), chunks()).await),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(state.attempts(), max_attempts);
        assert_eq!(state.terminal_status(), Some(TerminalStatus::UnverifiedExit));
        assert!(!state.last_iteration().unwrap().verdict.supported);
        assert_eq!(llm.calls(DRAFT) as u32, max_attempts);
    }
}

/// Test that a pass on the final attempt finalizes instead of exiting unverified
#[tokio::test]
async fn test_pass_on_last_attempt_finalizes() {
    let llm = MockLlm::new()
        .drafts(&["Backups run nightly [[chunk:c1]]."])
        .verdicts(&[verdict(&[false]), verdict(&[false]), verdict(&[true])])
        .sub_queries(&["backup schedule"])
        .build();

    let state = orchestrator(llm, 3)
        .run(
            query("When do backups run?"),
            Arc::new(snapshot(CorpusVersion(1), chunks()).await),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(state.attempts(), 3);
    assert_eq!(state.terminal_status(), Some(TerminalStatus::Finalized));
}

/// Test that identical inputs produce identical outcomes
#[tokio::test]
async fn test_deterministic_outcomes() {
    let snapshot = Arc::new(snapshot(CorpusVersion(1), chunks()).await);
    let mut outcomes = Vec::new();

    for _ in 0..2 {
        let llm = MockLlm::new()
            .drafts(&[
                "Backups run hourly [[chunk:c1]].",
                "Backups run nightly [[chunk:c1]].",
            ])
            .verdicts(&[verdict(&[false]), verdict(&[true])])
            .sub_queries(&["backup schedule"])
            .build();

        let state = orchestrator(llm, 3)
            .run(
                query("When do backups run?"),
                Arc::clone(&snapshot),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        outcomes.push(state);
    }

    assert_eq!(outcomes[0].terminal_status(), outcomes[1].terminal_status());
    assert_eq!(outcomes[0].route(), outcomes[1].route());
    assert_eq!(outcomes[0].iterations(), outcomes[1].iterations());
    assert_eq!(
        QueryResponse::from(&outcomes[0]),
        QueryResponse::from(&outcomes[1])
    );
}

/// Test that cancelling mid-run stops at the next boundary and keeps history
#[tokio::test]
async fn test_cancellation_keeps_history() {
    let cancel = CancellationToken::new();
    let llm = MockLlm::new()
        .drafts(&["Backups run hourly [[chunk:c1]]."])
        .verdicts(&[verdict(&[false])])
        .cancel_on_verify(cancel.clone())
        .build();

    let state = orchestrator(llm.clone(), 3)
        .run(
            query("When do backups run?"),
            Arc::new(snapshot(CorpusVersion(1), chunks()).await),
            &cancel,
        )
        .await
        .unwrap();

    assert_eq!(state.terminal_status(), Some(TerminalStatus::Cancelled));
    assert_eq!(state.iterations().len(), 1);
    assert!(state.route().is_some());
    assert_eq!(llm.calls(DRAFT), 1);

    let response = QueryResponse::from(&state);
    assert_eq!(response.status, QueryStatus::Cancelled);
    assert_eq!(response.attempts, 1);
}

/// Test that a rebuild during a query does not change the version it reads
#[tokio::test]
async fn test_query_pinned_to_submission_version() {
    let gate = Arc::new(Gate::default());
    let llm = MockLlm::new()
        .drafts(&["Backups run nightly [[chunk:c1]]."])
        .verdicts(&[verdict(&[true])])
        .gate(Arc::clone(&gate))
        .build();
    let store = store().await;
    let service = Arc::new(service(llm, Arc::clone(&store)));

    let running = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.submit_query("s1", "When do backups run?").await })
    };
    timeout(WAIT, gate.started.notified()).await.unwrap();

    let rebuilt = vec![Chunk::new("n1", "Backups now run weekly on Sundays.", "backup.md")];
    store
        .install(snapshot(CorpusVersion(2), rebuilt).await, BTreeSet::new())
        .unwrap();
    gate.release.notify_one();

    let response = timeout(WAIT, running).await.unwrap().unwrap().unwrap();
    assert_eq!(response.status, QueryStatus::Finalized);
    assert_eq!(response.corpus_version, CorpusVersion(1));
    assert_eq!(response.citations, vec!["c1".to_string()]);

    let history = service.history("s1").unwrap();
    let evidence = &history[0].iterations()[0].retrieval_result;
    assert!(evidence.ids().all(|id| id.starts_with('c')));

    assert_eq!(store.current_version(), Some(CorpusVersion(2)));
    let next = service.submit_query("s1", "When do backups run?").await.unwrap();
    assert_eq!(next.corpus_version, CorpusVersion(2));
}

/// Test that a session runs one query at a time while others proceed
#[tokio::test]
async fn test_concurrent_submit_is_busy() {
    let gate = Arc::new(Gate::default());
    let llm = MockLlm::new()
        .drafts(&["Backups run nightly [[chunk:c1]]."])
        .verdicts(&[verdict(&[true])])
        .gate(Arc::clone(&gate))
        .build();
    let service = Arc::new(service(llm, store().await));

    let running = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.submit_query("s1", "When do backups run?").await })
    };
    timeout(WAIT, gate.started.notified()).await.unwrap();

    assert_eq!(
        service.submit_query("s1", "How do I restore?").await.unwrap_err(),
        AgentError::SessionBusy("s1".to_string())
    );

    let other = timeout(WAIT, service.submit_query("s2", "When do backups run?"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(other.status, QueryStatus::Finalized);

    gate.release.notify_one();
    let first = timeout(WAIT, running).await.unwrap().unwrap().unwrap();
    assert_eq!(first.status, QueryStatus::Finalized);

    assert_eq!(service.history("s1").unwrap().len(), 1);
    assert_eq!(service.history("s2").unwrap().len(), 1);
}
