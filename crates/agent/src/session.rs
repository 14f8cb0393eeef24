//! Session service
//!
//! Entry point for callers. Each session runs one query at a time against
//! the corpus version current when the query was submitted, and keeps an
//! append-only history of every finished [`SessionState`].

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use docchat_config::SessionConfig;
use docchat_core::{CancellationToken, CorpusStore, Query, QueryResponse, SessionState};

use crate::orchestrator::Orchestrator;
use crate::AgentError;

/// Session registry limits
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub max_sessions: usize,
    /// Idle time after which a session may be reaped
    pub idle_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&SessionConfig::default())
    }
}

impl From<&SessionConfig> for SessionSettings {
    fn from(config: &SessionConfig) -> Self {
        Self {
            max_sessions: config.max_sessions,
            idle_timeout: Duration::from_secs(config.idle_timeout_seconds),
        }
    }
}

/// One caller conversation
pub struct Session {
    id: String,
    created_at: Instant,
    last_activity: RwLock<Instant>,
    busy: AtomicBool,
    cancel: Mutex<CancellationToken>,
    history: RwLock<Vec<SessionState>>,
}

impl Session {
    fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            created_at: Instant::now(),
            last_activity: RwLock::new(Instant::now()),
            busy: AtomicBool::new(false),
            cancel: Mutex::new(CancellationToken::new()),
            history: RwLock::new(Vec::new()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// True while a query is running
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    pub fn history(&self) -> Vec<SessionState> {
        self.history.read().clone()
    }

    pub fn touch(&self) {
        *self.last_activity.write() = Instant::now();
    }

    /// Idle sessions with no running query expire
    pub fn is_expired(&self, timeout: Duration) -> bool {
        !self.is_busy() && self.last_activity.read().elapsed() > timeout
    }

    /// Claim the session for one query and hand out a fresh cancel token.
    ///
    /// The token lock is held across the claim so a concurrent `cancel`
    /// always sees the token of the query it observed as running.
    fn begin(self: &Arc<Self>) -> Result<(BusyGuard, CancellationToken), AgentError> {
        let mut current = self.cancel.lock();
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(AgentError::SessionBusy(self.id.clone()));
        }

        let token = CancellationToken::new();
        *current = token.clone();
        drop(current);

        self.touch();
        Ok((BusyGuard(Arc::clone(self)), token))
    }

    fn cancel(&self) -> bool {
        let current = self.cancel.lock();
        if self.is_busy() {
            current.cancel();
            true
        } else {
            false
        }
    }

    fn record(&self, state: SessionState) {
        self.history.write().push(state);
        self.touch();
    }
}

/// Releases the busy flag when the query task ends
struct BusyGuard(Arc<Session>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.busy.store(false, Ordering::SeqCst);
    }
}

/// Cancels the query if the caller stops waiting for it
struct CancelOnDrop(Option<CancellationToken>);

impl CancelOnDrop {
    fn disarm(&mut self) {
        self.0 = None;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let Some(token) = self.0.take() {
            token.cancel();
            tracing::info!("Caller went away, cancelling query");
        }
    }
}

/// Session registry plus the query entry point
pub struct SessionService {
    orchestrator: Arc<Orchestrator>,
    store: Arc<CorpusStore>,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    settings: SessionSettings,
}

impl SessionService {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        store: Arc<CorpusStore>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            orchestrator,
            store,
            sessions: RwLock::new(HashMap::new()),
            settings,
        }
    }

    pub fn store(&self) -> &Arc<CorpusStore> {
        &self.store
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Run `text` to completion in `session_id`, creating the session if needed.
    ///
    /// The query is pinned to the corpus version installed at submission;
    /// a rebuild that lands mid-query does not affect it. The query runs on
    /// its own task, so dropping the returned future cancels it and its
    /// state is still recorded in the session history.
    pub async fn submit_query(
        &self,
        session_id: &str,
        text: &str,
    ) -> Result<QueryResponse, AgentError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AgentError::InvalidInput("question must not be empty".to_string()));
        }
        if session_id.trim().is_empty() {
            return Err(AgentError::InvalidInput("session id must not be empty".to_string()));
        }

        let snapshot = self.store.require_current()?;
        let (session, busy, cancel) = self.claim(session_id)?;

        let query = Query::new(text, session_id, snapshot.version());
        tracing::info!(session_id = %session_id, version = %query.corpus_version, "Query submitted");

        let orchestrator = Arc::clone(&self.orchestrator);
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            let _busy = busy;
            let state = orchestrator.run(query, snapshot, &token).await?;
            let response = QueryResponse::from(&state);
            session.record(state);
            Ok::<_, AgentError>(response)
        });

        let mut abandon = CancelOnDrop(Some(cancel));
        let result = task
            .await
            .map_err(|e| AgentError::Task(e.to_string()))?;
        abandon.disarm();

        result
    }

    /// Signal the running query of `session_id`; false when nothing is running
    pub fn cancel(&self, session_id: &str) -> bool {
        let cancelled = self
            .get(session_id)
            .map(|session| session.cancel())
            .unwrap_or(false);
        if cancelled {
            tracing::info!(session_id = %session_id, "Cancellation requested");
        }
        cancelled
    }

    /// Finished queries of a session, oldest first
    pub fn history(&self, session_id: &str) -> Result<Vec<SessionState>, AgentError> {
        self.get(session_id)
            .map(|session| session.history())
            .ok_or_else(|| AgentError::SessionNotFound(session_id.to_string()))
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.read().get(session_id).cloned()
    }

    /// Drop a session, cancelling its running query
    pub fn remove(&self, session_id: &str) -> bool {
        match self.sessions.write().remove(session_id) {
            Some(session) => {
                session.cancel();
                tracing::info!(session_id = %session_id, "Removed session");
                true
            }
            None => false,
        }
    }

    pub fn count(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn list(&self) -> Vec<String> {
        self.sessions.read().keys().cloned().collect()
    }

    /// Remove idle sessions; returns how many were removed
    pub fn cleanup_expired(&self) -> usize {
        let mut sessions = self.sessions.write();
        Self::cleanup_expired_internal(&mut sessions, self.settings.idle_timeout)
    }

    fn cleanup_expired_internal(
        sessions: &mut HashMap<String, Arc<Session>>,
        timeout: Duration,
    ) -> usize {
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, s)| s.is_expired(timeout))
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            sessions.remove(id);
            tracing::info!(session_id = %id, "Expired session");
        }
        expired.len()
    }

    /// Look up or create `session_id` and claim it for one query.
    ///
    /// The claim happens under the registry lock, so the reaper never
    /// removes a session between lookup and claim.
    fn claim(
        &self,
        session_id: &str,
    ) -> Result<(Arc<Session>, BusyGuard, CancellationToken), AgentError> {
        {
            let sessions = self.sessions.read();
            if let Some(session) = sessions.get(session_id) {
                let (busy, cancel) = session.begin()?;
                return Ok((Arc::clone(session), busy, cancel));
            }
        }

        let mut sessions = self.sessions.write();
        if let Some(session) = sessions.get(session_id) {
            let (busy, cancel) = session.begin()?;
            return Ok((Arc::clone(session), busy, cancel));
        }

        if sessions.len() >= self.settings.max_sessions {
            Self::cleanup_expired_internal(&mut sessions, self.settings.idle_timeout);
            if sessions.len() >= self.settings.max_sessions {
                return Err(AgentError::SessionLimit(self.settings.max_sessions));
            }
        }

        let session = Arc::new(Session::new(session_id));
        let (busy, cancel) = session.begin()?;
        sessions.insert(session_id.to_string(), Arc::clone(&session));
        tracing::info!(session_id = %session_id, "Created session");
        Ok((session, busy, cancel))
    }
}
