//! Session Management
//!
//! Wraps the agent-layer [`SessionService`] with metrics and a background
//! task that reaps idle sessions.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use docchat_agent::SessionService;
use docchat_core::{QueryResponse, SessionState};

use crate::metrics::record_query_outcome;
use crate::ServerError;

/// Session manager
pub struct SessionManager {
    service: Arc<SessionService>,
    cleanup_interval: Duration,
}

impl SessionManager {
    pub fn new(service: Arc<SessionService>, cleanup_interval: Duration) -> Self {
        Self {
            service,
            cleanup_interval,
        }
    }

    pub fn service(&self) -> &Arc<SessionService> {
        &self.service
    }

    /// Start a background task that periodically removes idle sessions.
    ///
    /// Sending `true` on the returned channel stops the task.
    pub fn start_cleanup_task(self: &Arc<Self>) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let manager = Arc::clone(self);
        let interval = manager.cleanup_interval.max(Duration::from_secs(1));

        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(interval);
            interval_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = interval_timer.tick() => {
                        let removed = manager.service.cleanup_expired();
                        if removed > 0 {
                            tracing::info!(
                                removed,
                                remaining = manager.service.count(),
                                "Session cleanup removed idle sessions"
                            );
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::info!("Session cleanup task shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }

    /// Run a question in `session_id` and record its outcome
    pub async fn submit(&self, session_id: &str, question: &str) -> Result<QueryResponse, ServerError> {
        let response = self.service.submit_query(session_id, question).await?;
        record_query_outcome(&response);

        tracing::info!(
            session_id = %session_id,
            status = ?response.status,
            attempts = response.attempts,
            citations = response.citations.len(),
            "Query finished"
        );
        Ok(response)
    }

    pub fn cancel(&self, session_id: &str) -> bool {
        self.service.cancel(session_id)
    }

    pub fn history(&self, session_id: &str) -> Result<Vec<SessionState>, ServerError> {
        Ok(self.service.history(session_id)?)
    }

    pub fn is_busy(&self, session_id: &str) -> bool {
        self.service
            .get(session_id)
            .map(|session| session.is_busy())
            .unwrap_or(false)
    }

    pub fn remove(&self, session_id: &str) -> bool {
        self.service.remove(session_id)
    }

    pub fn count(&self) -> usize {
        self.service.count()
    }

    pub fn list(&self) -> Vec<String> {
        self.service.list()
    }
}
