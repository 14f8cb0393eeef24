//! Application State
//!
//! Shared state across all handlers.

use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;

use docchat_agent::{
    Orchestrator, RelevanceRouter, ResearchAgent, ResearchConfig, RouterSettings, SessionService,
    SessionSettings, VerificationAgent,
};
use docchat_config::Settings;
use docchat_core::CorpusStore;
use docchat_llm::InferenceClient;
use docchat_rag::{
    CorpusBuilder, DocumentProcessor, Embedder, HybridRetriever, IngestionService, RetrieverConfig,
};

use crate::session::SessionManager;

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub store: Arc<CorpusStore>,
    pub ingestion: Arc<IngestionService>,
    pub sessions: Arc<SessionManager>,
    /// Inference client, kept for readiness probes
    pub llm: InferenceClient,
    /// Present when the Prometheus recorder is installed
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Wire the agents, the corpus store and the session registry from `config`
    pub fn new(config: Settings, llm: InferenceClient, embedder: Arc<dyn Embedder>) -> Self {
        let store = Arc::new(CorpusStore::new());
        let retriever = HybridRetriever::new(RetrieverConfig::from(&config.retrieval));

        let orchestrator = Orchestrator::new(
            Arc::new(RelevanceRouter::new(
                llm.clone(),
                RouterSettings::from(&config.router),
            )),
            Arc::new(ResearchAgent::new(
                llm.clone(),
                retriever.clone(),
                ResearchConfig::from(&config.orchestrator),
            )),
            Arc::new(VerificationAgent::new(llm.clone())),
            retriever,
            docchat_agent::OrchestratorConfig::new(&config.orchestrator, &config.retrieval),
        );

        let service = SessionService::new(
            Arc::new(orchestrator),
            Arc::clone(&store),
            SessionSettings::from(&config.sessions),
        );
        let sessions = SessionManager::new(
            Arc::new(service),
            Duration::from_secs(config.sessions.cleanup_interval_seconds),
        );

        let ingestion = IngestionService::new(
            DocumentProcessor::from(&config.ingestion),
            CorpusBuilder::new(embedder, &config.retrieval),
            Arc::clone(&store),
        );

        Self {
            config: Arc::new(config),
            store,
            ingestion: Arc::new(ingestion),
            sessions: Arc::new(sessions),
            llm,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}
