//! Shared fixtures for the orchestration tests
//!
//! `MockLlm` answers every role deterministically. It tells the roles apart
//! by their system prompts and counts calls per role.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use docchat_agent::{
    research, router, verification, Orchestrator, OrchestratorConfig, RelevanceRouter,
    ResearchAgent, ResearchConfig, RouterSettings, SessionService, SessionSettings,
    VerificationAgent,
};
use docchat_config::RouterMode;
use docchat_core::{
    CancellationToken, Chunk, Corpus, CorpusSnapshot, CorpusStore, CorpusVersion, LexicalHit,
    LexicalIndex, SemanticHit, SemanticIndex,
};
use docchat_llm::{
    GenerationResult, InferenceClient, InferenceOptions, LlmBackend, LlmError, Message,
    RetryPolicy, Role,
};
use docchat_rag::{CorpusBuilder, HashEmbedder, HybridRetriever, RetrieverConfig};

pub const ROUTER: &str = "router";
pub const DRAFT: &str = "draft";
pub const SUB_QUERY: &str = "sub_query";
pub const VERIFY: &str = "verify";

/// Pauses the first drafting call until released
#[derive(Default)]
pub struct Gate {
    pub started: Notify,
    pub release: Notify,
}

pub struct MockLlm {
    relevance: f32,
    drafts: Vec<String>,
    verdicts: Vec<String>,
    sub_queries: String,
    calls: Mutex<HashMap<&'static str, usize>>,
    gate: Option<Arc<Gate>>,
    gated: AtomicBool,
    cancel_on_verify: Option<CancellationToken>,
}

impl MockLlm {
    pub fn new() -> Self {
        Self {
            relevance: 0.9,
            drafts: Vec::new(),
            verdicts: Vec::new(),
            sub_queries: "[]".to_string(),
            calls: Mutex::new(HashMap::new()),
            gate: None,
            gated: AtomicBool::new(false),
            cancel_on_verify: None,
        }
    }

    pub fn relevance(mut self, relevance: f32) -> Self {
        self.relevance = relevance;
        self
    }

    /// Draft replies by call number; the last one repeats
    pub fn drafts(mut self, drafts: &[&str]) -> Self {
        self.drafts = drafts.iter().map(|d| d.to_string()).collect();
        self
    }

    /// Verification replies by call number; the last one repeats
    pub fn verdicts(mut self, verdicts: &[String]) -> Self {
        self.verdicts = verdicts.to_vec();
        self
    }

    pub fn sub_queries(mut self, queries: &[&str]) -> Self {
        self.sub_queries = serde_json::to_string(queries).unwrap_or_else(|_| "[]".to_string());
        self
    }

    pub fn gate(mut self, gate: Arc<Gate>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn cancel_on_verify(mut self, token: CancellationToken) -> Self {
        self.cancel_on_verify = Some(token);
        self
    }

    pub fn build(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self, role: &str) -> usize {
        self.calls.lock().get(role).copied().unwrap_or(0)
    }

    fn role(messages: &[Message]) -> Option<&'static str> {
        let system = messages.iter().find(|m| m.role == Role::System)?;
        match system.content.as_str() {
            s if s == router::SYSTEM_PROMPT => Some(ROUTER),
            s if s == research::SYSTEM_PROMPT => Some(DRAFT),
            s if s == research::SUB_QUERY_PROMPT => Some(SUB_QUERY),
            s if s == verification::SYSTEM_PROMPT => Some(VERIFY),
            _ => None,
        }
    }

    fn pick(replies: &[String], n: usize) -> Result<GenerationResult, LlmError> {
        replies
            .get(n.min(replies.len().saturating_sub(1)))
            .map(|r| GenerationResult::text(r.clone()))
            .ok_or_else(|| LlmError::Generation("no scripted reply".to_string()))
    }
}

#[async_trait]
impl LlmBackend for MockLlm {
    async fn generate(
        &self,
        messages: &[Message],
        _options: &InferenceOptions,
    ) -> Result<GenerationResult, LlmError> {
        let role = Self::role(messages)
            .ok_or_else(|| LlmError::Generation("unknown prompt".to_string()))?;
        let n = {
            let mut calls = self.calls.lock();
            let count = calls.entry(role).or_insert(0);
            *count += 1;
            *count - 1
        };

        match role {
            ROUTER => Ok(GenerationResult::text(format!(
                r#"{{"relevance": {}, "reason": "mock"}}"#,
                self.relevance
            ))),
            SUB_QUERY => Ok(GenerationResult::text(self.sub_queries.clone())),
            DRAFT => {
                if let Some(gate) = &self.gate {
                    if !self.gated.swap(true, Ordering::SeqCst) {
                        gate.started.notify_one();
                        gate.release.notified().await;
                    }
                }
                Self::pick(&self.drafts, n)
            }
            _ => {
                if let Some(token) = &self.cancel_on_verify {
                    token.cancel();
                }
                Self::pick(&self.verdicts, n)
            }
        }
    }

    async fn is_available(&self) -> bool {
        true
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

/// Verification reply judging claims 1..=n
pub fn verdict(supported: &[bool]) -> String {
    let claims: Vec<String> = supported
        .iter()
        .enumerate()
        .map(|(i, s)| format!(r#"{{"index": {}, "supported": {}}}"#, i + 1, s))
        .collect();
    format!(r#"{{"claims": [{}]}}"#, claims.join(", "))
}

pub fn client(llm: Arc<MockLlm>) -> InferenceClient {
    InferenceClient::new(
        llm,
        RetryPolicy {
            timeout: Duration::from_secs(10),
            max_retries: 0,
            initial_backoff: Duration::from_millis(1),
        },
    )
}

/// Real agents over the mock model, retrieving the top two chunks per query
pub fn orchestrator(llm: Arc<MockLlm>, max_attempts: u32) -> Orchestrator {
    let retriever = HybridRetriever::new(RetrieverConfig {
        top_k: 2,
        ..Default::default()
    });

    Orchestrator::new(
        Arc::new(RelevanceRouter::new(
            client(llm.clone()),
            RouterSettings {
                mode: RouterMode::Classifier,
                threshold: 0.5,
                probe_chunks: 5,
            },
        )),
        Arc::new(ResearchAgent::new(
            client(llm.clone()),
            retriever.clone(),
            ResearchConfig::default(),
        )),
        Arc::new(VerificationAgent::new(client(llm))),
        retriever,
        OrchestratorConfig {
            max_attempts,
            top_k: 2,
        },
    )
}

pub fn service(llm: Arc<MockLlm>, store: Arc<CorpusStore>) -> SessionService {
    SessionService::new(
        Arc::new(orchestrator(llm, 3)),
        store,
        SessionSettings::default(),
    )
}

/// Three documents, nine chunks
pub fn chunks() -> Vec<Chunk> {
    let docs = [
        (
            "backup.md",
            "Backups",
            [
                "Backups run nightly at two in the morning.",
                "Backups are kept for thirty days before deletion.",
                "Backups are encrypted at rest.",
            ],
        ),
        (
            "restore.md",
            "Restore",
            [
                "Run the restore command with a backup id to restore data.",
                "Restores require an administrator role.",
                "Restoring ten gigabytes takes about fifteen minutes.",
            ],
        ),
        (
            "network.md",
            "Network",
            [
                "The API server listens on port 8080 by default.",
                "TLS termination happens at the load balancer.",
                "Set DOCCHAT__SERVER__PORT to change the listening port.",
            ],
        ),
    ];

    let mut chunks = Vec::new();
    for (doc, header, texts) in docs {
        for (seq, text) in texts.iter().enumerate() {
            let id = format!("c{}", chunks.len() + 1);
            chunks.push(
                Chunk::new(id, *text, doc)
                    .with_header_path(header)
                    .with_sequence_index(seq),
            );
        }
    }
    chunks
}

pub async fn snapshot(version: CorpusVersion, chunks: Vec<Chunk>) -> CorpusSnapshot {
    CorpusBuilder::in_memory(Arc::new(HashEmbedder::new(1024)))
        .build(version, chunks)
        .await
        .unwrap()
}

pub async fn store() -> Arc<CorpusStore> {
    let store = Arc::new(CorpusStore::new());
    store
        .install(snapshot(CorpusVersion(1), chunks()).await, BTreeSet::new())
        .unwrap();
    store
}

pub struct EmptyLexical(pub CorpusVersion);

impl LexicalIndex for EmptyLexical {
    fn version(&self) -> CorpusVersion {
        self.0
    }

    fn search(&self, _text: &str, version: CorpusVersion, _k: usize) -> docchat_core::Result<Vec<LexicalHit>> {
        self.check_version(version)?;
        Ok(Vec::new())
    }

    fn len(&self) -> usize {
        0
    }
}

pub struct EmptySemantic(pub CorpusVersion);

#[async_trait]
impl SemanticIndex for EmptySemantic {
    fn version(&self) -> CorpusVersion {
        self.0
    }

    async fn embed(&self, _text: &str) -> docchat_core::Result<Vec<f32>> {
        Ok(vec![0.0; 8])
    }

    async fn search(
        &self,
        _embedding: &[f32],
        version: CorpusVersion,
        _k: usize,
    ) -> docchat_core::Result<Vec<SemanticHit>> {
        self.check_version(version)?;
        Ok(Vec::new())
    }
}

/// The corpus behind indexes that never return anything
pub fn silent_snapshot() -> Arc<CorpusSnapshot> {
    let version = CorpusVersion(1);
    let corpus = Arc::new(Corpus::new(version, chunks()).unwrap());
    Arc::new(
        CorpusSnapshot::new(
            corpus,
            Arc::new(EmptyLexical(version)),
            Arc::new(EmptySemantic(version)),
        )
        .unwrap(),
    )
}
