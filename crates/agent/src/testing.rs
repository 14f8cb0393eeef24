//! Test doubles shared by the agent unit tests

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use docchat_core::{
    Answer, Chunk, CorpusSnapshot, CorpusVersion, RouteOutcome, VerificationVerdict,
};
use docchat_llm::{
    GenerationResult, InferenceClient, InferenceOptions, LlmBackend, LlmError, Message,
    RetryPolicy,
};
use docchat_rag::{CorpusBuilder, HashEmbedder};

use crate::research::{ResearchOutput, ResearchRequest};
use crate::router::RouteRequest;
use crate::traits::Agent;
use crate::verification::VerificationRequest;
use crate::AgentError;

/// Backend replaying a fixed list of replies and recording every prompt
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    prompts: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedLlm {
    pub fn new(replies: Vec<Result<&str, LlmError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().map(|r| r.map(str::to_string)).collect()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn replying(replies: &[&str]) -> Arc<Self> {
        Self::new(replies.iter().map(|r| Ok(*r)).collect())
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().len()
    }

    /// User message of the `n`th call
    pub fn user_prompt(&self, n: usize) -> String {
        self.prompts.lock()[n]
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LlmBackend for ScriptedLlm {
    async fn generate(
        &self,
        messages: &[Message],
        _options: &InferenceOptions,
    ) -> Result<GenerationResult, LlmError> {
        self.prompts.lock().push(messages.to_vec());
        match self.replies.lock().pop_front() {
            Some(Ok(text)) => Ok(GenerationResult::text(text)),
            Some(Err(e)) => Err(e),
            None => Err(LlmError::Generation("script exhausted".to_string())),
        }
    }

    async fn is_available(&self) -> bool {
        true
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

pub fn client(backend: Arc<ScriptedLlm>) -> InferenceClient {
    InferenceClient::new(
        backend,
        RetryPolicy {
            timeout: Duration::from_secs(5),
            max_retries: 0,
            initial_backoff: Duration::from_millis(1),
        },
    )
}

pub fn ops_chunks() -> Vec<Chunk> {
    vec![
        Chunk::new("c1", "Backups run nightly at two in the morning.", "ops.md")
            .with_header_path("Operations > Backups"),
        Chunk::new("c2", "Restore a backup with the restore command.", "ops.md")
            .with_header_path("Operations > Restore")
            .with_sequence_index(1),
        Chunk::new("c3", "The office closes on public holidays.", "office.md")
            .with_header_path("Office"),
    ]
}

pub async fn snapshot(chunks: Vec<Chunk>) -> Arc<CorpusSnapshot> {
    let snapshot = CorpusBuilder::in_memory(Arc::new(HashEmbedder::new(1024)))
        .build(CorpusVersion(1), chunks)
        .await
        .unwrap();
    Arc::new(snapshot)
}

/// Router with a fixed decision
pub struct StaticRouter(bool);

impl StaticRouter {
    pub fn in_scope() -> Self {
        Self(true)
    }

    pub fn out_of_scope() -> Self {
        Self(false)
    }
}

#[async_trait]
impl Agent for StaticRouter {
    type Input = RouteRequest;
    type Output = RouteOutcome;

    fn name(&self) -> &'static str {
        "static_router"
    }

    async fn run(&self, _request: RouteRequest) -> RouteOutcome {
        if self.0 {
            RouteOutcome::in_scope(1.0)
        } else {
            RouteOutcome::out_of_scope(0.0, "not about the documents")
        }
    }
}

/// Researcher citing the top evidence chunk
pub struct CitingResearcher;

fn cite_top(request: ResearchRequest) -> ResearchOutput {
    let answer = match request.evidence.chunks().first() {
        Some(top) => {
            let mut citations = BTreeSet::new();
            citations.insert(top.chunk.id.clone());
            Answer::new(
                format!("{} [[chunk:{}]].", top.chunk.text.trim_end_matches('.'), top.chunk.id),
                citations,
                request.attempt,
            )
        }
        None => Answer::hedged(crate::research::NO_ANSWER, request.attempt),
    };
    ResearchOutput {
        answer,
        evidence: request.evidence,
        sub_queries: Vec::new(),
    }
}

#[async_trait]
impl Agent for CitingResearcher {
    type Input = ResearchRequest;
    type Output = Result<ResearchOutput, AgentError>;

    fn name(&self) -> &'static str {
        "citing_researcher"
    }

    async fn run(&self, request: ResearchRequest) -> Result<ResearchOutput, AgentError> {
        Ok(cite_top(request))
    }
}

/// Researcher that blocks until released
pub struct GatedResearcher {
    pub started: Notify,
    pub release: Notify,
}

impl GatedResearcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            started: Notify::new(),
            release: Notify::new(),
        })
    }
}

#[async_trait]
impl Agent for GatedResearcher {
    type Input = ResearchRequest;
    type Output = Result<ResearchOutput, AgentError>;

    fn name(&self) -> &'static str {
        "gated_researcher"
    }

    async fn run(&self, request: ResearchRequest) -> Result<ResearchOutput, AgentError> {
        self.started.notify_one();
        self.release.notified().await;
        Ok(cite_top(request))
    }
}

/// Verifier with a fixed verdict
pub struct FixedVerifier(bool);

impl FixedVerifier {
    pub fn supported() -> Self {
        Self(true)
    }

    pub fn unsupported() -> Self {
        Self(false)
    }
}

#[async_trait]
impl Agent for FixedVerifier {
    type Input = VerificationRequest;
    type Output = VerificationVerdict;

    fn name(&self) -> &'static str {
        "fixed_verifier"
    }

    async fn run(&self, request: VerificationRequest) -> VerificationVerdict {
        if self.0 {
            VerificationVerdict::pass(1.0)
        } else {
            VerificationVerdict::fail(vec![request.answer.text], 0.0)
        }
    }
}

/// Researcher whose inference always fails
pub struct FailingResearcher;

#[async_trait]
impl Agent for FailingResearcher {
    type Input = ResearchRequest;
    type Output = Result<ResearchOutput, AgentError>;

    fn name(&self) -> &'static str {
        "failing_researcher"
    }

    async fn run(&self, _request: ResearchRequest) -> Result<ResearchOutput, AgentError> {
        Err(LlmError::Timeout.into())
    }
}
