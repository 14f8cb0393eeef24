//! Verification agent
//!
//! Splits a draft into sentence claims and checks each one against the
//! chunks it cites. Cheap structural checks (no citation, unknown chunk)
//! run first; the remaining claims go to the model in a single call.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;

use docchat_core::{Answer, RetrievalResult, VerificationVerdict};
use docchat_llm::{parse_json_object, truncate_text, InferenceClient, InferenceOptions, Prompt};

use crate::citation::{split_claims, Claim};
use crate::traits::Agent;
use crate::AgentError;

/// System prompt of the claim-checking call
pub const SYSTEM_PROMPT: &str = "You check whether claims are supported by the passages they cite. \
A claim is supported only when the cited passages state it or it follows from them directly, without \
outside knowledge. Judge every claim. Reply with JSON only: \
{\"claims\": [{\"index\": <claim number>, \"supported\": true or false, \"reason\": \"<short reason>\"}]}";

const MAX_CHUNK_CHARS: usize = 1500;

/// Draft to check and the evidence it was written from
#[derive(Debug, Clone)]
pub struct VerificationRequest {
    pub answer: Answer,
    pub evidence: RetrievalResult,
}

#[derive(Debug, Deserialize)]
struct Judgements {
    claims: Vec<ClaimJudgement>,
}

#[derive(Debug, Deserialize)]
struct ClaimJudgement {
    index: usize,
    supported: bool,
    #[serde(default)]
    reason: String,
}

enum Check {
    Passed,
    Failed,
    /// Awaiting the model; holds the 1-based index sent in the prompt
    Pending(usize),
}

/// Claim-by-claim support checker
pub struct VerificationAgent {
    llm: InferenceClient,
}

impl VerificationAgent {
    pub fn new(llm: InferenceClient) -> Self {
        Self { llm }
    }

    fn structural_check(claim: &Claim, evidence: &RetrievalResult) -> Option<bool> {
        if !claim.is_cited() {
            // Uncited sentences may only decline to answer
            return Some(claim.is_hedge());
        }
        if claim.citations.iter().any(|id| !evidence.contains(id)) {
            return Some(false);
        }
        None
    }

    fn checking_prompt(pending: &[&Claim], evidence: &RetrievalResult) -> Prompt {
        let mut user = String::new();
        for (n, claim) in pending.iter().enumerate() {
            user.push_str(&format!("Claim {}: {}\nCited passages:\n", n + 1, claim.text));
            for id in &claim.citations {
                if let Some(chunk) = evidence.get(id) {
                    user.push_str(&format!(
                        "[chunk:{}] {}\n",
                        id,
                        truncate_text(&chunk.text, MAX_CHUNK_CHARS)
                    ));
                }
            }
            user.push('\n');
        }
        Prompt::new(user.trim_end().to_string()).with_system(SYSTEM_PROMPT)
    }

    async fn judge(
        &self,
        pending: &[&Claim],
        evidence: &RetrievalResult,
    ) -> Result<HashMap<usize, bool>, AgentError> {
        let prompt = Self::checking_prompt(pending, evidence);
        let reply = self.llm.infer(&prompt, &InferenceOptions::json()).await?;
        let judgements: Judgements = parse_json_object(&reply)?;

        let mut verdicts = HashMap::new();
        for judgement in judgements.claims {
            if !judgement.supported {
                tracing::debug!(claim = judgement.index, reason = %judgement.reason, "Claim not supported");
            }
            verdicts.entry(judgement.index).or_insert(judgement.supported);
        }
        Ok(verdicts)
    }
}

#[async_trait]
impl Agent for VerificationAgent {
    type Input = VerificationRequest;
    type Output = VerificationVerdict;

    fn name(&self) -> &'static str {
        "verification"
    }

    async fn run(&self, request: VerificationRequest) -> VerificationVerdict {
        let VerificationRequest { answer, evidence } = request;
        let claims = split_claims(&answer.text);

        if claims.is_empty() {
            return VerificationVerdict::no_claims();
        }

        if answer.citations.is_empty() {
            return VerificationVerdict::fail(claims.into_iter().map(|c| c.text).collect(), 0.0);
        }

        let mut checks = Vec::with_capacity(claims.len());
        let mut pending: Vec<&Claim> = Vec::new();
        for claim in &claims {
            match Self::structural_check(claim, &evidence) {
                Some(true) => checks.push(Check::Passed),
                Some(false) => checks.push(Check::Failed),
                None => {
                    pending.push(claim);
                    checks.push(Check::Pending(pending.len()));
                }
            }
        }

        let judged = if pending.is_empty() {
            HashMap::new()
        } else {
            match self.judge(&pending, &evidence).await {
                Ok(judged) => judged,
                Err(e) => {
                    tracing::warn!(error = %e, "Verification call failed");
                    return VerificationVerdict::failure(e);
                }
            }
        };

        let mut unsupported = Vec::new();
        for (claim, check) in claims.iter().zip(&checks) {
            let passed = match check {
                Check::Passed => true,
                Check::Failed => false,
                Check::Pending(index) => judged.get(index).copied().unwrap_or(false),
            };
            if !passed {
                unsupported.push(claim.text.clone());
            }
        }

        let total = claims.len();
        let confidence = (total - unsupported.len()) as f32 / total as f32;

        tracing::info!(
            draft = answer.draft_iteration,
            claims = total,
            unsupported = unsupported.len(),
            confidence,
            "Verified draft"
        );

        if unsupported.is_empty() {
            VerificationVerdict::pass(confidence)
        } else {
            VerificationVerdict::fail(unsupported, confidence)
        }
    }
}
