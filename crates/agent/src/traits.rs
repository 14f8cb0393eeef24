//! Agent capability interface
//!
//! Router, research, and verification roles all implement [`Agent`]. The
//! orchestrator holds them as trait objects, so a role can be swapped for a
//! different implementation (or a test double) without touching the loop.
//!
//! Failure handling is part of each role's `Output`: the router fails
//! closed inside its [`RouteOutcome`], the verifier folds failures into its
//! verdict, and only research reports an error for the orchestrator to
//! retry.
//!
//! # Example
//!
//! ```ignore
//! struct AlwaysInScope;
//!
//! #[async_trait]
//! impl Agent for AlwaysInScope {
//!     type Input = RouteRequest;
//!     type Output = RouteOutcome;
//!
//!     fn name(&self) -> &'static str {
//!         "always_in_scope"
//!     }
//!
//!     async fn run(&self, _input: RouteRequest) -> RouteOutcome {
//!         RouteOutcome::in_scope(1.0)
//!     }
//! }
//! ```

use async_trait::async_trait;
use std::sync::Arc;

use docchat_core::{RouteOutcome, VerificationVerdict};

use crate::research::{ResearchOutput, ResearchRequest};
use crate::router::RouteRequest;
use crate::verification::VerificationRequest;
use crate::AgentError;

/// A single orchestration role
#[async_trait]
pub trait Agent: Send + Sync {
    type Input: Send + 'static;
    type Output: Send + 'static;

    /// Stable role name for logs
    fn name(&self) -> &'static str;

    async fn run(&self, input: Self::Input) -> Self::Output;
}

/// Router role
pub type DynRouter = Arc<dyn Agent<Input = RouteRequest, Output = RouteOutcome>>;

/// Research role
pub type DynResearcher =
    Arc<dyn Agent<Input = ResearchRequest, Output = Result<ResearchOutput, AgentError>>>;

/// Verification role
pub type DynVerifier = Arc<dyn Agent<Input = VerificationRequest, Output = VerificationVerdict>>;
