//! Collaborator agents and the shared action contract
//!
//! The workflow is a closed set of eight roles, each implementing one
//! dispatch interface: [`Agent::handle`] over typed [`ActionRequest`]s. The
//! orchestrator depends only on this interface, never on concrete role
//! identity. Role-local state (plan revision, current draft, execution
//! counters) lives inside each agent struct and is visible to nobody else.

mod aggregator;
mod code_writer;
mod critic;
mod drafting;
mod local_executor;
mod planner;
mod remote_executor;
mod reviewer;

pub use aggregator::SourceAggregatorAgent;
pub use code_writer::CodeWriterAgent;
pub use critic::CriticAgent;
pub use drafting::DraftingAgent;
pub use local_executor::LocalExecutorAgent;
pub use planner::PlannerAgent;
pub use remote_executor::RemoteExecutorAgent;
pub use reviewer::ReviewerAgent;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::backend::BackendError;
use crate::domain::{
    CodeArtifact, CritiqueSummary, Draft, ExecutionOutcome, Plan, ReviewVerdict, RunMode,
    SourceDigest, SourceInput,
};
use crate::error::AgentLabError;

/// The closed set of collaborator roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentRole {
    Planner,
    SourceAggregator,
    Drafting,
    CodeWriter,
    LocalExecutor,
    RemoteExecutor,
    Reviewer,
    Critic,
}

impl AgentRole {
    /// Stable identity string used for addressing and conversation records
    pub fn name(&self) -> &'static str {
        match self {
            AgentRole::Planner => "planner",
            AgentRole::SourceAggregator => "source-aggregator",
            AgentRole::Drafting => "drafting",
            AgentRole::CodeWriter => "code-writer",
            AgentRole::LocalExecutor => "local-executor",
            AgentRole::RemoteExecutor => "remote-executor",
            AgentRole::Reviewer => "reviewer",
            AgentRole::Critic => "critic",
        }
    }
}

/// Typed request dispatched to an agent
#[derive(Debug, Clone)]
pub enum ActionRequest {
    /// Planner: produce the initial plan or a revision
    CreatePlan {
        topic: String,
        digest: String,
        mode: RunMode,
        /// Free-text guidance from a human plan rejection
        guidance: Option<String>,
        /// Critic feedback carried from the previous iteration
        feedback: Option<String>,
    },

    /// SourceAggregator: collect inputs into a digest
    GatherSources {
        topic: String,
        inputs: Vec<SourceInput>,
    },

    /// Drafting: produce the first draft for an iteration
    DraftDocument {
        topic: String,
        plan_text: String,
        digest: String,
        iteration: u32,
    },

    /// Drafting: improve the previous draft from critic feedback
    ImproveDraft {
        draft: Draft,
        feedback: String,
        iteration: u32,
    },

    /// CodeWriter: produce the coding plan shown at the second gate
    CreateCodingPlan {
        topic: String,
        plan_text: String,
        digest: String,
    },

    /// CodeWriter: revise the coding plan from gate feedback
    ImproveCodingPlan {
        coding_plan: String,
        feedback: String,
    },

    /// CodeWriter: produce the runnable artifact
    WriteCode {
        topic: String,
        plan_text: String,
        coding_plan: String,
        digest: String,
        iteration: u32,
    },

    /// CodeWriter: improve the artifact from critic feedback
    ImproveCode {
        artifact: CodeArtifact,
        feedback: String,
        iteration: u32,
    },

    /// LocalExecutor / RemoteExecutor: run one attempt
    Execute {
        artifact: CodeArtifact,
        iteration: u32,
        attempt: u32,
    },

    /// Reviewer: inspect a failed execution
    ReviewFailure {
        artifact: CodeArtifact,
        outcome: ExecutionOutcome,
    },

    /// Critic: critique the whole iteration
    Critique {
        plan_text: String,
        draft: Option<Draft>,
        artifact: Option<CodeArtifact>,
        outcome: Option<ExecutionOutcome>,
        digest: String,
    },
}

impl ActionRequest {
    /// Short verb used in logs and conversation records
    pub fn verb(&self) -> &'static str {
        match self {
            ActionRequest::CreatePlan { .. } => "create-plan",
            ActionRequest::GatherSources { .. } => "gather-sources",
            ActionRequest::DraftDocument { .. } => "draft-document",
            ActionRequest::ImproveDraft { .. } => "improve-draft",
            ActionRequest::CreateCodingPlan { .. } => "create-coding-plan",
            ActionRequest::ImproveCodingPlan { .. } => "improve-coding-plan",
            ActionRequest::WriteCode { .. } => "write-code",
            ActionRequest::ImproveCode { .. } => "improve-code",
            ActionRequest::Execute { .. } => "execute",
            ActionRequest::ReviewFailure { .. } => "review-failure",
            ActionRequest::Critique { .. } => "critique",
        }
    }
}

/// Typed response returned by an agent
#[derive(Debug, Clone)]
pub enum ActionResponse {
    Plan(Plan),
    Digest(SourceDigest),
    Draft(Draft),
    CodingPlan(String),
    Code(CodeArtifact),
    Outcome(ExecutionOutcome),
    Review(ReviewVerdict),
    Critique(CritiqueSummary),
}

/// Agent-internal failures, classified for the orchestrator's retry loop
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// Backend unavailable or similar; the orchestrator may retry the call
    #[error("transient failure: {0}")]
    Transient(String),

    /// Unrecoverable for this call; retrying is pointless
    #[error("fatal failure: {0}")]
    Fatal(String),

    /// The role does not implement the requested action
    #[error("{role}: unsupported action {verb}")]
    Unsupported { role: &'static str, verb: &'static str },
}

impl AgentError {
    pub fn is_transient(&self) -> bool {
        matches!(self, AgentError::Transient(_))
    }

    /// Build the standard rejection for a request outside a role's contract
    pub fn unsupported(role: AgentRole, request: &ActionRequest) -> Self {
        AgentError::Unsupported {
            role: role.name(),
            verb: request.verb(),
        }
    }
}

impl From<BackendError> for AgentError {
    fn from(err: BackendError) -> Self {
        if err.is_retryable() {
            AgentError::Transient(err.to_string())
        } else {
            AgentError::Fatal(err.to_string())
        }
    }
}

impl From<AgentError> for AgentLabError {
    fn from(err: AgentError) -> Self {
        AgentLabError::Backend(err.to_string())
    }
}

/// Result alias for agent actions
pub type AgentResult = std::result::Result<ActionResponse, AgentError>;

/// The shared contract every collaborator implements.
///
/// Actions must be safe to re-invoke with the same logical input: the
/// orchestrator retries transient failures, and artifact writes are
/// revision-stamped so a repeat never corrupts the store.
#[async_trait]
pub trait Agent: Send {
    fn role(&self) -> AgentRole;

    async fn handle(&mut self, request: ActionRequest) -> AgentResult;
}
