//! Error types for agentlab
//!
//! Centralized error handling using thiserror. Execution-class failures are
//! never surfaced through this enum; they are sealed into
//! [`crate::domain::ExecutionOutcome`] records and consumed by the
//! refinement loop.

use thiserror::Error;

/// All error types that can terminate or degrade a run
#[derive(Debug, Error)]
pub enum AgentLabError {
    /// Invalid configuration detected before any iteration ran
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The human rejected the plan more times than the configured cap
    #[error("Plan approval exhausted after {attempts} rejections")]
    PlanApprovalExhausted { attempts: u32 },

    /// An approval gate timed out waiting for human input
    #[error("Approval timed out after {seconds}s")]
    ApprovalTimeout { seconds: u64 },

    /// Source collection or drafting failed; degrades the iteration only
    #[error("Collection failure: {0}")]
    Collection(String),

    /// Model backend failure that survived the retry budget
    #[error("Backend error: {0}")]
    Backend(String),

    /// Message channel failure (mailbox closed, reply dropped)
    #[error("Channel error: {0}")]
    Channel(String),

    /// Artifact store failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid state transition or sealed-record mutation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML configuration parse error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl AgentLabError {
    /// Returns true if this error must terminate the whole run.
    ///
    /// Everything else is consumed by the refinement loop: collection
    /// failures degrade one iteration, execution failures become sealed
    /// outcomes routed to the Reviewer and Critic.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AgentLabError::Configuration(_)
                | AgentLabError::PlanApprovalExhausted { .. }
                | AgentLabError::ApprovalTimeout { .. }
        )
    }
}

/// Result type alias for agentlab operations
pub type Result<T> = std::result::Result<T, AgentLabError>;
