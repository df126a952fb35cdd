//! Run record and related types
//!
//! A Run is one end-to-end invocation of the workflow for a given topic and
//! configuration. It is created at start and immutable afterwards except for
//! its status.

use crate::id::{generate_run_id, now_ms};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which halves of the workflow a run exercises
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    ResearchOnly,
    CodeOnly,
    Both,
}

impl RunMode {
    /// Returns true if the run drafts a research document
    pub fn includes_research(&self) -> bool {
        matches!(self, RunMode::ResearchOnly | RunMode::Both)
    }

    /// Returns true if the run writes and executes code
    pub fn includes_code(&self) -> bool {
        matches!(self, RunMode::CodeOnly | RunMode::Both)
    }
}

/// Status of a run's execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Created, no iteration started yet
    Created,
    /// Actively iterating
    Running,
    /// Terminal success recorded and critic agreed to stop
    Succeeded,
    /// Attempt budget exhausted without success, or fatal error
    Failed,
    /// Human or cancellation signal stopped the run
    Stopped,
}

impl RunStatus {
    /// Returns true if the run is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Succeeded | RunStatus::Failed | RunStatus::Stopped
        )
    }
}

/// One end-to-end invocation of the workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    /// Unique identifier (timestamp + random suffix: "1738300800123-a1b2")
    pub id: String,

    /// The research/coding topic the human supplied
    pub topic: String,

    /// Which halves of the workflow to exercise
    pub mode: RunMode,

    /// Whether execution is delegated to the batch cluster
    pub remote: bool,

    /// Total execution attempts available across all iterations
    pub attempt_budget: u32,

    /// Current status
    pub status: RunStatus,

    pub created_at: u64,
}

impl Run {
    /// Create a new run in the Created state
    pub fn new(topic: impl Into<String>, mode: RunMode, remote: bool, attempt_budget: u32) -> Self {
        Self {
            id: generate_run_id(),
            topic: topic.into(),
            mode,
            remote,
            attempt_budget,
            status: RunStatus::Created,
            created_at: now_ms(),
        }
    }
}

/// Final report handed back to the caller when a run terminates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: String,
    pub status: RunStatus,
    /// Sequence number of the last iteration that was sealed (0 if none)
    pub iterations_completed: u32,
    /// Execution attempts consumed across the whole run
    pub attempts_used: u32,
    /// Root directory holding every persisted artifact for this run
    pub artifact_root: PathBuf,
    /// Total tokens reported by the model backend across all agent calls
    pub tokens_used: u64,
}

impl RunResult {
    /// Returns true if the run terminated successfully
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }
}
