//! Execution outcomes
//!
//! One ExecutionOutcome is produced per execution attempt, local or remote,
//! and is immutable once recorded. Failures never propagate as errors; they
//! are sealed here and routed to the Reviewer and Critic.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound on the diagnosis text attached to a failed outcome
pub const REASONING_CAP: usize = 4000;

/// Terminal classification of one execution attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutcomeKind {
    Success,
    RuntimeFailure,
    Timeout,
    MissingDependency,
    QueueFailure,
    MissingOutput,
    Cancelled,
}

impl OutcomeKind {
    /// Returns true for any non-success classification
    pub fn is_failure(&self) -> bool {
        !matches!(self, OutcomeKind::Success)
    }
}

/// The sealed result of one execution attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub kind: OutcomeKind,

    /// Captured standard output
    pub stdout: String,

    /// Captured standard error
    pub stderr: String,

    /// Structured failure reasoning produced by diagnosis, capped length
    pub reasoning: Option<String>,

    /// Wall-clock duration of the attempt
    pub duration: Duration,

    /// Packages installed by the missing-dependency remediation, if any
    pub packages_installed: Vec<String>,

    /// Scheduler job identifier, remote attempts only
    pub job_id: Option<String>,
}

impl ExecutionOutcome {
    /// Build a success outcome from captured streams
    pub fn success(stdout: impl Into<String>, stderr: impl Into<String>, duration: Duration) -> Self {
        Self {
            kind: OutcomeKind::Success,
            stdout: stdout.into(),
            stderr: stderr.into(),
            reasoning: None,
            duration,
            packages_installed: Vec::new(),
            job_id: None,
        }
    }

    /// Build a failure outcome of the given kind
    pub fn failure(
        kind: OutcomeKind,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            kind,
            stdout: stdout.into(),
            stderr: stderr.into(),
            reasoning: None,
            duration,
            packages_installed: Vec::new(),
            job_id: None,
        }
    }

    /// Attach diagnosis text, truncated to [`REASONING_CAP`]
    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        let mut text: String = reasoning.into();
        if text.len() > REASONING_CAP {
            let mut cut = REASONING_CAP;
            while cut > 0 && !text.is_char_boundary(cut) {
                cut -= 1;
            }
            text.truncate(cut);
        }
        self.reasoning = Some(text);
        self
    }

    /// Record the packages the remediation step installed
    pub fn with_packages(mut self, packages: Vec<String>) -> Self {
        self.packages_installed = packages;
        self
    }

    /// Record the scheduler job id this outcome came from
    pub fn with_job_id(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }

    /// Returns true if this attempt succeeded
    pub fn is_success(&self) -> bool {
        self.kind == OutcomeKind::Success
    }

    /// Render a transcript of this outcome for Reviewer/Critic prompts
    pub fn transcript(&self) -> String {
        format!(
            "SUCCESS: {}\nSTDOUT:\n{}\n\nSTDERR:\n{}\n\nPACKAGES_INSTALLED: {:?}\n",
            self.is_success(),
            self.stdout,
            self.stderr,
            self.packages_installed,
        )
    }
}
