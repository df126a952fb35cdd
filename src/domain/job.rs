//! Remote job records and the job lifecycle state machine
//!
//! One JobRecord exists per remote execution attempt. Its state only ever
//! moves forward through Drafted → Submitted → Queued → Running →
//! {Completed | Failed | Cancelled}; a backward transition is a bug and is
//! rejected at the type level by [`JobRecord::advance`].

use crate::error::{AgentLabError, Result};
use crate::id::now_ms;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a remote batch job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Submission script synthesized, not yet handed to the scheduler
    Drafted,
    /// Scheduler accepted the submission and assigned a job id
    Submitted,
    /// Scheduler reports the job waiting in a queue
    Queued,
    /// Scheduler reports the job executing
    Running,
    /// Job left the queue with a zero exit status
    Completed,
    /// Job left the queue unsuccessfully, or submission/polling gave up
    Failed,
    /// External stop request sealed the job before completion
    Cancelled,
}

impl JobState {
    /// Monotone position in the lifecycle; terminal states share the top rank
    fn rank(self) -> u8 {
        match self {
            JobState::Drafted => 0,
            JobState::Submitted => 1,
            JobState::Queued => 2,
            JobState::Running => 3,
            JobState::Completed | JobState::Failed | JobState::Cancelled => 4,
        }
    }

    /// Returns true once the job can no longer change state
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }
}

/// Record of one remote execution attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    /// Identifier issued by the scheduler; None until Submitted
    pub job_id: Option<String>,

    /// Submission script content handed to the scheduler
    pub script: String,

    /// Current lifecycle state
    pub state: JobState,

    /// Number of status polls performed so far
    pub poll_count: u32,

    /// Timestamp of the most recent poll (ms since epoch)
    pub last_poll_at: Option<u64>,

    /// Exit code reported by the scheduler, when available
    pub exit_code: Option<i32>,
}

impl JobRecord {
    /// Create a new record in the Drafted state
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            job_id: None,
            script: script.into(),
            state: JobState::Drafted,
            poll_count: 0,
            last_poll_at: None,
            exit_code: None,
        }
    }

    /// Move the lifecycle forward.
    ///
    /// Re-asserting the current state is a no-op so poll loops can report
    /// the same scheduler status repeatedly. Any transition that would move
    /// backward, or out of a terminal state, is rejected.
    pub fn advance(&mut self, next: JobState) -> Result<()> {
        if next == self.state {
            return Ok(());
        }
        if self.state.is_terminal() {
            return Err(AgentLabError::InvalidState(format!(
                "job already terminal in {:?}, cannot move to {:?}",
                self.state, next
            )));
        }
        if next.rank() <= self.state.rank() {
            return Err(AgentLabError::InvalidState(format!(
                "job lifecycle cannot move backward from {:?} to {:?}",
                self.state, next
            )));
        }
        self.state = next;
        Ok(())
    }

    /// Record the scheduler-assigned id and move to Submitted
    pub fn submitted(&mut self, job_id: impl Into<String>) -> Result<()> {
        self.job_id = Some(job_id.into());
        self.advance(JobState::Submitted)
    }

    /// Record one poll of the scheduler
    pub fn note_poll(&mut self) {
        self.poll_count += 1;
        self.last_poll_at = Some(now_ms());
    }
}
