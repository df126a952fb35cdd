//! Batch scheduler interface and job lifecycle management
//!
//! The remote execution path talks to an external batch scheduler through
//! the narrow [`BatchScheduler`] trait: submit a script, poll a status,
//! cancel. The [`lifecycle::JobLifecycleManager`] drives one job through its
//! monotone state machine on top of that trait.

mod lifecycle;
mod mock;
mod pbs;
mod script;

pub use lifecycle::{JobLifecycleManager, JobRunContext};
pub use mock::MockScheduler;
pub use pbs::PbsScheduler;
pub use script::{ScriptContext, render_job_script};

use async_trait::async_trait;
use std::path::Path;

/// Scheduler-reported status of a submitted job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerStatus {
    /// Waiting in a queue
    Queued,
    /// Executing on a node
    Running,
    /// No longer known to the scheduler (finished or evicted)
    Absent,
    /// Anything outside the known vocabulary; treated conservatively as
    /// queued, never as terminal
    Other(String),
}

/// Errors from scheduler command invocations
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// The submission itself was rejected
    #[error("submit failed: {0}")]
    Submit(String),

    /// A status/cancel command could not run or returned garbage
    #[error("scheduler command failed: {0}")]
    Command(String),
}

/// Narrow seam to the external batch-compute scheduler
#[async_trait]
pub trait BatchScheduler: Send + Sync {
    /// Submit a job script; returns the scheduler-assigned job id
    async fn submit(&self, script_path: &Path, workdir: &Path) -> Result<String, SchedulerError>;

    /// Report the job's current status
    async fn status(&self, job_id: &str) -> Result<SchedulerStatus, SchedulerError>;

    /// Best-effort cancellation
    async fn cancel(&self, job_id: &str) -> Result<(), SchedulerError>;

    /// Terminal exit code, when the scheduler exposes one
    async fn exit_status(&self, _job_id: &str) -> Result<Option<i32>, SchedulerError> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_equality() {
        assert_eq!(SchedulerStatus::Queued, SchedulerStatus::Queued);
        assert_ne!(SchedulerStatus::Queued, SchedulerStatus::Running);
        assert_eq!(
            SchedulerStatus::Other("H".into()),
            SchedulerStatus::Other("H".into())
        );
    }

    #[test]
    fn test_scheduler_error_display() {
        let err = SchedulerError::Submit("qsub: malformed directive".into());
        assert_eq!(err.to_string(), "submit failed: qsub: malformed directive");
    }
}
