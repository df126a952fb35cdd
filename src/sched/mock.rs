//! Scripted scheduler for tests
//!
//! Replays a fixed sequence of status reports and records every call, so
//! lifecycle tests can drive the state machine through arbitrary histories
//! without a real cluster.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;

use crate::sched::{BatchScheduler, SchedulerError, SchedulerStatus};

/// Scheduler double with scripted responses
pub struct MockScheduler {
    submit_result: Mutex<Option<Result<String, String>>>,
    statuses: Mutex<VecDeque<SchedulerStatus>>,
    /// Status reported once the script runs out
    final_status: Mutex<SchedulerStatus>,
    exit_code: Mutex<Option<i32>>,
    status_calls: AtomicU32,
    cancel_calls: AtomicU32,
    /// When set, cancel never returns within any reasonable timeout
    hang_on_cancel: bool,
}

impl MockScheduler {
    /// Scheduler that accepts the submission and replays `statuses`, then
    /// keeps reporting `final_status`
    pub fn new(job_id: &str, statuses: Vec<SchedulerStatus>, final_status: SchedulerStatus) -> Self {
        Self {
            submit_result: Mutex::new(Some(Ok(job_id.to_string()))),
            statuses: Mutex::new(statuses.into()),
            final_status: Mutex::new(final_status),
            exit_code: Mutex::new(None),
            status_calls: AtomicU32::new(0),
            cancel_calls: AtomicU32::new(0),
            hang_on_cancel: false,
        }
    }

    /// Scheduler that rejects the submission outright
    pub fn rejecting(reason: &str) -> Self {
        let mut mock = Self::new("unused", vec![], SchedulerStatus::Absent);
        *mock.submit_result.get_mut().unwrap() = Some(Err(reason.to_string()));
        mock
    }

    /// Set the exit code reported after the job leaves the queue
    pub fn with_exit_code(self, code: i32) -> Self {
        *self.exit_code.lock().unwrap() = Some(code);
        self
    }

    /// Make cancellation hang forever (unresponsive scheduler)
    pub fn with_hanging_cancel(mut self) -> Self {
        self.hang_on_cancel = true;
        self
    }

    pub fn status_calls(&self) -> u32 {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn cancel_calls(&self) -> u32 {
        self.cancel_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BatchScheduler for MockScheduler {
    async fn submit(&self, _script_path: &Path, _workdir: &Path) -> Result<String, SchedulerError> {
        match self.submit_result.lock().unwrap().take() {
            Some(Ok(job_id)) => Ok(job_id),
            Some(Err(reason)) => Err(SchedulerError::Submit(reason)),
            None => Err(SchedulerError::Submit("already submitted".into())),
        }
    }

    async fn status(&self, _job_id: &str) -> Result<SchedulerStatus, SchedulerError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.statuses.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| self.final_status.lock().unwrap().clone()))
    }

    async fn cancel(&self, _job_id: &str) -> Result<(), SchedulerError> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        if self.hang_on_cancel {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn exit_status(&self, _job_id: &str) -> Result<Option<i32>, SchedulerError> {
        Ok(*self.exit_code.lock().unwrap())
    }
}
