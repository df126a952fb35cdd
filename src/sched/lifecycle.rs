//! Job lifecycle management
//!
//! Drives one remote execution attempt through the monotone state machine
//! Drafted → Submitted → Queued → Running → {Completed | Failed | Cancelled}.
//! Polling is bounded by both a check count and a wall-clock duration so the
//! orchestrator can never block forever on a single attempt; cancellation is
//! bounded by a fixed grace timeout regardless of scheduler responsiveness.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::config::ClusterConfig;
use crate::domain::{ExecutionOutcome, JobRecord, JobState, OutcomeKind};
use crate::sched::{BatchScheduler, SchedulerStatus};

/// Tail kept from each log stream
const LOG_TAIL_CHARS: usize = 20_000;

/// Paths and content for one attempt's submission
#[derive(Debug, Clone)]
pub struct JobRunContext<'a> {
    pub script: &'a str,
    pub script_path: &'a Path,
    pub workdir: &'a Path,
    pub stdout_path: &'a Path,
    pub stderr_path: &'a Path,
}

/// Drives one JobRecord from draft to a terminal state
pub struct JobLifecycleManager {
    scheduler: Arc<dyn BatchScheduler>,
    config: ClusterConfig,
    cancel: watch::Receiver<bool>,
}

impl JobLifecycleManager {
    pub fn new(
        scheduler: Arc<dyn BatchScheduler>,
        config: ClusterConfig,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            scheduler,
            config,
            cancel,
        }
    }

    /// Run one attempt to a sealed record and outcome.
    ///
    /// Diagnosis of failures is the caller's concern; the outcome returned
    /// here carries the raw streams and classification only.
    pub async fn run(&mut self, ctx: &JobRunContext<'_>) -> (JobRecord, ExecutionOutcome) {
        let started = Instant::now();
        let mut record = JobRecord::new(ctx.script);

        if self.is_cancelled() {
            return self.seal_cancelled(record, started).await;
        }

        let job_id = match self.scheduler.submit(ctx.script_path, ctx.workdir).await {
            Ok(job_id) => job_id,
            Err(err) => {
                log::warn!("submission rejected: {}", err);
                let _ = record.advance(JobState::Failed);
                let outcome = ExecutionOutcome::failure(
                    OutcomeKind::QueueFailure,
                    "",
                    err.to_string(),
                    started.elapsed(),
                );
                return (record, outcome);
            }
        };
        if let Err(err) = record.submitted(&job_id) {
            log::warn!("{}", err);
        }
        log::info!("submitted job {}", job_id);

        let left_queue = self.poll_until_gone(&mut record, &job_id, started).await;
        if self.is_cancelled() {
            return self.seal_cancelled(record, started).await;
        }

        if !left_queue {
            // Bounded termination: give up on this attempt, whatever the
            // scheduler still claims
            log::warn!(
                "job {} still listed after {} polls, forcing timeout",
                job_id,
                record.poll_count
            );
            let _ = record.advance(JobState::Failed);
            let outcome = ExecutionOutcome::failure(
                OutcomeKind::Timeout,
                "",
                format!("monitoring window ended with job {} still in the queue", job_id),
                started.elapsed(),
            )
            .with_job_id(&job_id);
            return (record, outcome);
        }

        self.seal_from_logs(record, &job_id, ctx, started).await
    }

    fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Poll until the job leaves the queue or a bound trips. Returns true if
    /// the job left the queue.
    async fn poll_until_gone(
        &mut self,
        record: &mut JobRecord,
        job_id: &str,
        started: Instant,
    ) -> bool {
        let poll_interval = Duration::from_secs(self.config.poll_interval_secs.max(1));
        let max_duration = Duration::from_secs(self.config.status_max_duration_secs);

        while record.poll_count < self.config.status_max_checks && started.elapsed() < max_duration
        {
            if self.is_cancelled() {
                return false;
            }
            record.note_poll();

            match self.scheduler.status(job_id).await {
                Ok(SchedulerStatus::Queued) => observe(record, JobState::Queued),
                Ok(SchedulerStatus::Running) => observe(record, JobState::Running),
                Ok(SchedulerStatus::Absent) => {
                    log::info!("job {} no longer listed by the scheduler", job_id);
                    return true;
                }
                Ok(SchedulerStatus::Other(status)) => {
                    log::warn!(
                        "unknown scheduler status '{}' for job {}, treating as queued",
                        status,
                        job_id
                    );
                    observe(record, JobState::Queued);
                }
                Err(err) => {
                    log::warn!("status poll failed for job {}: {}", job_id, err);
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(poll_interval) => {}
                _ = crate::cancel::cancelled(&mut self.cancel) => return false,
            }
        }
        false
    }

    /// The job left the queue: retrieve logs and classify the result
    async fn seal_from_logs(
        &self,
        mut record: JobRecord,
        job_id: &str,
        ctx: &JobRunContext<'_>,
        started: Instant,
    ) -> (JobRecord, ExecutionOutcome) {
        let logs = self.await_logs(ctx).await;
        let (stdout, stderr) = match logs {
            Some(streams) => streams,
            None => {
                let _ = record.advance(JobState::Failed);
                let outcome = ExecutionOutcome::failure(
                    OutcomeKind::MissingOutput,
                    "",
                    format!(
                        "no log files at {} after {}s grace",
                        ctx.stdout_path.display(),
                        self.config.log_grace_secs
                    ),
                    started.elapsed(),
                )
                .with_job_id(job_id);
                return (record, outcome);
            }
        };

        let exit_code = match self.scheduler.exit_status(job_id).await {
            Ok(code) => code,
            Err(err) => {
                log::warn!("could not fetch exit status for {}: {}", job_id, err);
                None
            }
        };
        record.exit_code = exit_code;

        let succeeded = match exit_code {
            Some(code) => code == 0,
            None => logs_suggest_success(&stdout, &stderr),
        };

        if succeeded {
            let _ = record.advance(JobState::Completed);
            let outcome =
                ExecutionOutcome::success(stdout, stderr, started.elapsed()).with_job_id(job_id);
            (record, outcome)
        } else {
            let _ = record.advance(JobState::Failed);
            let outcome = ExecutionOutcome::failure(
                OutcomeKind::RuntimeFailure,
                stdout,
                stderr,
                started.elapsed(),
            )
            .with_job_id(job_id);
            (record, outcome)
        }
    }

    /// Wait for both log files within the grace period
    async fn await_logs(&self, ctx: &JobRunContext<'_>) -> Option<(String, String)> {
        let deadline = Instant::now() + Duration::from_secs(self.config.log_grace_secs);
        loop {
            if ctx.stdout_path.exists() && ctx.stderr_path.exists() {
                return Some((tail_file(ctx.stdout_path), tail_file(ctx.stderr_path)));
            }
            if Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }

    /// Best-effort scheduler cancel, bounded by the grace timeout, then seal
    async fn seal_cancelled(
        &self,
        mut record: JobRecord,
        started: Instant,
    ) -> (JobRecord, ExecutionOutcome) {
        if let Some(job_id) = record.job_id.clone() {
            let grace = Duration::from_secs(self.config.cancel_grace_secs);
            match tokio::time::timeout(grace, self.scheduler.cancel(&job_id)).await {
                Ok(Ok(())) => log::info!("scheduler acknowledged cancel of {}", job_id),
                Ok(Err(err)) => log::warn!("cancel of {} failed: {}", job_id, err),
                Err(_) => log::warn!("cancel of {} unacknowledged after {:?}", job_id, grace),
            }
        }

        let _ = record.advance(JobState::Cancelled);
        let mut outcome =
            ExecutionOutcome::failure(OutcomeKind::Cancelled, "", "", started.elapsed());
        if let Some(job_id) = &record.job_id {
            outcome = outcome.with_job_id(job_id);
        }
        (record, outcome)
    }
}

/// Forward the record to a newly observed state, ignoring stale reports
fn observe(record: &mut JobRecord, state: JobState) {
    // A queued report after running is stale scheduler output
    if record.state == JobState::Running && state == JobState::Queued {
        return;
    }
    if let Err(err) = record.advance(state) {
        log::warn!("ignoring stale status report: {}", err);
    }
}

/// Heuristic verdict when the scheduler exposes no exit code
fn logs_suggest_success(stdout: &str, stderr: &str) -> bool {
    const FAILURE_TOKENS: [&str; 5] =
        ["error", "traceback", "exception", "fail", "segmentation fault"];

    if stdout.trim().is_empty() && stderr.trim().is_empty() {
        return false;
    }
    let combined = format!("{}\n{}", stdout, stderr).to_lowercase();
    !FAILURE_TOKENS.iter().any(|token| combined.contains(token))
}

/// Read a log file, keeping only the trailing portion of huge captures
fn tail_file(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(text) if text.len() > LOG_TAIL_CHARS => {
            let start = text.len() - LOG_TAIL_CHARS;
            // Stay on a char boundary
            let start = (start..text.len()).find(|i| text.is_char_boundary(*i)).unwrap_or(start);
            text[start..].to_string()
        }
        Ok(text) => text,
        Err(_) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sched::MockScheduler;
    use std::fs;
    use tempfile::TempDir;

    fn fast_cluster_config() -> ClusterConfig {
        ClusterConfig {
            poll_interval_secs: 1,
            status_max_checks: 5,
            status_max_duration_secs: 600,
            log_grace_secs: 1,
            cancel_grace_secs: 2,
            ..Default::default()
        }
    }

    struct Fixture {
        _temp: TempDir,
        script_path: std::path::PathBuf,
        workdir: std::path::PathBuf,
        stdout_path: std::path::PathBuf,
        stderr_path: std::path::PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let workdir = temp.path().to_path_buf();
            let script_path = workdir.join("attempt_01.sh");
            fs::write(&script_path, "#!/bin/bash\n").unwrap();
            Self {
                stdout_path: workdir.join("attempt_01.out"),
                stderr_path: workdir.join("attempt_01.err"),
                script_path,
                workdir,
                _temp: temp,
            }
        }

        fn ctx(&self) -> JobRunContext<'_> {
            JobRunContext {
                script: "#!/bin/bash\n",
                script_path: &self.script_path,
                workdir: &self.workdir,
                stdout_path: &self.stdout_path,
                stderr_path: &self.stderr_path,
            }
        }

        fn write_logs(&self, stdout: &str, stderr: &str) {
            fs::write(&self.stdout_path, stdout).unwrap();
            fs::write(&self.stderr_path, stderr).unwrap();
        }
    }

    fn manager(scheduler: MockScheduler) -> (JobLifecycleManager, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        let manager = JobLifecycleManager::new(Arc::new(scheduler), fast_cluster_config(), rx);
        (manager, tx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_happy_path_completes() {
        let fixture = Fixture::new();
        fixture.write_logs("result: 0.98\n", "");
        let scheduler = MockScheduler::new(
            "7.pbs",
            vec![SchedulerStatus::Queued, SchedulerStatus::Running],
            SchedulerStatus::Absent,
        )
        .with_exit_code(0);
        let (mut manager, _tx) = manager(scheduler);

        let (record, outcome) = manager.run(&fixture.ctx()).await;

        assert_eq!(record.state, JobState::Completed);
        assert_eq!(record.exit_code, Some(0));
        assert!(outcome.is_success());
        assert_eq!(outcome.job_id.as_deref(), Some("7.pbs"));
        assert!(outcome.stdout.contains("0.98"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_rejection_is_queue_failure() {
        let fixture = Fixture::new();
        let (mut manager, _tx) = manager(MockScheduler::rejecting("bad directive"));

        let (record, outcome) = manager.run(&fixture.ctx()).await;

        assert_eq!(record.state, JobState::Failed);
        assert!(record.job_id.is_none());
        assert_eq!(record.poll_count, 0);
        assert_eq!(outcome.kind, OutcomeKind::QueueFailure);
        assert!(outcome.stderr.contains("bad directive"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_budget_forces_timeout() {
        let fixture = Fixture::new();
        // Scheduler never reports a terminal status
        let scheduler = MockScheduler::new("9.pbs", vec![], SchedulerStatus::Queued);
        let (mut manager, _tx) = manager(scheduler);

        let (record, outcome) = manager.run(&fixture.ctx()).await;

        assert_eq!(record.state, JobState::Failed);
        assert_eq!(record.poll_count, 5);
        assert_eq!(outcome.kind, OutcomeKind::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_status_is_never_terminal() {
        let fixture = Fixture::new();
        let scheduler = MockScheduler::new(
            "9.pbs",
            vec![
                SchedulerStatus::Other("H".into()),
                SchedulerStatus::Other("SUSPENDED".into()),
            ],
            SchedulerStatus::Other("weird".into()),
        );
        let (mut manager, _tx) = manager(scheduler);

        let (record, outcome) = manager.run(&fixture.ctx()).await;

        // Unknown statuses kept the job in Queued until the poll budget
        // tripped; they never produced Completed
        assert_eq!(record.state, JobState::Failed);
        assert_eq!(outcome.kind, OutcomeKind::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_logs_after_grace() {
        let fixture = Fixture::new();
        // Job leaves the queue immediately but never writes logs
        let scheduler = MockScheduler::new("3.pbs", vec![], SchedulerStatus::Absent);
        let (mut manager, _tx) = manager(scheduler);

        let (record, outcome) = manager.run(&fixture.ctx()).await;

        assert_eq!(record.state, JobState::Failed);
        assert_eq!(outcome.kind, OutcomeKind::MissingOutput);
        assert!(outcome.stderr.contains("grace"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_nonzero_exit_is_runtime_failure() {
        let fixture = Fixture::new();
        fixture.write_logs("", "Traceback: ValueError\n");
        let scheduler =
            MockScheduler::new("4.pbs", vec![], SchedulerStatus::Absent).with_exit_code(1);
        let (mut manager, _tx) = manager(scheduler);

        let (record, outcome) = manager.run(&fixture.ctx()).await;

        assert_eq!(record.state, JobState::Failed);
        assert_eq!(record.exit_code, Some(1));
        assert_eq!(outcome.kind, OutcomeKind::RuntimeFailure);
    }

    #[tokio::test(start_paused = true)]
    async fn test_log_heuristic_when_no_exit_code() {
        let fixture = Fixture::new();
        fixture.write_logs("all metrics computed\n", "");
        let scheduler = MockScheduler::new("5.pbs", vec![], SchedulerStatus::Absent);
        let (mut manager, _tx) = manager(scheduler);

        let (record, outcome) = manager.run(&fixture.ctx()).await;

        assert_eq!(record.state, JobState::Completed);
        assert!(outcome.is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_mid_poll_bounded_by_grace() {
        let fixture = Fixture::new();
        // Cancel never acknowledges; the grace timeout must still seal
        let scheduler = MockScheduler::new("6.pbs", vec![], SchedulerStatus::Queued)
            .with_hanging_cancel();
        let (mut manager, tx) = manager(scheduler);

        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            let _ = tx.send(true);
        });

        let (record, outcome) = manager.run(&fixture.ctx()).await;
        handle.await.unwrap();

        assert_eq!(record.state, JobState::Cancelled);
        assert_eq!(outcome.kind, OutcomeKind::Cancelled);
        assert_eq!(outcome.job_id.as_deref(), Some("6.pbs"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_submit() {
        let fixture = Fixture::new();
        let scheduler = MockScheduler::new("1.pbs", vec![], SchedulerStatus::Absent);
        let (tx, rx) = watch::channel(true);
        let mut manager = JobLifecycleManager::new(Arc::new(scheduler), fast_cluster_config(), rx);

        let (record, outcome) = manager.run(&fixture.ctx()).await;
        drop(tx);

        assert_eq!(record.state, JobState::Cancelled);
        assert!(record.job_id.is_none());
        assert_eq!(outcome.kind, OutcomeKind::Cancelled);
    }

    #[test]
    fn test_logs_suggest_success_heuristic() {
        assert!(logs_suggest_success("computation finished\n", ""));
        assert!(!logs_suggest_success("", ""));
        assert!(!logs_suggest_success("Traceback (most recent call last)", ""));
        assert!(!logs_suggest_success("ok", "Segmentation Fault"));
        assert!(!logs_suggest_success("FAILED 3 tests", ""));
    }

    #[test]
    fn test_observe_ignores_stale_queued() {
        let mut record = JobRecord::new("s");
        record.submitted("1").unwrap();
        observe(&mut record, JobState::Running);
        observe(&mut record, JobState::Queued);
        assert_eq!(record.state, JobState::Running);
    }

    #[test]
    fn test_tail_file_caps_length() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("big.out");
        fs::write(&path, "x".repeat(LOG_TAIL_CHARS + 100)).unwrap();
        assert_eq!(tail_file(&path).len(), LOG_TAIL_CHARS);

        let missing = temp.path().join("absent.out");
        assert!(tail_file(&missing).is_empty());
    }
}
