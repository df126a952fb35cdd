//! Subprocess runner for local execution attempts
//!
//! One attempt = run the script, and on a missing-module failure install the
//! bounded package list once and re-run once. Timeouts and cancellation
//! terminate the child with a bounded grace period before a forceful kill.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::{Child, Command};
use tokio::sync::watch;

use crate::config::ExecConfig;
use crate::domain::{ExecutionOutcome, OutcomeKind};
use crate::exec::remedy::missing_modules;

/// Captured result of one subprocess run
#[derive(Debug, Clone)]
pub struct CapturedRun {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub cancelled: bool,
}

impl CapturedRun {
    pub fn succeeded(&self) -> bool {
        !self.timed_out && !self.cancelled && self.exit_code == Some(0)
    }
}

/// Runs code artifacts as subordinate processes
pub struct LocalRunner {
    config: ExecConfig,
    interpreter: String,
    cancel: watch::Receiver<bool>,
}

impl LocalRunner {
    pub fn new(config: ExecConfig, interpreter: String, cancel: watch::Receiver<bool>) -> Self {
        Self {
            config,
            interpreter,
            cancel,
        }
    }

    pub fn interpreter(&self) -> &str {
        &self.interpreter
    }

    /// Execute one attempt, remediation included, and seal the outcome
    pub async fn execute(&self, script_path: &Path, workdir: &Path) -> ExecutionOutcome {
        let started = Instant::now();

        let first = match self.run_script(script_path, workdir).await {
            Ok(run) => run,
            Err(err) => {
                return ExecutionOutcome::failure(
                    OutcomeKind::RuntimeFailure,
                    "",
                    format!("failed to spawn interpreter: {}", err),
                    started.elapsed(),
                );
            }
        };

        if let Some(outcome) = self.non_runtime_outcome(&first, started) {
            return outcome;
        }
        if first.succeeded() {
            return ExecutionOutcome::success(first.stdout, first.stderr, started.elapsed());
        }

        let missing = missing_modules(&first.stderr, self.config.max_install_modules);
        if missing.is_empty() {
            return ExecutionOutcome::failure(
                OutcomeKind::RuntimeFailure,
                first.stdout,
                first.stderr,
                started.elapsed(),
            );
        }

        // One install, one re-run, no further retry at this layer
        log::info!("missing modules detected, installing once: {:?}", missing);
        let installed = self.install_packages(&missing, workdir).await;
        if !installed {
            return ExecutionOutcome::failure(
                OutcomeKind::MissingDependency,
                first.stdout,
                first.stderr,
                started.elapsed(),
            );
        }

        let second = match self.run_script(script_path, workdir).await {
            Ok(run) => run,
            Err(err) => {
                return ExecutionOutcome::failure(
                    OutcomeKind::RuntimeFailure,
                    "",
                    format!("failed to spawn interpreter: {}", err),
                    started.elapsed(),
                )
                .with_packages(missing);
            }
        };

        if let Some(outcome) = self.non_runtime_outcome(&second, started) {
            return outcome.with_packages(missing);
        }
        if second.succeeded() {
            return ExecutionOutcome::success(second.stdout, second.stderr, started.elapsed())
                .with_packages(missing);
        }

        let kind = if missing_modules(&second.stderr, self.config.max_install_modules).is_empty() {
            OutcomeKind::RuntimeFailure
        } else {
            OutcomeKind::MissingDependency
        };
        ExecutionOutcome::failure(kind, second.stdout, second.stderr, started.elapsed())
            .with_packages(missing)
    }

    /// Map timeout/cancellation captures straight to their outcome kinds
    fn non_runtime_outcome(&self, run: &CapturedRun, started: Instant) -> Option<ExecutionOutcome> {
        if run.cancelled {
            return Some(ExecutionOutcome::failure(
                OutcomeKind::Cancelled,
                run.stdout.clone(),
                run.stderr.clone(),
                started.elapsed(),
            ));
        }
        if run.timed_out {
            return Some(ExecutionOutcome::failure(
                OutcomeKind::Timeout,
                run.stdout.clone(),
                run.stderr.clone(),
                started.elapsed(),
            ));
        }
        None
    }

    async fn run_script(&self, script_path: &Path, workdir: &Path) -> std::io::Result<CapturedRun> {
        let mut command = Command::new(&self.interpreter);
        command
            .arg(script_path)
            .current_dir(workdir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        self.run_command(command).await
    }

    async fn install_packages(&self, packages: &[String], workdir: &Path) -> bool {
        let mut command = Command::new(&self.interpreter);
        command
            .arg("-m")
            .arg("pip")
            .arg("install")
            .args(packages)
            .current_dir(workdir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        match self.run_command(command).await {
            Ok(run) => {
                if !run.succeeded() {
                    log::warn!("package install failed: {}", run.stderr.trim());
                }
                run.succeeded()
            }
            Err(err) => {
                log::warn!("package install could not start: {}", err);
                false
            }
        }
    }

    /// Run a prepared command under the configured timeout and cancel signal.
    ///
    /// Output pipes are drained concurrently with the wait so a chatty child
    /// can never fill a pipe and stall.
    async fn run_command(&self, mut command: Command) -> std::io::Result<CapturedRun> {
        let timeout = Duration::from_secs(self.config.timeout_secs);
        let mut cancel = self.cancel.clone();
        let mut child = command.spawn()?;

        let stdout_task = tokio::spawn(read_stream(child.stdout.take()));
        let stderr_task = tokio::spawn(read_stream(child.stderr.take()));

        let (exit_code, timed_out, cancelled) = tokio::select! {
            result = tokio::time::timeout(timeout, child.wait()) => match result {
                Ok(status) => (status?.code(), false, false),
                Err(_) => {
                    self.terminate(&mut child).await;
                    (None, true, false)
                }
            },
            _ = crate::cancel::cancelled(&mut cancel) => {
                self.terminate(&mut child).await;
                (None, false, true)
            }
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();
        Ok(CapturedRun {
            exit_code,
            stdout,
            stderr,
            timed_out,
            cancelled,
        })
    }

    /// Terminate with grace: TERM, bounded wait, then KILL
    async fn terminate(&self, child: &mut Child) {
        if let Some(pid) = child.id() {
            let _ = Command::new("kill")
                .args(["-TERM", &pid.to_string()])
                .status()
                .await;
            let grace = Duration::from_secs(self.config.kill_grace_secs);
            if tokio::time::timeout(grace, child.wait()).await.is_ok() {
                return;
            }
        }
        let _ = child.kill().await;
    }
}

/// Drain one output pipe to completion
async fn read_stream(stream: Option<impl tokio::io::AsyncRead + Unpin>) -> String {
    use tokio::io::AsyncReadExt;

    let mut buffer = Vec::new();
    if let Some(mut stream) = stream {
        let _ = stream.read_to_end(&mut buffer).await;
    }
    String::from_utf8_lossy(&buffer).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn runner_with(config: ExecConfig, interpreter: &str) -> LocalRunner {
        let (_tx, rx) = watch::channel(false);
        LocalRunner::new(config, interpreter.to_string(), rx)
    }

    fn write_script(dir: &TempDir, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, body).unwrap();
        path
    }

    #[tokio::test]
    async fn test_execute_success() {
        let temp = TempDir::new().unwrap();
        // Shell scripts through sh keep these tests interpreter-independent
        let script = write_script(&temp, "ok.sh", "echo hello\n");
        let runner = runner_with(ExecConfig::default(), "sh");

        let outcome = runner.execute(&script, temp.path()).await;
        assert!(outcome.is_success());
        assert!(outcome.stdout.contains("hello"));
    }

    #[tokio::test]
    async fn test_execute_runtime_failure() {
        let temp = TempDir::new().unwrap();
        let script = write_script(&temp, "fail.sh", "echo oops >&2\nexit 3\n");
        let runner = runner_with(ExecConfig::default(), "sh");

        let outcome = runner.execute(&script, temp.path()).await;
        assert_eq!(outcome.kind, OutcomeKind::RuntimeFailure);
        assert!(outcome.stderr.contains("oops"));
    }

    #[tokio::test]
    async fn test_execute_timeout() {
        let temp = TempDir::new().unwrap();
        let script = write_script(&temp, "slow.sh", "sleep 30\n");
        let config = ExecConfig {
            timeout_secs: 1,
            kill_grace_secs: 1,
            ..Default::default()
        };
        let runner = runner_with(config, "sh");

        let outcome = runner.execute(&script, temp.path()).await;
        assert_eq!(outcome.kind, OutcomeKind::Timeout);
    }

    #[tokio::test]
    async fn test_execute_cancelled() {
        let temp = TempDir::new().unwrap();
        let script = write_script(&temp, "slow.sh", "sleep 30\n");
        let (tx, rx) = watch::channel(false);
        let config = ExecConfig {
            kill_grace_secs: 1,
            ..Default::default()
        };
        let runner = LocalRunner::new(config, "sh".to_string(), rx);

        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            let _ = tx.send(true);
        });

        let outcome = runner.execute(&script, temp.path()).await;
        handle.await.unwrap();
        assert_eq!(outcome.kind, OutcomeKind::Cancelled);
    }

    #[tokio::test]
    async fn test_spawn_failure_is_sealed() {
        let temp = TempDir::new().unwrap();
        let script = write_script(&temp, "x.sh", "echo hi\n");
        let runner = runner_with(ExecConfig::default(), "definitely-not-an-interpreter-xyz");

        let outcome = runner.execute(&script, temp.path()).await;
        assert_eq!(outcome.kind, OutcomeKind::RuntimeFailure);
        assert!(outcome.stderr.contains("failed to spawn"));
    }

    #[tokio::test]
    async fn test_missing_module_without_pip_reports_missing_dependency() {
        let temp = TempDir::new().unwrap();
        // Emits the missing-module signature; `sh -m pip install` then fails,
        // so the remediation cannot install and the kind must reflect it.
        let script = write_script(
            &temp,
            "missing.sh",
            "echo \"No module named 'leftpadlib'\" >&2\nexit 1\n",
        );
        let runner = runner_with(ExecConfig::default(), "sh");

        let outcome = runner.execute(&script, temp.path()).await;
        assert_eq!(outcome.kind, OutcomeKind::MissingDependency);
        // Nothing was actually installed, so the outcome must not claim it
        assert!(outcome.packages_installed.is_empty());
    }

    /// Interpreter stand-in that logs every payload run and every
    /// `-m pip install`, reporting installs as successful
    fn write_fake_interpreter(dir: &TempDir) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.path().join("fakepy");
        fs::write(
            &path,
            "#!/bin/sh\n\
             if [ \"$1\" = \"-m\" ]; then\n\
             \techo install >> installs.log\n\
             \texit 0\n\
             fi\n\
             echo run >> runs.log\n\
             exec sh \"$1\"\n",
        )
        .unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().to_string()
    }

    #[tokio::test]
    async fn test_remediation_installs_once_and_reruns_once() {
        let temp = TempDir::new().unwrap();
        let interpreter = write_fake_interpreter(&temp);
        // Fails with the missing-module signature on the first run, then
        // succeeds once the marker exists
        let script = write_script(
            &temp,
            "flaky.sh",
            "if [ -f done_marker ]; then\n\
             \techo recovered\n\
             \texit 0\n\
             fi\n\
             touch done_marker\n\
             echo \"No module named 'fakelib'\" >&2\n\
             exit 1\n",
        );
        let runner = runner_with(ExecConfig::default(), &interpreter);

        let outcome = runner.execute(&script, temp.path()).await;

        assert!(outcome.is_success());
        assert!(outcome.stdout.contains("recovered"));
        assert_eq!(outcome.packages_installed, vec!["fakelib".to_string()]);

        // Exactly one install and exactly one re-run
        let installs = fs::read_to_string(temp.path().join("installs.log")).unwrap();
        assert_eq!(installs.lines().count(), 1);
        let runs = fs::read_to_string(temp.path().join("runs.log")).unwrap();
        assert_eq!(runs.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_remediation_failure_after_rerun_reports_as_is() {
        let temp = TempDir::new().unwrap();
        let interpreter = write_fake_interpreter(&temp);
        // Keeps failing with the same signature; the runner must stop after
        // one install and one re-run
        let script = write_script(
            &temp,
            "stubborn.sh",
            "echo run-attempt >> attempts.log\n\
             echo \"No module named 'fakelib'\" >&2\n\
             exit 1\n",
        );
        let runner = runner_with(ExecConfig::default(), &interpreter);

        let outcome = runner.execute(&script, temp.path()).await;

        assert_eq!(outcome.kind, OutcomeKind::MissingDependency);
        let attempts = fs::read_to_string(temp.path().join("attempts.log")).unwrap();
        assert_eq!(attempts.lines().count(), 2, "one run plus one re-run, never more");
        let installs = fs::read_to_string(temp.path().join("installs.log")).unwrap();
        assert_eq!(installs.lines().count(), 1);
    }

    #[test]
    fn test_captured_run_succeeded() {
        let run = CapturedRun {
            exit_code: Some(0),
            stdout: String::new(),
            stderr: String::new(),
            timed_out: false,
            cancelled: false,
        };
        assert!(run.succeeded());

        let failed = CapturedRun {
            exit_code: Some(1),
            ..run.clone()
        };
        assert!(!failed.succeeded());

        let timed_out = CapturedRun {
            timed_out: true,
            ..run
        };
        assert!(!timed_out.succeeded());
    }
}
