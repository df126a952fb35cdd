//! PBS scheduler client
//!
//! Shells out to `qsub`/`qstat`/`qdel`. Job ids are recognized across the
//! output formats different PBS installations produce; status strings
//! outside the known vocabulary are surfaced as
//! [`SchedulerStatus::Other`] for the lifecycle manager to handle.

use std::path::Path;
use std::process::Stdio;
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use tokio::process::Command;

use crate::sched::{BatchScheduler, SchedulerError, SchedulerStatus};

/// Client for a PBS-family batch scheduler
pub struct PbsScheduler;

impl PbsScheduler {
    pub fn new() -> Self {
        Self
    }

    async fn run(
        &self,
        program: &str,
        args: &[&str],
        workdir: Option<&Path>,
    ) -> Result<std::process::Output, SchedulerError> {
        let mut command = Command::new(program);
        command.args(args).stdout(Stdio::piped()).stderr(Stdio::piped());
        if let Some(dir) = workdir {
            command.current_dir(dir);
        }
        command
            .output()
            .await
            .map_err(|e| SchedulerError::Command(format!("{} failed to start: {}", program, e)))
    }
}

impl Default for PbsScheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Pull a job id out of submission output, across PBS output dialects
pub fn extract_job_id(stdout: &str, stderr: &str) -> Option<String> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    let patterns = PATTERNS.get_or_init(|| {
        vec![
            Regex::new(r"(?i)Submitted batch job (\S+)").unwrap(),
            Regex::new(r"(?i)JobID[:\s]+(\S+)").unwrap(),
            Regex::new(r"(?i)submitted as job (\S+)").unwrap(),
            Regex::new(r"(?m)^(\d+\.\S+)$").unwrap(),
            Regex::new(r"(?m)^(\d+)$").unwrap(),
        ]
    });

    let text: String = [stdout, stderr]
        .iter()
        .filter(|s| !s.is_empty())
        .cloned()
        .collect::<Vec<_>>()
        .join("\n");
    for pattern in patterns {
        if let Some(captures) = pattern.captures(&text) {
            return Some(captures[1].to_string());
        }
    }
    None
}

/// Interpret `qstat <job>` output into a status
pub fn parse_status(job_id: &str, stdout: &str, stderr: &str, exit_ok: bool) -> SchedulerStatus {
    // A failing qstat or empty listing means the job left the queue
    if !exit_ok {
        return SchedulerStatus::Absent;
    }
    let text = format!("{}\n{}", stdout, stderr);
    if !text.contains(job_id.split('.').next().unwrap_or(job_id)) {
        return SchedulerStatus::Absent;
    }

    // qstat table rows end in "<state> <queue>"; look for the state letter
    static STATE_RE: OnceLock<Regex> = OnceLock::new();
    let state_re = STATE_RE.get_or_init(|| Regex::new(r"(?m)\s([A-Z])\s+\S+\s*$").unwrap());
    for line in stdout.lines() {
        if !line.contains(job_id.split('.').next().unwrap_or(job_id)) {
            continue;
        }
        if let Some(captures) = state_re.captures(line) {
            return match &captures[1] {
                "R" | "E" => SchedulerStatus::Running,
                "Q" | "H" | "W" | "T" => SchedulerStatus::Queued,
                other => SchedulerStatus::Other(other.to_string()),
            };
        }
    }
    // Listed but unparseable: conservatively queued
    SchedulerStatus::Queued
}

/// Parse `qstat -fx` full output for the recorded exit status
pub fn parse_exit_status(text: &str) -> Option<i32> {
    static EXIT_RE: OnceLock<Regex> = OnceLock::new();
    let exit_re = EXIT_RE.get_or_init(|| Regex::new(r"(?i)exit_status\s*=\s*(-?\d+)").unwrap());
    exit_re
        .captures(text)
        .and_then(|captures| captures[1].parse().ok())
}

#[async_trait]
impl BatchScheduler for PbsScheduler {
    async fn submit(&self, script_path: &Path, workdir: &Path) -> Result<String, SchedulerError> {
        let script = script_path.to_string_lossy().to_string();
        let output = self.run("qsub", &[script.as_ref()], Some(workdir)).await?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if !output.status.success() {
            return Err(SchedulerError::Submit(format!(
                "qsub exited with {:?}: {}",
                output.status.code(),
                stderr.trim()
            )));
        }

        extract_job_id(&stdout, &stderr).ok_or_else(|| {
            SchedulerError::Submit(format!("no job id in qsub output: {}", stdout.trim()))
        })
    }

    async fn status(&self, job_id: &str) -> Result<SchedulerStatus, SchedulerError> {
        let output = self.run("qstat", &[job_id], None).await?;
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        Ok(parse_status(job_id, &stdout, &stderr, output.status.success()))
    }

    async fn cancel(&self, job_id: &str) -> Result<(), SchedulerError> {
        let output = self.run("qdel", &[job_id], None).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(SchedulerError::Command(format!(
                "qdel exited with {:?}",
                output.status.code()
            )))
        }
    }

    async fn exit_status(&self, job_id: &str) -> Result<Option<i32>, SchedulerError> {
        let output = self.run("qstat", &["-fx", job_id], None).await?;
        if !output.status.success() {
            return Ok(None);
        }
        let text = String::from_utf8_lossy(&output.stdout).to_string();
        Ok(parse_exit_status(&text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_job_id_pbs_line() {
        assert_eq!(
            extract_job_id("1234567.pbs01\n", ""),
            Some("1234567.pbs01".to_string())
        );
    }

    #[test]
    fn test_extract_job_id_slurm_style() {
        assert_eq!(
            extract_job_id("Submitted batch job 42\n", ""),
            Some("42".to_string())
        );
    }

    #[test]
    fn test_extract_job_id_bare_number() {
        assert_eq!(extract_job_id("998877\n", ""), Some("998877".to_string()));
    }

    #[test]
    fn test_extract_job_id_from_stderr() {
        assert_eq!(
            extract_job_id("", "JobID: 55.cluster\n"),
            Some("55.cluster".to_string())
        );
    }

    #[test]
    fn test_extract_job_id_none() {
        assert_eq!(extract_job_id("qsub: submit error", ""), None);
    }

    #[test]
    fn test_parse_status_absent_on_failure() {
        assert_eq!(
            parse_status("1.pbs", "", "qstat: Unknown Job Id", false),
            SchedulerStatus::Absent
        );
    }

    #[test]
    fn test_parse_status_absent_when_not_listed() {
        let stdout = "Job id    Name    User   Time Use S Queue\n--------- ------- ------ -------- - -----\n";
        assert_eq!(
            parse_status("77.pbs", stdout, "", true),
            SchedulerStatus::Absent
        );
    }

    #[test]
    fn test_parse_status_running() {
        let stdout = "Job id    Name       User  Time Use S Queue\n\
                      77.pbs    agentlab   lab   00:01:02 R by-gpu\n";
        assert_eq!(
            parse_status("77.pbs", stdout, "", true),
            SchedulerStatus::Running
        );
    }

    #[test]
    fn test_parse_status_queued() {
        let stdout = "Job id    Name       User  Time Use S Queue\n\
                      77.pbs    agentlab   lab   0        Q by-gpu\n";
        assert_eq!(
            parse_status("77.pbs", stdout, "", true),
            SchedulerStatus::Queued
        );
    }

    #[test]
    fn test_parse_status_unknown_state_letter() {
        let stdout = "Job id    Name       User  Time Use S Queue\n\
                      77.pbs    agentlab   lab   0        X by-gpu\n";
        assert_eq!(
            parse_status("77.pbs", stdout, "", true),
            SchedulerStatus::Other("X".to_string())
        );
    }

    #[test]
    fn test_parse_status_listed_but_unparseable() {
        let stdout = "77.pbs weird format line\n";
        assert_eq!(
            parse_status("77.pbs", stdout, "", true),
            SchedulerStatus::Queued
        );
    }

    #[test]
    fn test_parse_exit_status() {
        let text = "Job Id: 77.pbs\n    job_state = F\n    Exit_status = 0\n";
        assert_eq!(parse_exit_status(text), Some(0));

        let text = "    exit_status = -11\n";
        assert_eq!(parse_exit_status(text), Some(-11));

        assert_eq!(parse_exit_status("job_state = R"), None);
    }
}
