//! Configuration for agentlab
//!
//! One immutable [`RunConfig`] is assembled before the orchestrator starts:
//! defaults, then an optional YAML file, then CLI overrides. The core never
//! reads ambient/global state; everything is threaded through this struct.

use crate::domain::{RunMode, SourceInput};
use crate::error::{AgentLabError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Default attempt budget when neither file nor CLI supplies one
pub const DEFAULT_ATTEMPT_BUDGET: u32 = 4;

/// Default cap on plan re-asks before the run fails
pub const DEFAULT_MAX_PLAN_REASKS: u32 = 3;

/// Retry policy for transient backend failures
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Base backoff delay, doubled per retry
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
        }
    }
}

impl RetryPolicy {
    /// Backoff before the given 1-based retry attempt
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(8);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }
}

/// Model backend endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the local inference endpoint
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    /// Per-role sampling temperatures
    pub temperature: TemperatureConfig,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "gpt-oss:20b".to_string(),
            timeout_secs: 120,
            temperature: TemperatureConfig::default(),
        }
    }
}

/// Sampling temperatures per agent concern
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TemperatureConfig {
    pub research: f32,
    pub coding: f32,
    pub critic: f32,
    pub execution: f32,
    pub review: f32,
}

impl Default for TemperatureConfig {
    fn default() -> Self {
        Self {
            research: 0.3,
            coding: 0.2,
            critic: 0.4,
            execution: 0.1,
            review: 0.1,
        }
    }
}

/// Local execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecConfig {
    /// Wall-clock limit for one local execution attempt
    pub timeout_secs: u64,
    /// Upper bound on distinct modules the remediation may install
    pub max_install_modules: usize,
    /// Grace period between terminate and kill on cancellation
    pub kill_grace_secs: u64,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 600,
            max_install_modules: 5,
            kill_grace_secs: 5,
        }
    }
}

/// Batch-scheduler directives rendered into the submission script.
///
/// All of these are externally supplied; the core never hard-codes resource
/// selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobTemplate {
    pub account: Option<String>,
    pub select: Option<String>,
    pub filesystems: Option<String>,
    pub walltime: Option<String>,
    pub queue: Option<String>,
    /// `module load` lines executed before the payload
    pub modules: Vec<String>,
    /// Arbitrary shell lines executed before the payload
    pub pre_run_commands: Vec<String>,
}

impl Default for JobTemplate {
    fn default() -> Self {
        Self {
            account: None,
            select: Some("1".to_string()),
            filesystems: None,
            walltime: Some("01:00:00".to_string()),
            queue: None,
            modules: Vec::new(),
            pre_run_commands: Vec::new(),
        }
    }
}

/// Remote execution and polling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub template: JobTemplate,
    /// Seconds between scheduler polls
    pub poll_interval_secs: u64,
    /// Hard cap on poll cycles per job
    pub status_max_checks: u32,
    /// Hard cap on total polling wall time per job
    pub status_max_duration_secs: u64,
    /// How long to wait for log files after the job leaves the queue
    pub log_grace_secs: u64,
    /// Upper bound on waiting for a scheduler cancel acknowledgment
    pub cancel_grace_secs: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            template: JobTemplate::default(),
            poll_interval_secs: 10,
            status_max_checks: 60,
            status_max_duration_secs: 3600,
            log_grace_secs: 30,
            cancel_grace_secs: 15,
        }
    }
}

/// The immutable configuration one run is constructed from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Research/coding topic
    pub topic: String,

    pub mode: RunMode,

    /// Dispatch execution to the batch cluster instead of running locally
    pub remote: bool,

    /// Total execution attempts available across the run
    pub attempt_budget: u32,

    /// Maximum plan rejections before the run fails
    pub max_plan_reasks: u32,

    /// Gate the coding plan behind a second human approval
    pub gate_coding_plan: bool,

    /// Optional approval-gate timeout; None blocks indefinitely
    pub approval_timeout_secs: Option<u64>,

    /// Optional interpreter environment root (e.g. a conda env path)
    pub environment: Option<PathBuf>,

    /// Root directory artifact stores are created under
    pub workspace_root: PathBuf,

    /// Inputs handed to the Source-Aggregator
    pub sources: Vec<SourceInput>,

    /// Bound on concurrently blocking agent actions
    pub worker_pool_size: usize,

    pub backend: BackendConfig,
    pub retry: RetryPolicy,
    pub execution: ExecConfig,
    pub cluster: ClusterConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            topic: String::new(),
            mode: RunMode::Both,
            remote: false,
            attempt_budget: DEFAULT_ATTEMPT_BUDGET,
            max_plan_reasks: DEFAULT_MAX_PLAN_REASKS,
            gate_coding_plan: true,
            approval_timeout_secs: None,
            environment: None,
            workspace_root: PathBuf::from("workspace_runs"),
            sources: Vec::new(),
            worker_pool_size: 8,
            backend: BackendConfig::default(),
            retry: RetryPolicy::default(),
            execution: ExecConfig::default(),
            cluster: ClusterConfig::default(),
        }
    }
}

impl RunConfig {
    /// Load configuration from an optional YAML file.
    ///
    /// Search order: explicit path if provided, then `.agentlab.yml` in the
    /// current directory, then built-in defaults.
    pub fn load(explicit_path: Option<&PathBuf>) -> Result<Self> {
        let candidate = explicit_path
            .cloned()
            .or_else(|| {
                let local = PathBuf::from(".agentlab.yml");
                local.exists().then_some(local)
            });

        match candidate {
            Some(path) => {
                let text = fs::read_to_string(&path).map_err(|e| {
                    AgentLabError::Configuration(format!(
                        "cannot read config {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                let config: RunConfig = serde_yaml::from_str(&text)?;
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }

    /// Validate the configuration before any iteration runs
    pub fn validate(&self) -> Result<()> {
        if self.topic.trim().is_empty() {
            return Err(AgentLabError::Configuration("topic must not be empty".into()));
        }
        if self.attempt_budget == 0 {
            return Err(AgentLabError::Configuration(
                "attempt budget must be at least 1".into(),
            ));
        }
        if self.max_plan_reasks == 0 {
            return Err(AgentLabError::Configuration(
                "max plan re-asks must be at least 1".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(AgentLabError::Configuration(
                "retry max_attempts must be at least 1".into(),
            ));
        }
        if self.remote {
            if self.cluster.status_max_checks == 0 {
                return Err(AgentLabError::Configuration(
                    "cluster status_max_checks must be at least 1".into(),
                ));
            }
            if self.cluster.poll_interval_secs == 0 {
                return Err(AgentLabError::Configuration(
                    "cluster poll_interval_secs must be at least 1".into(),
                ));
            }
        }
        for source in &self.sources {
            match source {
                SourceInput::Pdf { path } | SourceInput::Directory { path } => {
                    if !path.exists() {
                        return Err(AgentLabError::Configuration(format!(
                            "source path not found: {}",
                            path.display()
                        )));
                    }
                }
                SourceInput::Url { .. } => {}
            }
        }
        Ok(())
    }

    /// Approval timeout as a Duration, if configured
    pub fn approval_timeout(&self) -> Option<Duration> {
        self.approval_timeout_secs.map(Duration::from_secs)
    }
}
