//! Append-only artifact store
//!
//! Per run, a directory keyed by the run timestamp holds per-iteration
//! subtrees with plan text, drafts, code revisions, job scripts, execution
//! logs, and an append-only conversation record. Writes are keyed by
//! (run, iteration, attempt) so concurrent writers never target the same
//! path; re-writing identical content is detected by hash and skipped.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{Local, TimeZone};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::{
    CodeArtifact, CritiqueSummary, Draft, ExecutionOutcome, IterationRecord, JobRecord, Plan, Run,
    RunResult,
};
use crate::error::{AgentLabError, Result};
use crate::id::now_ms;

/// One entry in the append-only conversation record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationEntry {
    /// Wall-clock emission time (ms since epoch)
    pub at_ms: u64,
    /// Role name of the collaborator involved
    pub role: String,
    /// Action verb of the exchange
    pub action: String,
    /// Short human-readable summary of the exchange
    pub summary: String,
}

/// Filesystem layout for one run's artifacts
#[derive(Debug)]
pub struct ArtifactStore {
    root: PathBuf,
    conversation: Mutex<()>,
}

impl ArtifactStore {
    /// Create the store for a new run under `workspace_root`.
    ///
    /// The run directory is keyed by the run's creation timestamp plus its
    /// id suffix, e.g. `20250204_153012-a1b2/`.
    pub fn create(workspace_root: &Path, run: &Run) -> Result<Self> {
        let stamp = Local
            .timestamp_millis_opt(run.created_at as i64)
            .single()
            .map(|dt| dt.format("%Y%m%d_%H%M%S").to_string())
            .unwrap_or_else(|| run.created_at.to_string());
        let suffix = run.id.split('-').next_back().unwrap_or(&run.id);
        let root = workspace_root.join(format!("{}-{}", stamp, suffix));

        fs::create_dir_all(&root)?;
        let store = Self {
            root,
            conversation: Mutex::new(()),
        };
        store.write_json(&store.root.join("run.json"), run)?;
        Ok(store)
    }

    /// Open an existing run directory (tests and inspection tooling)
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(AgentLabError::Storage(format!(
                "run directory not found: {}",
                root.display()
            )));
        }
        Ok(Self {
            root,
            conversation: Mutex::new(()),
        })
    }

    /// Root directory of this run's artifacts
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for one iteration, created on first use
    pub fn iteration_dir(&self, sequence: u32) -> Result<PathBuf> {
        let dir = self.root.join(format!("iteration_{:02}", sequence));
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Persist a plan revision
    pub fn write_plan(&self, sequence: u32, plan: &Plan) -> Result<PathBuf> {
        let dir = self.iteration_dir(sequence)?;
        let path = dir.join(format!("plan_rev_{:02}.txt", plan.revision));
        self.write_if_changed(&path, plan.as_text().as_bytes())?;
        Ok(path)
    }

    /// Persist a research draft
    pub fn write_draft(&self, sequence: u32, draft: &Draft) -> Result<PathBuf> {
        let dir = self.iteration_dir(sequence)?;
        let path = dir.join("draft.txt");
        self.write_if_changed(&path, draft.content.as_bytes())?;
        Ok(path)
    }

    /// Persist the coding plan shown at the second approval gate
    pub fn write_coding_plan(&self, sequence: u32, coding_plan: &str) -> Result<PathBuf> {
        let dir = self.iteration_dir(sequence)?;
        let path = dir.join("coding_plan.txt");
        self.write_if_changed(&path, coding_plan.as_bytes())?;
        Ok(path)
    }

    /// Persist one code revision; superseded revisions are retained
    pub fn write_code(&self, sequence: u32, artifact: &CodeArtifact) -> Result<PathBuf> {
        let dir = self.iteration_dir(sequence)?;
        let path = dir.join(format!("code_rev_{:02}.py", artifact.revision));
        self.write_if_changed(&path, artifact.source.as_bytes())?;
        Ok(path)
    }

    /// Persist the rendered submission script for one attempt
    pub fn write_job_script(&self, sequence: u32, attempt: u32, script: &str) -> Result<PathBuf> {
        let dir = self.iteration_dir(sequence)?;
        let path = dir.join(format!("attempt_{:02}.sh", attempt));
        self.write_if_changed(&path, script.as_bytes())?;
        Ok(path)
    }

    /// Well-known log paths for one attempt: `<iteration>/<attempt>.{out,err}`
    pub fn log_paths(&self, sequence: u32, attempt: u32) -> Result<(PathBuf, PathBuf)> {
        let dir = self.iteration_dir(sequence)?;
        Ok((
            dir.join(format!("attempt_{:02}.out", attempt)),
            dir.join(format!("attempt_{:02}.err", attempt)),
        ))
    }

    /// Persist the sealed outcome of one attempt
    pub fn write_outcome(
        &self,
        sequence: u32,
        attempt: u32,
        outcome: &ExecutionOutcome,
    ) -> Result<PathBuf> {
        let dir = self.iteration_dir(sequence)?;
        let path = dir.join(format!("outcome_attempt_{:02}.json", attempt));
        self.write_json(&path, outcome)?;
        Ok(path)
    }

    /// Persist the job record of one remote attempt
    pub fn write_job_record(&self, sequence: u32, attempt: u32, job: &JobRecord) -> Result<PathBuf> {
        let dir = self.iteration_dir(sequence)?;
        let path = dir.join(format!("job_attempt_{:02}.json", attempt));
        self.write_json(&path, job)?;
        Ok(path)
    }

    /// Persist the critic's summary for an iteration
    pub fn write_critique(&self, sequence: u32, critique: &CritiqueSummary) -> Result<PathBuf> {
        let dir = self.iteration_dir(sequence)?;
        let path = dir.join("critique.json");
        self.write_json(&path, critique)?;
        Ok(path)
    }

    /// Persist the sealed iteration record
    pub fn write_iteration(&self, record: &IterationRecord) -> Result<PathBuf> {
        let dir = self.iteration_dir(record.sequence)?;
        let path = dir.join("iteration.json");
        self.write_json(&path, record)?;
        Ok(path)
    }

    /// Persist the final run result at the run root
    pub fn write_run_result(&self, result: &RunResult) -> Result<PathBuf> {
        let path = self.root.join("result.json");
        self.write_json(&path, result)?;
        Ok(path)
    }

    /// Append one exchange to the conversation record
    pub fn append_exchange(&self, role: &str, action: &str, summary: &str) -> Result<()> {
        let entry = ConversationEntry {
            at_ms: now_ms(),
            role: role.to_string(),
            action: action.to_string(),
            summary: summary.to_string(),
        };
        let line = serde_json::to_string(&entry)?;

        let _guard = self.conversation.lock().unwrap();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.root.join("conversation.jsonl"))?;
        writeln!(file, "{}", line)?;
        Ok(())
    }

    /// Read the whole conversation record back, in emission order
    pub fn read_conversation(&self) -> Result<Vec<ConversationEntry>> {
        let path = self.root.join("conversation.jsonl");
        if !path.exists() {
            return Ok(Vec::new());
        }
        let text = fs::read_to_string(path)?;
        let mut entries = Vec::new();
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            entries.push(serde_json::from_str(line)?);
        }
        Ok(entries)
    }

    fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let text = serde_json::to_string_pretty(value)?;
        self.write_if_changed(path, text.as_bytes())
    }

    /// Write bytes unless the file already holds identical content.
    ///
    /// Retried agent actions re-write their artifacts; the hash check makes
    /// the repeat a no-op instead of a second mutation.
    fn write_if_changed(&self, path: &Path, content: &[u8]) -> Result<()> {
        let digest = Sha256::digest(content);
        if let Ok(existing) = fs::read(path) {
            if Sha256::digest(&existing) == digest {
                log::debug!(
                    "unchanged (sha256 {}), skipping write: {}",
                    hex::encode(digest),
                    path.display()
                );
                return Ok(());
            }
        }
        fs::write(path, content)?;
        Ok(())
    }
}
