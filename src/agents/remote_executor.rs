//! Remote-Executor agent
//!
//! Delegates one execution attempt to the batch cluster: synthesizes the
//! submission script, drives the job lifecycle state machine, retrieves
//! logs, and seals the outcome with failure diagnosis where it applies.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::agents::{ActionRequest, ActionResponse, Agent, AgentError, AgentResult, AgentRole};
use crate::backend::{GenerateParams, ModelBackend, with_retry};
use crate::config::{ClusterConfig, RetryPolicy};
use crate::domain::{CodeArtifact, ExecutionOutcome, OutcomeKind};
use crate::id::generate_job_name;
use crate::prompt;
use crate::sched::{
    BatchScheduler, JobLifecycleManager, JobRunContext, ScriptContext, render_job_script,
};
use crate::store::ArtifactStore;

pub struct RemoteExecutorAgent {
    scheduler: Arc<dyn BatchScheduler>,
    backend: Arc<dyn ModelBackend>,
    store: Arc<ArtifactStore>,
    cluster: ClusterConfig,
    retry: RetryPolicy,
    temperature: f32,
    interpreter: String,
    run_id: String,
    cancel: watch::Receiver<bool>,
}

impl RemoteExecutorAgent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        scheduler: Arc<dyn BatchScheduler>,
        backend: Arc<dyn ModelBackend>,
        store: Arc<ArtifactStore>,
        cluster: ClusterConfig,
        retry: RetryPolicy,
        temperature: f32,
        interpreter: String,
        run_id: String,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            scheduler,
            backend,
            store,
            cluster,
            retry,
            temperature,
            interpreter,
            run_id,
            cancel,
        }
    }

    /// Attach reasoning appropriate to the failure kind
    async fn diagnose(&self, artifact: &CodeArtifact, outcome: ExecutionOutcome) -> ExecutionOutcome {
        match outcome.kind {
            OutcomeKind::Success | OutcomeKind::Cancelled => outcome,
            OutcomeKind::QueueFailure => {
                outcome.with_reasoning("scheduler rejected the submission; see stderr")
            }
            OutcomeKind::Timeout => outcome
                .with_reasoning("monitoring window ended while the job remained in the queue"),
            OutcomeKind::MissingOutput => {
                outcome.with_reasoning("job left the queue but produced no log files")
            }
            OutcomeKind::RuntimeFailure | OutcomeKind::MissingDependency => {
                let request = prompt::failure_reasoning_prompt(
                    &artifact.source,
                    &outcome.stdout,
                    &outcome.stderr,
                );
                let params = GenerateParams::with_temperature(self.temperature);
                match with_retry(&self.retry, || {
                    self.backend.generate(&request, "", params.clone())
                })
                .await
                {
                    Ok(generation) => {
                        outcome.with_reasoning(prompt::strip_reasoning(&generation.text))
                    }
                    Err(err) => {
                        log::warn!("failure diagnosis unavailable: {}", err);
                        outcome
                    }
                }
            }
        }
    }
}

#[async_trait]
impl Agent for RemoteExecutorAgent {
    fn role(&self) -> AgentRole {
        AgentRole::RemoteExecutor
    }

    async fn handle(&mut self, request: ActionRequest) -> AgentResult {
        match request {
            ActionRequest::Execute {
                artifact,
                iteration,
                attempt,
            } => {
                let fatal = |e: crate::error::AgentLabError| AgentError::Fatal(e.to_string());

                let payload_path = self.store.write_code(iteration, &artifact).map_err(fatal)?;
                let workdir = self.store.iteration_dir(iteration).map_err(fatal)?;
                let (stdout_path, stderr_path) =
                    self.store.log_paths(iteration, attempt).map_err(fatal)?;
                // Stale logs from a crashed attempt must not pollute this one
                for path in [&stdout_path, &stderr_path] {
                    if path.exists() {
                        let _ = std::fs::remove_file(path);
                    }
                }

                let job_name = generate_job_name(&self.run_id, iteration, attempt);
                let script = render_job_script(
                    &self.cluster.template,
                    &ScriptContext {
                        job_name: &job_name,
                        interpreter: &self.interpreter,
                        payload_path: &payload_path,
                        workdir: &workdir,
                        stdout_path: &stdout_path,
                        stderr_path: &stderr_path,
                    },
                );
                let script_path = self
                    .store
                    .write_job_script(iteration, attempt, &script)
                    .map_err(fatal)?;

                log::info!(
                    "submitting revision {} as {} (iteration {}, attempt {})",
                    artifact.revision,
                    job_name,
                    iteration,
                    attempt
                );
                let mut manager = JobLifecycleManager::new(
                    self.scheduler.clone(),
                    self.cluster.clone(),
                    self.cancel.clone(),
                );
                let (record, outcome) = manager
                    .run(&JobRunContext {
                        script: &script,
                        script_path: &script_path,
                        workdir: &workdir,
                        stdout_path: &stdout_path,
                        stderr_path: &stderr_path,
                    })
                    .await;

                let outcome = self.diagnose(&artifact, outcome).await;

                self.store
                    .write_job_record(iteration, attempt, &record)
                    .map_err(fatal)?;
                self.store
                    .write_outcome(iteration, attempt, &outcome)
                    .map_err(fatal)?;
                Ok(ActionResponse::Outcome(outcome))
            }
            other => Err(AgentError::unsupported(self.role(), &other)),
        }
    }
}
