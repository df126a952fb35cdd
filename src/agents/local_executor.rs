//! Local-Executor agent
//!
//! Runs the active code artifact as a subordinate process in the iteration's
//! workspace, applies the single-shot missing-dependency remediation, and
//! seals the outcome. Failed attempts get a backend diagnosis attached
//! before sealing; a backend outage only costs the diagnosis, never the
//! outcome.

use std::sync::Arc;

use async_trait::async_trait;

use crate::agents::{ActionRequest, ActionResponse, Agent, AgentError, AgentResult, AgentRole};
use crate::backend::{GenerateParams, ModelBackend, with_retry};
use crate::config::RetryPolicy;
use crate::domain::{CodeArtifact, ExecutionOutcome, OutcomeKind};
use crate::exec::LocalRunner;
use crate::prompt;
use crate::store::ArtifactStore;

pub struct LocalExecutorAgent {
    runner: LocalRunner,
    backend: Arc<dyn ModelBackend>,
    store: Arc<ArtifactStore>,
    retry: RetryPolicy,
    temperature: f32,
}

impl LocalExecutorAgent {
    pub fn new(
        runner: LocalRunner,
        backend: Arc<dyn ModelBackend>,
        store: Arc<ArtifactStore>,
        retry: RetryPolicy,
        temperature: f32,
    ) -> Self {
        Self {
            runner,
            backend,
            store,
            retry,
            temperature,
        }
    }

    /// Attach a backend diagnosis to a failed outcome, best effort
    async fn diagnose(&self, artifact: &CodeArtifact, outcome: ExecutionOutcome) -> ExecutionOutcome {
        if !outcome.kind.is_failure() || outcome.kind == OutcomeKind::Cancelled {
            return outcome;
        }
        let request = prompt::failure_reasoning_prompt(&artifact.source, &outcome.stdout, &outcome.stderr);
        let params = GenerateParams::with_temperature(self.temperature);
        match with_retry(&self.retry, || {
            self.backend.generate(&request, "", params.clone())
        })
        .await
        {
            Ok(generation) => outcome.with_reasoning(prompt::strip_reasoning(&generation.text)),
            Err(err) => {
                log::warn!("failure diagnosis unavailable: {}", err);
                outcome
            }
        }
    }
}

#[async_trait]
impl Agent for LocalExecutorAgent {
    fn role(&self) -> AgentRole {
        AgentRole::LocalExecutor
    }

    async fn handle(&mut self, request: ActionRequest) -> AgentResult {
        match request {
            ActionRequest::Execute {
                artifact,
                iteration,
                attempt,
            } => {
                let script_path = self
                    .store
                    .write_code(iteration, &artifact)
                    .map_err(|e| AgentError::Fatal(e.to_string()))?;
                let workdir = self
                    .store
                    .iteration_dir(iteration)
                    .map_err(|e| AgentError::Fatal(e.to_string()))?;

                log::info!(
                    "executing revision {} locally (iteration {}, attempt {})",
                    artifact.revision,
                    iteration,
                    attempt
                );
                let outcome = self.runner.execute(&script_path, &workdir).await;
                let outcome = self.diagnose(&artifact, outcome).await;

                self.store
                    .write_outcome(iteration, attempt, &outcome)
                    .map_err(|e| AgentError::Fatal(e.to_string()))?;
                Ok(ActionResponse::Outcome(outcome))
            }
            other => Err(AgentError::unsupported(self.role(), &other)),
        }
    }
}
