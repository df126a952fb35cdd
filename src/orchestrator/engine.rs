//! The refinement loop
//!
//! One orchestrator task drives iterations until the stop policy fires:
//! plan (human gate) → concurrent source/draft fan-out → code (optional
//! second gate) → execution dispatch → reviewer-driven repair → critique.
//! Execution failures are consumed as sealed outcomes; only approval
//! exhaustion, approval timeout, configuration errors, and an unreachable
//! backend terminate the run.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::agents::{ActionRequest, ActionResponse};
use crate::backend::ModelBackend;
use crate::channel::AgentHandle;
use crate::config::RunConfig;
use crate::domain::{
    CodeArtifact, CritiqueSummary, Draft, ExecutionOutcome, IterationRecord, OutcomeKind, Plan,
    Recommendation, ReviewVerdict, Run, RunResult, RunStatus, SourceDigest,
};
use crate::error::{AgentLabError, Result};
use crate::orchestrator::gate::{ApprovalDecision, ApprovalGate, GateKind};
use crate::orchestrator::AgentHandles;
use crate::store::ArtifactStore;

/// Top-level controller for one run
pub struct Orchestrator {
    config: RunConfig,
    run: Run,
    handles: AgentHandles,
    gate: Arc<dyn ApprovalGate>,
    store: Arc<ArtifactStore>,
    /// Held for token accounting in the final report
    backend: Arc<dyn ModelBackend>,
    cancel: watch::Receiver<bool>,

    sealed_iterations: u32,
    attempts_used: u32,
}

/// Mutable loop state carried between iterations
struct LoopState {
    digest: SourceDigest,
    draft: Option<Draft>,
    artifact: Option<CodeArtifact>,
    critique: Option<CritiqueSummary>,
}

impl Orchestrator {
    pub fn new(
        config: RunConfig,
        run: Run,
        handles: AgentHandles,
        gate: Arc<dyn ApprovalGate>,
        store: Arc<ArtifactStore>,
        backend: Arc<dyn ModelBackend>,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            run,
            handles,
            gate,
            store,
            backend,
            cancel,
            sealed_iterations: 0,
            attempts_used: 0,
        }
    }

    /// Drive the run to completion and return the final report.
    ///
    /// On fatal termination the report is still persisted to the store
    /// before the error propagates; partial progress is never lost.
    pub async fn run(mut self) -> Result<RunResult> {
        self.config.validate()?;
        self.run.status = RunStatus::Running;
        log::info!("run {} started: '{}'", self.run.id, self.run.topic);

        let outcome = self.drive().await;
        let status = match &outcome {
            Ok(status) => *status,
            Err(_) => RunStatus::Failed,
        };

        let result = RunResult {
            run_id: self.run.id.clone(),
            status,
            iterations_completed: self.sealed_iterations,
            attempts_used: self.attempts_used,
            artifact_root: self.store.root().to_path_buf(),
            tokens_used: self.backend.total_usage().tokens,
        };
        if let Err(err) = self.store.write_run_result(&result) {
            log::warn!("could not persist run result: {}", err);
        }
        log::info!(
            "run {} finished with {:?} after {} iterations ({} attempts, {} tokens)",
            result.run_id,
            result.status,
            result.iterations_completed,
            result.attempts_used,
            result.tokens_used
        );

        outcome.map(|_| result)
    }

    async fn drive(&mut self) -> Result<RunStatus> {
        let mut state = LoopState {
            digest: self.initial_digest().await,
            draft: None,
            artifact: None,
            critique: None,
        };

        loop {
            if self.cancelled() {
                return Ok(RunStatus::Stopped);
            }
            let sequence = self.sealed_iterations + 1;
            log::info!("iteration {} starting", sequence);

            // Step 1: plan, gated by human approval
            let plan = self.approved_plan(sequence, &state).await?;

            // Step 2: concurrent fan-out with barrier join
            let collection_failed = self.fan_out(sequence, &plan, &mut state).await;

            // Steps 3-5: code, execution dispatch, reviewer-driven repair
            let attempts_before = self.attempts_used;
            let outcome = if collection_failed {
                ExecutionOutcome::failure(
                    OutcomeKind::RuntimeFailure,
                    "",
                    "",
                    Duration::ZERO,
                )
                .with_reasoning(format!(
                    "collection failure: iteration {} degraded, code phase skipped",
                    sequence
                ))
            } else if self.config.mode.includes_code() {
                self.code_phase(sequence, &plan, &mut state).await?
            } else {
                // Research-only iterations seal a synthetic success so the
                // stop policy sees exactly one outcome per iteration
                ExecutionOutcome::success("", "", Duration::ZERO)
            };
            // Every iteration consumes budget, with or without an execution
            if self.attempts_used == attempts_before {
                self.attempts_used += 1;
            }

            // Step 6: critique, always
            let critique = self.critique(sequence, &plan, &state, &outcome).await;

            let mut record = IterationRecord::new(sequence, plan.revision);
            if let Some(artifact) = &state.artifact {
                record.set_code_revision(artifact.revision)?;
            }
            record.seal(outcome.clone(), critique.clone())?;
            self.store.write_iteration(&record)?;
            self.sealed_iterations = sequence;

            // Step 7: stop policy
            let produced = match self.config.mode.includes_code() {
                true => outcome.is_success(),
                false => state.draft.is_some() && outcome.is_success(),
            };
            if self.cancelled() || outcome.kind == OutcomeKind::Cancelled {
                return Ok(RunStatus::Stopped);
            }
            if produced && critique.recommendation == Recommendation::Stop {
                log::info!("success and critic recommends stop");
                return Ok(RunStatus::Succeeded);
            }
            if self.attempts_used >= self.run.attempt_budget {
                log::info!("attempt budget exhausted");
                return Ok(if produced {
                    RunStatus::Succeeded
                } else {
                    RunStatus::Failed
                });
            }
            state.critique = Some(critique);
        }
    }

    fn cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Collect once before the first plan; the per-iteration fan-out
    /// refreshes this continuously afterwards
    async fn initial_digest(&self) -> SourceDigest {
        let request = ActionRequest::GatherSources {
            topic: self.run.topic.clone(),
            inputs: self.config.sources.clone(),
        };
        match self.call(&self.handles.aggregator.clone(), request).await {
            Ok(ActionResponse::Digest(digest)) => digest,
            Ok(_) | Err(_) => {
                log::warn!("initial collection failed, planning from the topic alone");
                SourceDigest::degraded(format!("Topic: {}", self.run.topic))
            }
        }
    }

    /// Step 1: request a plan (with prior critique as feedback) and hold it
    /// at the approval gate, bounded by the re-ask cap
    async fn approved_plan(&self, sequence: u32, state: &LoopState) -> Result<Plan> {
        let mut guidance: Option<String> = None;
        let mut rejections = 0u32;

        loop {
            let request = ActionRequest::CreatePlan {
                topic: self.run.topic.clone(),
                digest: state.digest.content.clone(),
                mode: self.config.mode,
                guidance: guidance.clone(),
                feedback: state.critique.as_ref().map(|c| c.feedback_text()),
            };
            let response = self.call(&self.handles.planner.clone(), request).await?;
            let plan = expect_plan(response)?;
            self.store.write_plan(sequence, &plan)?;

            match self.gated_review(GateKind::Plan, &plan.as_text()).await? {
                ApprovalDecision::Approve => return Ok(plan),
                ApprovalDecision::ApproveWithEdits(text) => {
                    let edited = plan.edited(&text);
                    self.store.write_plan(sequence, &edited)?;
                    return Ok(edited);
                }
                ApprovalDecision::Reject(feedback) => {
                    rejections += 1;
                    if rejections >= self.config.max_plan_reasks {
                        return Err(AgentLabError::PlanApprovalExhausted {
                            attempts: rejections,
                        });
                    }
                    log::info!("plan rejected ({}/{})", rejections, self.config.max_plan_reasks);
                    guidance = Some(feedback);
                }
            }
        }
    }

    /// Step 2: refresh the digest and advance the draft concurrently.
    /// Returns true when either arm failed (CollectionFailure).
    async fn fan_out(&self, sequence: u32, plan: &Plan, state: &mut LoopState) -> bool {
        let gather = ActionRequest::GatherSources {
            topic: self.run.topic.clone(),
            inputs: self.config.sources.clone(),
        };
        let draft_request = if self.config.mode.includes_research() {
            Some(match (&state.draft, &state.critique) {
                (Some(previous), Some(critique)) => ActionRequest::ImproveDraft {
                    draft: previous.clone(),
                    feedback: critique
                        .research_gaps
                        .clone()
                        .unwrap_or_else(|| critique.summary.clone()),
                    iteration: sequence,
                },
                _ => ActionRequest::DraftDocument {
                    topic: self.run.topic.clone(),
                    plan_text: plan.as_text(),
                    digest: state.digest.content.clone(),
                    iteration: sequence,
                },
            })
        } else {
            None
        };

        let aggregator = self.handles.aggregator.clone();
        let drafting = self.handles.drafting.clone();
        let (digest_result, draft_result) = tokio::join!(
            self.call(&aggregator, gather),
            async {
                match draft_request {
                    Some(request) => Some(self.call(&drafting, request).await),
                    None => None,
                }
            }
        );

        let mut failed = false;
        match digest_result {
            Ok(ActionResponse::Digest(digest)) => state.digest = digest,
            Ok(_) | Err(_) => {
                failed = true;
                state.digest = SourceDigest::degraded(format!(
                    "source collection failed in iteration {}; prior digest unavailable",
                    sequence
                ));
            }
        }
        match draft_result {
            Some(Ok(ActionResponse::Draft(draft))) => {
                if let Err(err) = self.store.write_draft(sequence, &draft) {
                    log::warn!("could not persist draft: {}", err);
                }
                state.draft = Some(draft);
            }
            Some(Ok(_)) | Some(Err(_)) => {
                log::warn!("drafting failed in iteration {}", sequence);
                failed = true;
            }
            None => {}
        }
        failed
    }

    /// Steps 3-5: produce code, dispatch execution, loop through the
    /// reviewer while budget remains. Always returns a sealed outcome.
    async fn code_phase(
        &mut self,
        sequence: u32,
        plan: &Plan,
        state: &mut LoopState,
    ) -> Result<ExecutionOutcome> {
        let produced = match (&state.artifact, &state.critique) {
            (Some(previous), Some(critique)) => {
                let feedback = critique
                    .code_issues
                    .clone()
                    .unwrap_or_else(|| critique.summary.clone());
                let request = ActionRequest::ImproveCode {
                    artifact: previous.clone(),
                    feedback,
                    iteration: sequence,
                };
                self.call(&self.handles.code_writer.clone(), request).await
            }
            _ => {
                let coding_plan = self.approved_coding_plan(sequence, plan, state).await?;
                let request = ActionRequest::WriteCode {
                    topic: self.run.topic.clone(),
                    plan_text: plan.as_text(),
                    coding_plan,
                    digest: state.digest.content.clone(),
                    iteration: sequence,
                };
                self.call(&self.handles.code_writer.clone(), request).await
            }
        };

        let mut active = match produced.and_then(expect_code) {
            Ok(artifact) => artifact,
            Err(err) => {
                // Surfaced as a sealed runtime failure, not a crash
                log::warn!("code writer failed: {}", err);
                return Ok(ExecutionOutcome::failure(
                    OutcomeKind::RuntimeFailure,
                    "",
                    "",
                    Duration::ZERO,
                )
                .with_reasoning(format!("code generation failed: {}", err)));
            }
        };
        self.store.write_code(sequence, &active)?;

        let mut attempt = 0u32;
        let outcome = loop {
            attempt += 1;
            self.attempts_used += 1;
            let outcome = self.dispatch(&active, sequence, attempt).await;

            if outcome.is_success() || outcome.kind == OutcomeKind::Cancelled {
                break outcome;
            }
            if self.attempts_used >= self.run.attempt_budget {
                log::info!("no attempt budget left for a repair cycle");
                break outcome;
            }
            if self.cancelled() {
                break outcome;
            }

            // Step 5: the reviewer either patches (loop back) or escalates
            let request = ActionRequest::ReviewFailure {
                artifact: active.clone(),
                outcome: outcome.clone(),
            };
            match self.call(&self.handles.reviewer.clone(), request).await {
                Ok(ActionResponse::Review(ReviewVerdict::Patched(patched))) => {
                    log::info!(
                        "reviewer patched revision {} -> {}",
                        active.revision,
                        patched.revision
                    );
                    self.store.write_code(sequence, &patched)?;
                    active = patched;
                }
                Ok(_) => break outcome,
                Err(err) => {
                    log::warn!("reviewer unavailable: {}", err);
                    break outcome;
                }
            }
        };

        state.artifact = Some(active);
        Ok(outcome)
    }

    /// Step 3's optional second gate over the coding plan
    async fn approved_coding_plan(
        &self,
        sequence: u32,
        plan: &Plan,
        state: &LoopState,
    ) -> Result<String> {
        let request = ActionRequest::CreateCodingPlan {
            topic: self.run.topic.clone(),
            plan_text: plan.as_text(),
            digest: state.digest.content.clone(),
        };
        let mut coding_plan =
            expect_coding_plan(self.call(&self.handles.code_writer.clone(), request).await?)?;
        self.store.write_coding_plan(sequence, &coding_plan)?;

        if !self.config.gate_coding_plan {
            return Ok(coding_plan);
        }

        let mut rejections = 0u32;
        loop {
            match self.gated_review(GateKind::CodingPlan, &coding_plan).await? {
                ApprovalDecision::Approve => return Ok(coding_plan),
                ApprovalDecision::ApproveWithEdits(text) => {
                    self.store.write_coding_plan(sequence, &text)?;
                    return Ok(text);
                }
                ApprovalDecision::Reject(feedback) => {
                    rejections += 1;
                    if rejections >= self.config.max_plan_reasks {
                        return Err(AgentLabError::PlanApprovalExhausted {
                            attempts: rejections,
                        });
                    }
                    let request = ActionRequest::ImproveCodingPlan {
                        coding_plan: coding_plan.clone(),
                        feedback,
                    };
                    coding_plan = expect_coding_plan(
                        self.call(&self.handles.code_writer.clone(), request).await?,
                    )?;
                    self.store.write_coding_plan(sequence, &coding_plan)?;
                }
            }
        }
    }

    /// Step 4: dispatch to the executor the remote flag selects. Executor
    /// failures come back as sealed runtime-failure outcomes.
    async fn dispatch(
        &self,
        artifact: &CodeArtifact,
        sequence: u32,
        attempt: u32,
    ) -> ExecutionOutcome {
        let handle = if self.run.remote {
            self.handles.remote_executor.clone()
        } else {
            self.handles.local_executor.clone()
        };
        let request = ActionRequest::Execute {
            artifact: artifact.clone(),
            iteration: sequence,
            attempt,
        };

        match self.call(&handle, request).await {
            Ok(ActionResponse::Outcome(outcome)) => outcome,
            Ok(_) | Err(_) => {
                let outcome = ExecutionOutcome::failure(
                    OutcomeKind::RuntimeFailure,
                    "",
                    "",
                    Duration::ZERO,
                )
                .with_reasoning("executor unavailable after retries");
                if let Err(err) = self.store.write_outcome(sequence, attempt, &outcome) {
                    log::warn!("could not persist outcome: {}", err);
                }
                outcome
            }
        }
    }

    /// Step 6: the critic reviews whatever the iteration produced. Critic
    /// outages degrade to a continue recommendation instead of failing.
    async fn critique(
        &self,
        sequence: u32,
        plan: &Plan,
        state: &LoopState,
        outcome: &ExecutionOutcome,
    ) -> CritiqueSummary {
        let request = ActionRequest::Critique {
            plan_text: plan.as_text(),
            draft: state.draft.clone(),
            artifact: state.artifact.clone(),
            outcome: Some(outcome.clone()),
            digest: state.digest.content.clone(),
        };

        let critique = match self.call(&self.handles.critic.clone(), request).await {
            Ok(ActionResponse::Critique(critique)) => critique,
            Ok(_) | Err(_) => {
                log::warn!("critic unavailable for iteration {}", sequence);
                CritiqueSummary {
                    research_gaps: None,
                    code_issues: None,
                    summary: "critic unavailable; continuing on prior feedback".to_string(),
                    recommendation: Recommendation::Continue,
                }
            }
        };
        if let Err(err) = self.store.write_critique(sequence, &critique) {
            log::warn!("could not persist critique: {}", err);
        }
        critique
    }

    /// Wrap a gate call with the optional approval timeout
    async fn gated_review(&self, kind: GateKind, content: &str) -> Result<ApprovalDecision> {
        match self.config.approval_timeout() {
            Some(limit) => tokio::time::timeout(limit, self.gate.review(kind, content))
                .await
                .map_err(|_| AgentLabError::ApprovalTimeout {
                    seconds: limit.as_secs(),
                }),
            None => Ok(self.gate.review(kind, content).await),
        }
    }

    /// Send one request, retrying transient failures with backoff, and
    /// append the exchange to the conversation record
    async fn call(&self, handle: &AgentHandle, request: ActionRequest) -> Result<ActionResponse> {
        let role = handle.role().name();
        let verb = request.verb();
        let mut attempt = 0u32;

        let result = loop {
            attempt += 1;
            match handle.call(request.clone()).await {
                Ok(response) => break Ok(response),
                Err(err) if err.is_transient() && attempt < self.config.retry.max_attempts => {
                    let delay = self.config.retry.delay_for(attempt);
                    log::warn!(
                        "{} {} failed transiently ({}), retrying in {:?}",
                        role,
                        verb,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    break Err(AgentLabError::Backend(format!("{} {}: {}", role, verb, err)));
                }
            }
        };

        let summary = match &result {
            Ok(response) => response_label(response).to_string(),
            Err(err) => format!("failed: {}", err),
        };
        if let Err(err) = self.store.append_exchange(role, verb, &summary) {
            log::warn!("could not record exchange: {}", err);
        }
        result
    }
}

fn response_label(response: &ActionResponse) -> &'static str {
    match response {
        ActionResponse::Plan(_) => "plan",
        ActionResponse::Digest(_) => "digest",
        ActionResponse::Draft(_) => "draft",
        ActionResponse::CodingPlan(_) => "coding-plan",
        ActionResponse::Code(_) => "code",
        ActionResponse::Outcome(_) => "outcome",
        ActionResponse::Review(_) => "review",
        ActionResponse::Critique(_) => "critique",
    }
}

fn expect_plan(response: ActionResponse) -> Result<Plan> {
    match response {
        ActionResponse::Plan(plan) => Ok(plan),
        other => Err(AgentLabError::Channel(format!(
            "expected plan, got {}",
            response_label(&other)
        ))),
    }
}

fn expect_code(response: ActionResponse) -> Result<CodeArtifact> {
    match response {
        ActionResponse::Code(artifact) => Ok(artifact),
        other => Err(AgentLabError::Channel(format!(
            "expected code, got {}",
            response_label(&other)
        ))),
    }
}

fn expect_coding_plan(response: ActionResponse) -> Result<String> {
    match response {
        ActionResponse::CodingPlan(text) => Ok(text),
        other => Err(AgentLabError::Channel(format!(
            "expected coding plan, got {}",
            response_label(&other)
        ))),
    }
}
