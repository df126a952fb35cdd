//! Iteration orchestrator
//!
//! Top-level controller of the refinement loop. [`spawn_agents`] wires the
//! eight collaborator roles onto the message channel; [`Orchestrator`]
//! drives plan → gate → fan-out → code → execute → review → critique until
//! the stop policy fires.

mod engine;
mod gate;

pub use engine::Orchestrator;
pub use gate::{ApprovalDecision, ApprovalGate, AutoGate, ConsoleGate, GateKind, ScriptedGate};

use std::sync::Arc;

use tokio::sync::watch;

use crate::agents::{
    CodeWriterAgent, CriticAgent, DraftingAgent, LocalExecutorAgent, PlannerAgent,
    RemoteExecutorAgent, ReviewerAgent, SourceAggregatorAgent,
};
use crate::backend::ModelBackend;
use crate::channel::{AgentHandle, Exchange};
use crate::collect::SourceCollector;
use crate::config::RunConfig;
use crate::domain::Run;
use crate::exec::{LocalRunner, resolve_interpreter};
use crate::sched::BatchScheduler;
use crate::store::ArtifactStore;

/// Addressable handles for every collaborator role
#[derive(Clone)]
pub struct AgentHandles {
    pub planner: AgentHandle,
    pub aggregator: AgentHandle,
    pub drafting: AgentHandle,
    pub code_writer: AgentHandle,
    pub local_executor: AgentHandle,
    pub remote_executor: AgentHandle,
    pub reviewer: AgentHandle,
    pub critic: AgentHandle,
}

/// Register the full collaborator set on a fresh exchange.
///
/// The worker pool size comes from the configuration; the cancel receiver
/// fans out to both executors so a run-level stop reaches in-flight work.
pub fn spawn_agents(
    config: &RunConfig,
    run: &Run,
    backend: Arc<dyn ModelBackend>,
    collector: Arc<dyn SourceCollector>,
    scheduler: Arc<dyn BatchScheduler>,
    store: Arc<ArtifactStore>,
    cancel: watch::Receiver<bool>,
) -> (Exchange, AgentHandles) {
    let mut exchange = Exchange::new(config.worker_pool_size);
    let temperature = &config.backend.temperature;
    let interpreter = resolve_interpreter(config.environment.as_deref(), "python3");

    let runner = LocalRunner::new(config.execution.clone(), interpreter.clone(), cancel.clone());

    let handles = AgentHandles {
        planner: exchange.register(Box::new(PlannerAgent::new(
            backend.clone(),
            temperature.research,
        ))),
        aggregator: exchange.register(Box::new(SourceAggregatorAgent::new(collector))),
        drafting: exchange.register(Box::new(DraftingAgent::new(
            backend.clone(),
            temperature.research,
        ))),
        code_writer: exchange.register(Box::new(CodeWriterAgent::new(
            backend.clone(),
            temperature.coding,
        ))),
        local_executor: exchange.register(Box::new(LocalExecutorAgent::new(
            runner,
            backend.clone(),
            store.clone(),
            config.retry.clone(),
            temperature.execution,
        ))),
        remote_executor: exchange.register(Box::new(RemoteExecutorAgent::new(
            scheduler,
            backend.clone(),
            store.clone(),
            config.cluster.clone(),
            config.retry.clone(),
            temperature.execution,
            interpreter,
            run.id.clone(),
            cancel,
        ))),
        reviewer: exchange.register(Box::new(ReviewerAgent::new(
            backend.clone(),
            temperature.review,
        ))),
        critic: exchange.register(Box::new(CriticAgent::new(backend, temperature.critic))),
    };

    (exchange, handles)
}
