//! In-memory message channel between the orchestrator and agents
//!
//! Point-to-point request/response transport addressing each collaborator by
//! its role. One mailbox task per agent serializes delivery for that
//! recipient (single-writer-per-mailbox), so per-pair ordering holds while
//! different recipients progress concurrently. A shared semaphore bounds how
//! many agent actions block at once — the worker pool of the system.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::agents::{ActionRequest, Agent, AgentError, AgentResult, AgentRole};

/// Mailbox capacity per agent; sends beyond it apply backpressure
const MAILBOX_CAPACITY: usize = 32;

/// One request in flight to an agent, carrying its reply slot
struct Envelope {
    request: ActionRequest,
    reply: oneshot::Sender<AgentResult>,
}

/// Addressable sender half for one agent's mailbox
#[derive(Clone)]
pub struct AgentHandle {
    role: AgentRole,
    tx: mpsc::Sender<Envelope>,
}

impl AgentHandle {
    pub fn role(&self) -> AgentRole {
        self.role
    }

    /// Send one request and await its response.
    ///
    /// Channel-level failures (mailbox closed, agent task gone) surface as
    /// fatal agent errors; they are indistinguishable from a crashed
    /// collaborator as far as the orchestrator is concerned.
    pub async fn call(&self, request: ActionRequest) -> AgentResult {
        let (reply_tx, reply_rx) = oneshot::channel();
        let envelope = Envelope {
            request,
            reply: reply_tx,
        };

        self.tx.send(envelope).await.map_err(|_| {
            AgentError::Fatal(format!("mailbox closed for {}", self.role.name()))
        })?;

        reply_rx.await.map_err(|_| {
            AgentError::Fatal(format!("reply dropped by {}", self.role.name()))
        })?
    }
}

/// The exchange wires agents to mailboxes and owns their serving tasks
pub struct Exchange {
    pool: Arc<Semaphore>,
    senders: HashMap<AgentRole, mpsc::Sender<Envelope>>,
    tasks: Vec<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
}

impl Exchange {
    /// Create an exchange whose worker pool admits `pool_size` concurrently
    /// blocking actions
    pub fn new(pool_size: usize) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            pool: Arc::new(Semaphore::new(pool_size.max(1))),
            senders: HashMap::new(),
            tasks: Vec::new(),
            shutdown_tx,
        }
    }

    /// Register an agent and spawn its mailbox task. Re-registering a role
    /// replaces the previous mailbox; in-flight requests to the old mailbox
    /// still drain.
    pub fn register(&mut self, agent: Box<dyn Agent>) -> AgentHandle {
        let role = agent.role();
        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        let task = tokio::spawn(serve(agent, rx, self.pool.clone(), self.shutdown_tx.subscribe()));

        self.senders.insert(role, tx.clone());
        self.tasks.push(task);

        AgentHandle { role, tx }
    }

    /// Look up the handle for a registered role
    pub fn handle(&self, role: AgentRole) -> Option<AgentHandle> {
        self.senders.get(&role).map(|tx| AgentHandle {
            role,
            tx: tx.clone(),
        })
    }

    /// Number of registered agents
    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }

    /// Signal every mailbox task to stop and wait for them to drain.
    ///
    /// Handles cloned before shutdown keep their sender halves; their calls
    /// after shutdown fail with a fatal channel error instead of hanging.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);
        self.senders.clear();
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
    }
}

/// Mailbox loop: one agent, one task, requests processed in arrival order
async fn serve(
    mut agent: Box<dyn Agent>,
    mut rx: mpsc::Receiver<Envelope>,
    pool: Arc<Semaphore>,
    mut stop: watch::Receiver<bool>,
) {
    let role = agent.role();
    loop {
        let envelope = tokio::select! {
            maybe = rx.recv() => match maybe {
                Some(envelope) => envelope,
                None => break,
            },
            _ = stop.changed() => break,
        };

        let permit = match pool.acquire().await {
            Ok(permit) => permit,
            // Pool closed means the exchange is tearing down
            Err(_) => break,
        };

        log::debug!("{} handling {}", role.name(), envelope.request.verb());
        let result = agent.handle(envelope.request).await;
        drop(permit);

        // A dropped receiver just means the caller gave up waiting
        let _ = envelope.reply.send(result);
    }
}
