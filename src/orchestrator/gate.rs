//! Human approval gates
//!
//! Suspension points where the loop waits for a human verdict on a plan or
//! coding plan. The console gate blocks on stdin; the scripted variants
//! drive tests. Timeouts are applied by the orchestrator around the gate
//! call, not inside the gate itself.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use colored::Colorize;

/// Which artifact the gate is reviewing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateKind {
    Plan,
    CodingPlan,
}

impl GateKind {
    fn label(&self) -> &'static str {
        match self {
            GateKind::Plan => "plan",
            GateKind::CodingPlan => "coding plan",
        }
    }
}

/// The human's verdict on a gated artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalDecision {
    Approve,
    /// Approve, but substitute the edited text
    ApproveWithEdits(String),
    /// Reject with free-text guidance for regeneration
    Reject(String),
}

/// One approval checkpoint
#[async_trait]
pub trait ApprovalGate: Send + Sync {
    async fn review(&self, kind: GateKind, content: &str) -> ApprovalDecision;
}

/// Gate that approves everything; unattended runs and tests
pub struct AutoGate;

#[async_trait]
impl ApprovalGate for AutoGate {
    async fn review(&self, kind: GateKind, _content: &str) -> ApprovalDecision {
        log::info!("auto-approving {}", kind.label());
        ApprovalDecision::Approve
    }
}

/// Gate that replays a scripted decision sequence; tests
pub struct ScriptedGate {
    decisions: Mutex<VecDeque<ApprovalDecision>>,
}

impl ScriptedGate {
    pub fn new(decisions: Vec<ApprovalDecision>) -> Self {
        Self {
            decisions: Mutex::new(decisions.into()),
        }
    }

    /// Decisions not yet consumed
    pub fn remaining(&self) -> usize {
        self.decisions.lock().unwrap().len()
    }
}

#[async_trait]
impl ApprovalGate for ScriptedGate {
    async fn review(&self, _kind: GateKind, _content: &str) -> ApprovalDecision {
        self.decisions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ApprovalDecision::Approve)
    }
}

/// Interactive gate reading verdicts from stdin
pub struct ConsoleGate;

impl ConsoleGate {
    fn read_line(prompt_text: &str) -> String {
        use std::io::Write;

        print!("{}", prompt_text);
        let _ = std::io::stdout().flush();
        let mut line = String::new();
        let _ = std::io::stdin().read_line(&mut line);
        line.trim().to_string()
    }

    fn ask(kind: GateKind, content: String) -> ApprovalDecision {
        println!("\n{}", format!("--- proposed {} ---", kind.label()).cyan());
        println!("{}", content);
        println!("{}", format!("--- end of {} ---", kind.label()).cyan());

        loop {
            let answer = Self::read_line(&format!(
                "Approve this {}? [y]es / [n]o / [e]dit: ",
                kind.label()
            ))
            .to_lowercase();
            match answer.as_str() {
                "y" | "yes" => return ApprovalDecision::Approve,
                "n" | "no" => {
                    let feedback = Self::read_line("Describe the changes you want: ");
                    return ApprovalDecision::Reject(feedback);
                }
                "e" | "edit" => {
                    println!("Enter the replacement text, end with a single '.' line:");
                    let mut lines = Vec::new();
                    loop {
                        let line = Self::read_line("");
                        if line == "." {
                            break;
                        }
                        lines.push(line);
                    }
                    return ApprovalDecision::ApproveWithEdits(lines.join("\n"));
                }
                _ => println!("{}", "Please answer y, n, or e.".yellow()),
            }
        }
    }
}

#[async_trait]
impl ApprovalGate for ConsoleGate {
    async fn review(&self, kind: GateKind, content: &str) -> ApprovalDecision {
        let content = content.to_string();
        // stdin blocks; keep it off the async workers
        tokio::task::spawn_blocking(move || Self::ask(kind, content))
            .await
            .unwrap_or(ApprovalDecision::Reject("gate task failed".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_auto_gate_approves() {
        let gate = AutoGate;
        assert_eq!(
            gate.review(GateKind::Plan, "any plan").await,
            ApprovalDecision::Approve
        );
        assert_eq!(
            gate.review(GateKind::CodingPlan, "any coding plan").await,
            ApprovalDecision::Approve
        );
    }

    #[tokio::test]
    async fn test_scripted_gate_replays_in_order() {
        let gate = ScriptedGate::new(vec![
            ApprovalDecision::Reject("tighter scope".into()),
            ApprovalDecision::ApproveWithEdits("1. only step".into()),
            ApprovalDecision::Approve,
        ]);

        assert_eq!(
            gate.review(GateKind::Plan, "v1").await,
            ApprovalDecision::Reject("tighter scope".into())
        );
        assert_eq!(
            gate.review(GateKind::Plan, "v2").await,
            ApprovalDecision::ApproveWithEdits("1. only step".into())
        );
        assert_eq!(gate.review(GateKind::Plan, "v3").await, ApprovalDecision::Approve);
        assert_eq!(gate.remaining(), 0);
    }

    #[tokio::test]
    async fn test_scripted_gate_defaults_to_approve() {
        let gate = ScriptedGate::new(vec![]);
        assert_eq!(gate.review(GateKind::Plan, "x").await, ApprovalDecision::Approve);
    }

    #[test]
    fn test_gate_kind_labels() {
        assert_eq!(GateKind::Plan.label(), "plan");
        assert_eq!(GateKind::CodingPlan.label(), "coding plan");
    }
}
