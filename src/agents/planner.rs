//! Planner agent
//!
//! Owns the plan: produces the initial version and revises it in response to
//! orchestrator-forwarded critic feedback or human rejection guidance. The
//! current plan is role-local state; everyone else sees read-only snapshots.

use std::sync::Arc;

use async_trait::async_trait;

use crate::agents::{ActionRequest, ActionResponse, Agent, AgentError, AgentResult, AgentRole};
use crate::backend::{GenerateParams, ModelBackend};
use crate::domain::Plan;
use crate::prompt;

pub struct PlannerAgent {
    backend: Arc<dyn ModelBackend>,
    temperature: f32,
    /// The current plan; revisions build on it
    current: Option<Plan>,
}

impl PlannerAgent {
    pub fn new(backend: Arc<dyn ModelBackend>, temperature: f32) -> Self {
        Self {
            backend,
            temperature,
            current: None,
        }
    }
}

#[async_trait]
impl Agent for PlannerAgent {
    fn role(&self) -> AgentRole {
        AgentRole::Planner
    }

    async fn handle(&mut self, request: ActionRequest) -> AgentResult {
        match request {
            ActionRequest::CreatePlan {
                topic,
                digest,
                mode,
                guidance,
                feedback,
            } => {
                let params = GenerateParams::with_temperature(self.temperature);
                let generation = self
                    .backend
                    .generate(
                        &prompt::plan_prompt(
                            &topic,
                            &digest,
                            mode,
                            guidance.as_deref(),
                            feedback.as_deref(),
                        ),
                        "",
                        params.clone(),
                    )
                    .await?;
                let text = prompt::strip_reasoning(&generation.text);

                // Explain how rejection guidance was folded in, revisions only
                let reasoning = match &guidance {
                    Some(changes) => {
                        let explanation = self
                            .backend
                            .generate(&prompt::plan_reasoning_prompt(changes, &topic), "", params)
                            .await?;
                        Some(prompt::strip_reasoning(&explanation.text))
                    }
                    None => None,
                };

                let plan = match &self.current {
                    Some(previous) => previous.revised(&text, reasoning),
                    None => Plan::initial(&text),
                };
                self.current = Some(plan.clone());
                Ok(ActionResponse::Plan(plan))
            }
            other => Err(AgentError::unsupported(self.role(), &other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ScriptedBackend;
    use crate::domain::RunMode;

    fn create_plan(guidance: Option<&str>, feedback: Option<&str>) -> ActionRequest {
        ActionRequest::CreatePlan {
            topic: "enzyme kinetics".into(),
            digest: "digest".into(),
            mode: RunMode::Both,
            guidance: guidance.map(str::to_string),
            feedback: feedback.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_initial_plan_revision_one() {
        let backend = Arc::new(ScriptedBackend::with_texts(vec!["1. read papers\n2. fit model"]));
        let mut planner = PlannerAgent::new(backend, 0.3);

        let response = planner.handle(create_plan(None, None)).await.unwrap();
        let ActionResponse::Plan(plan) = response else {
            panic!("expected plan");
        };

        assert_eq!(plan.revision, 1);
        assert_eq!(plan.steps.len(), 2);
        assert!(plan.reasoning.is_none());
    }

    #[tokio::test]
    async fn test_revision_increments_and_explains_guidance() {
        let backend = Arc::new(ScriptedBackend::with_texts(vec![
            "1. a\n2. b",
            "1. a\n2. b\n3. c",
            "added a validation step",
        ]));
        let mut planner = PlannerAgent::new(backend.clone(), 0.3);

        planner.handle(create_plan(None, None)).await.unwrap();
        let response = planner
            .handle(create_plan(Some("add validation"), None))
            .await
            .unwrap();
        let ActionResponse::Plan(plan) = response else {
            panic!("expected plan");
        };

        assert_eq!(plan.revision, 2);
        assert_eq!(plan.steps.len(), 3);
        assert_eq!(plan.reasoning.as_deref(), Some("added a validation step"));
        // Guidance reached the prompt
        assert!(backend.prompts()[1].contains("add validation"));
    }

    #[tokio::test]
    async fn test_feedback_reaches_prompt() {
        let backend = Arc::new(ScriptedBackend::always("1. x"));
        let mut planner = PlannerAgent::new(backend.clone(), 0.3);

        planner
            .handle(create_plan(None, Some("the baseline was wrong")))
            .await
            .unwrap();
        assert!(backend.prompts()[0].contains("the baseline was wrong"));
    }

    #[tokio::test]
    async fn test_transient_backend_error_propagates() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            crate::backend::ScriptedReply::Transient("down".into()),
        ]));
        let mut planner = PlannerAgent::new(backend, 0.3);

        let err = planner.handle(create_plan(None, None)).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_unsupported_action_rejected() {
        let backend = Arc::new(ScriptedBackend::always("x"));
        let mut planner = PlannerAgent::new(backend, 0.3);

        let request = ActionRequest::GatherSources {
            topic: "t".into(),
            inputs: vec![],
        };
        let err = planner.handle(request).await.unwrap_err();
        assert!(err.to_string().contains("unsupported"));
    }
}
