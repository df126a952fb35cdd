//! Drafting agent
//!
//! Produces the research document: a fresh draft on the first iteration,
//! improvements driven by critic feedback afterwards. Keeps the latest
//! draft as role-local state.

use std::sync::Arc;

use async_trait::async_trait;

use crate::agents::{ActionRequest, ActionResponse, Agent, AgentError, AgentResult, AgentRole};
use crate::backend::{GenerateParams, ModelBackend};
use crate::domain::Draft;
use crate::prompt;

pub struct DraftingAgent {
    backend: Arc<dyn ModelBackend>,
    temperature: f32,
    current: Option<Draft>,
}

impl DraftingAgent {
    pub fn new(backend: Arc<dyn ModelBackend>, temperature: f32) -> Self {
        Self {
            backend,
            temperature,
            current: None,
        }
    }
}

#[async_trait]
impl Agent for DraftingAgent {
    fn role(&self) -> AgentRole {
        AgentRole::Drafting
    }

    async fn handle(&mut self, request: ActionRequest) -> AgentResult {
        let params = GenerateParams::with_temperature(self.temperature);
        match request {
            ActionRequest::DraftDocument {
                topic,
                plan_text,
                digest,
                iteration,
            } => {
                let generation = self
                    .backend
                    .generate(&prompt::draft_prompt(&topic, &plan_text, &digest), "", params)
                    .await?;
                let draft = Draft::new(prompt::clean_report(&generation.text), iteration);
                self.current = Some(draft.clone());
                Ok(ActionResponse::Draft(draft))
            }
            ActionRequest::ImproveDraft {
                draft,
                feedback,
                iteration,
            } => {
                let generation = self
                    .backend
                    .generate(
                        &prompt::improve_draft_prompt(&draft.content, &feedback),
                        "",
                        params,
                    )
                    .await?;
                let improved = Draft::new(prompt::clean_report(&generation.text), iteration);
                self.current = Some(improved.clone());
                Ok(ActionResponse::Draft(improved))
            }
            other => Err(AgentError::unsupported(self.role(), &other)),
        }
    }
}
