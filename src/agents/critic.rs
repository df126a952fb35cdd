//! Critic agent
//!
//! Reviews the whole iteration: the draft against its sources, the code
//! against its execution outcome, then folds both into one actionable
//! summary with a continue/stop recommendation the orchestrator's stop
//! policy consumes.

use std::sync::Arc;

use async_trait::async_trait;

use crate::agents::{ActionRequest, ActionResponse, Agent, AgentError, AgentResult, AgentRole};
use crate::backend::{GenerateParams, ModelBackend};
use crate::domain::{CritiqueSummary, Recommendation};
use crate::prompt;

pub struct CriticAgent {
    backend: Arc<dyn ModelBackend>,
    temperature: f32,
}

impl CriticAgent {
    pub fn new(backend: Arc<dyn ModelBackend>, temperature: f32) -> Self {
        Self {
            backend,
            temperature,
        }
    }
}

/// Pull the recommendation line out of the summary text
fn parse_recommendation(summary: &str) -> Recommendation {
    for line in summary.lines().rev() {
        let lowered = line.to_lowercase();
        if let Some(rest) = lowered.trim().strip_prefix("recommendation:") {
            if rest.trim().starts_with("stop") {
                return Recommendation::Stop;
            }
            return Recommendation::Continue;
        }
    }
    Recommendation::Continue
}

#[async_trait]
impl Agent for CriticAgent {
    fn role(&self) -> AgentRole {
        AgentRole::Critic
    }

    async fn handle(&mut self, request: ActionRequest) -> AgentResult {
        match request {
            ActionRequest::Critique {
                plan_text: _,
                draft,
                artifact,
                outcome,
                digest,
            } => {
                let params = GenerateParams::with_temperature(self.temperature);

                let research_gaps = match &draft {
                    Some(draft) => {
                        let generation = self
                            .backend
                            .generate(
                                &prompt::critique_document_prompt(&draft.content, &digest),
                                "",
                                params.clone(),
                            )
                            .await?;
                        Some(prompt::strip_reasoning(&generation.text))
                    }
                    None => None,
                };

                let code_issues = match (&artifact, &outcome) {
                    (Some(artifact), Some(outcome)) => {
                        let generation = self
                            .backend
                            .generate(
                                &prompt::critique_code_prompt(
                                    &artifact.source,
                                    &outcome.transcript(),
                                    outcome.reasoning.as_deref(),
                                ),
                                "",
                                params.clone(),
                            )
                            .await?;
                        Some(prompt::strip_reasoning(&generation.text))
                    }
                    _ => None,
                };

                let generation = self
                    .backend
                    .generate(
                        &prompt::critique_summary_prompt(
                            research_gaps.as_deref().unwrap_or(""),
                            code_issues.as_deref().unwrap_or(""),
                        ),
                        "",
                        params,
                    )
                    .await?;
                let summary = prompt::strip_reasoning(&generation.text);
                let recommendation = parse_recommendation(&summary);

                Ok(ActionResponse::Critique(CritiqueSummary {
                    research_gaps,
                    code_issues,
                    summary,
                    recommendation,
                }))
            }
            other => Err(AgentError::unsupported(self.role(), &other)),
        }
    }
}
