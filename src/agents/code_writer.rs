//! Code-Writer agent
//!
//! Produces the coding plan shown at the second approval gate and the
//! runnable code artifact. The active artifact revision is role-local state
//! and strictly increases within a run; superseded revisions live on in the
//! artifact store.

use std::sync::Arc;

use async_trait::async_trait;

use crate::agents::{ActionRequest, ActionResponse, Agent, AgentError, AgentResult, AgentRole};
use crate::backend::{GenerateParams, ModelBackend};
use crate::domain::CodeArtifact;
use crate::prompt;

/// Interpreter every generated artifact targets
const DEFAULT_INTERPRETER: &str = "python3";

pub struct CodeWriterAgent {
    backend: Arc<dyn ModelBackend>,
    temperature: f32,
    current: Option<CodeArtifact>,
}

impl CodeWriterAgent {
    pub fn new(backend: Arc<dyn ModelBackend>, temperature: f32) -> Self {
        Self {
            backend,
            temperature,
            current: None,
        }
    }

    fn stamp(&mut self, source: String, iteration: u32) -> CodeArtifact {
        let artifact = match &self.current {
            Some(previous) => previous.superseded_by(source, iteration),
            None => CodeArtifact::new(source, DEFAULT_INTERPRETER, iteration),
        };
        self.current = Some(artifact.clone());
        artifact
    }
}

#[async_trait]
impl Agent for CodeWriterAgent {
    fn role(&self) -> AgentRole {
        AgentRole::CodeWriter
    }

    async fn handle(&mut self, request: ActionRequest) -> AgentResult {
        let params = GenerateParams::with_temperature(self.temperature);
        match request {
            ActionRequest::CreateCodingPlan {
                topic,
                plan_text,
                digest,
            } => {
                let generation = self
                    .backend
                    .generate(
                        &prompt::coding_plan_prompt(&topic, &plan_text, &digest),
                        "",
                        params,
                    )
                    .await?;
                Ok(ActionResponse::CodingPlan(prompt::strip_reasoning(
                    &generation.text,
                )))
            }
            ActionRequest::ImproveCodingPlan {
                coding_plan,
                feedback,
            } => {
                let generation = self
                    .backend
                    .generate(
                        &prompt::improve_coding_plan_prompt(&coding_plan, &feedback),
                        "",
                        params,
                    )
                    .await?;
                Ok(ActionResponse::CodingPlan(prompt::strip_reasoning(
                    &generation.text,
                )))
            }
            ActionRequest::WriteCode {
                topic,
                plan_text,
                coding_plan,
                digest,
                iteration,
            } => {
                let generation = self
                    .backend
                    .generate(
                        &prompt::write_code_prompt(&topic, &plan_text, &coding_plan, &digest),
                        "",
                        params,
                    )
                    .await?;
                let source = prompt::extract_code_block(&generation.text);
                Ok(ActionResponse::Code(self.stamp(source, iteration)))
            }
            ActionRequest::ImproveCode {
                artifact,
                feedback,
                iteration,
            } => {
                let generation = self
                    .backend
                    .generate(
                        &prompt::improve_code_prompt(&artifact.source, &feedback),
                        "",
                        params,
                    )
                    .await?;
                let source = prompt::extract_code_block(&generation.text);
                Ok(ActionResponse::Code(self.stamp(source, iteration)))
            }
            other => Err(AgentError::unsupported(self.role(), &other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ScriptedBackend;

    fn write_code(iteration: u32) -> ActionRequest {
        ActionRequest::WriteCode {
            topic: "t".into(),
            plan_text: "p".into(),
            coding_plan: "cp".into(),
            digest: "d".into(),
            iteration,
        }
    }

    #[tokio::test]
    async fn test_write_code_extracts_fence() {
        let backend = Arc::new(ScriptedBackend::with_texts(vec![
            "Here it is:\n```python\nprint('run')\n```",
        ]));
        let mut agent = CodeWriterAgent::new(backend, 0.2);

        let response = agent.handle(write_code(1)).await.unwrap();
        let ActionResponse::Code(artifact) = response else {
            panic!("expected code");
        };

        assert_eq!(artifact.source, "print('run')");
        assert_eq!(artifact.interpreter, "python3");
        assert_eq!(artifact.revision, 1);
    }

    #[tokio::test]
    async fn test_revisions_strictly_increase() {
        let backend = Arc::new(ScriptedBackend::with_texts(vec![
            "```python\nv1\n```",
            "```python\nv2\n```",
            "```python\nv3\n```",
        ]));
        let mut agent = CodeWriterAgent::new(backend, 0.2);

        let mut revisions = Vec::new();
        for iteration in 1..=2 {
            let ActionResponse::Code(artifact) = agent.handle(write_code(iteration)).await.unwrap()
            else {
                panic!("expected code");
            };
            revisions.push(artifact.revision);
        }
        let ActionResponse::Code(artifact) = agent
            .handle(ActionRequest::ImproveCode {
                artifact: CodeArtifact::new("v2", "python3", 2),
                feedback: "fix seed".into(),
                iteration: 3,
            })
            .await
            .unwrap()
        else {
            panic!("expected code");
        };
        revisions.push(artifact.revision);

        assert_eq!(revisions, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_coding_plan_roundtrip() {
        let backend = Arc::new(ScriptedBackend::with_texts(vec![
            "plan: single script",
            "plan: single script with tests",
        ]));
        let mut agent = CodeWriterAgent::new(backend.clone(), 0.2);

        let ActionResponse::CodingPlan(plan) = agent
            .handle(ActionRequest::CreateCodingPlan {
                topic: "t".into(),
                plan_text: "p".into(),
                digest: "d".into(),
            })
            .await
            .unwrap()
        else {
            panic!("expected coding plan");
        };
        assert_eq!(plan, "plan: single script");

        let ActionResponse::CodingPlan(improved) = agent
            .handle(ActionRequest::ImproveCodingPlan {
                coding_plan: plan,
                feedback: "add tests".into(),
            })
            .await
            .unwrap()
        else {
            panic!("expected coding plan");
        };
        assert!(improved.contains("tests"));
        assert!(backend.prompts()[1].contains("add tests"));
    }

    #[tokio::test]
    async fn test_unsupported_action_rejected() {
        let backend = Arc::new(ScriptedBackend::always("x"));
        let mut agent = CodeWriterAgent::new(backend, 0.2);
        let request = ActionRequest::GatherSources {
            topic: "t".into(),
            inputs: vec![],
        };
        assert!(agent.handle(request).await.is_err());
    }
}
