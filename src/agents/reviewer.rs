//! Reviewer agent
//!
//! Inspects failed executions. Two backend passes: analyze the failure, then
//! produce a fixed script. If the fix is empty or identical to the failing
//! source the verdict is an escalation to the Critic instead of a patch.

use std::sync::Arc;

use async_trait::async_trait;

use crate::agents::{ActionRequest, ActionResponse, Agent, AgentError, AgentResult, AgentRole};
use crate::backend::{GenerateParams, ModelBackend};
use crate::domain::ReviewVerdict;
use crate::prompt;

pub struct ReviewerAgent {
    backend: Arc<dyn ModelBackend>,
    temperature: f32,
}

impl ReviewerAgent {
    pub fn new(backend: Arc<dyn ModelBackend>, temperature: f32) -> Self {
        Self {
            backend,
            temperature,
        }
    }
}

#[async_trait]
impl Agent for ReviewerAgent {
    fn role(&self) -> AgentRole {
        AgentRole::Reviewer
    }

    async fn handle(&mut self, request: ActionRequest) -> AgentResult {
        match request {
            ActionRequest::ReviewFailure { artifact, outcome } => {
                let params = GenerateParams::with_temperature(self.temperature);
                let transcript = outcome.transcript();

                let analysis = self
                    .backend
                    .generate(
                        &prompt::review_analysis_prompt(&artifact.source, &transcript),
                        "",
                        params.clone(),
                    )
                    .await?;
                let fix = self
                    .backend
                    .generate(
                        &prompt::review_fix_prompt(
                            &artifact.source,
                            &transcript,
                            &prompt::strip_reasoning(&analysis.text),
                        ),
                        "",
                        params,
                    )
                    .await?;

                let patched = prompt::extract_code_block(&fix.text);
                if patched.is_empty() || patched == artifact.source {
                    log::info!("reviewer found no viable patch, escalating to critic");
                    return Ok(ActionResponse::Review(ReviewVerdict::Escalate));
                }

                let next = artifact.superseded_by(patched, artifact.iteration);
                Ok(ActionResponse::Review(ReviewVerdict::Patched(next)))
            }
            other => Err(AgentError::unsupported(self.role(), &other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ScriptedBackend;
    use crate::domain::{CodeArtifact, ExecutionOutcome, OutcomeKind};
    use std::time::Duration;

    fn failed_outcome() -> ExecutionOutcome {
        ExecutionOutcome::failure(
            OutcomeKind::RuntimeFailure,
            "",
            "NameError: name 'pd' is not defined",
            Duration::from_secs(1),
        )
    }

    fn review(artifact: CodeArtifact) -> ActionRequest {
        ActionRequest::ReviewFailure {
            artifact,
            outcome: failed_outcome(),
        }
    }

    #[tokio::test]
    async fn test_patched_verdict_bumps_revision() {
        let backend = Arc::new(ScriptedBackend::with_texts(vec![
            "missing import of pandas",
            "```python\nimport pandas as pd\nprint(pd.__version__)\n```",
        ]));
        let mut reviewer = ReviewerAgent::new(backend.clone(), 0.1);

        let artifact = CodeArtifact::new("print(pd.__version__)", "python3", 1);
        let response = reviewer.handle(review(artifact)).await.unwrap();

        let ActionResponse::Review(ReviewVerdict::Patched(patched)) = response else {
            panic!("expected a patch");
        };
        assert_eq!(patched.revision, 2);
        assert!(patched.source.contains("import pandas"));
        // Both passes saw the failing transcript
        assert!(backend.prompts()[0].contains("NameError"));
        assert!(backend.prompts()[1].contains("NameError"));
    }

    #[tokio::test]
    async fn test_identical_fix_escalates() {
        let backend = Arc::new(ScriptedBackend::with_texts(vec![
            "cannot tell",
            "```python\nprint(pd.__version__)\n```",
        ]));
        let mut reviewer = ReviewerAgent::new(backend, 0.1);

        let artifact = CodeArtifact::new("print(pd.__version__)", "python3", 1);
        let response = reviewer.handle(review(artifact)).await.unwrap();

        assert!(matches!(
            response,
            ActionResponse::Review(ReviewVerdict::Escalate)
        ));
    }

    #[tokio::test]
    async fn test_empty_fix_escalates() {
        let backend = Arc::new(ScriptedBackend::with_texts(vec!["analysis", ""]));
        let mut reviewer = ReviewerAgent::new(backend, 0.1);

        let artifact = CodeArtifact::new("x = 1", "python3", 1);
        let response = reviewer.handle(review(artifact)).await.unwrap();

        assert!(matches!(
            response,
            ActionResponse::Review(ReviewVerdict::Escalate)
        ));
    }

    #[tokio::test]
    async fn test_unsupported_action_rejected() {
        let backend = Arc::new(ScriptedBackend::always("x"));
        let mut reviewer = ReviewerAgent::new(backend, 0.1);
        let request = ActionRequest::GatherSources {
            topic: "t".into(),
            inputs: vec![],
        };
        assert!(reviewer.handle(request).await.is_err());
    }
}
