//! Source-Aggregator agent
//!
//! Thin wrapper over the collection seam: turns the configured inputs into
//! the digest every other agent consumes. Partial collection failures come
//! back as a degraded digest, never as an error.

use std::sync::Arc;

use async_trait::async_trait;

use crate::agents::{ActionRequest, ActionResponse, Agent, AgentError, AgentResult, AgentRole};
use crate::collect::SourceCollector;

pub struct SourceAggregatorAgent {
    collector: Arc<dyn SourceCollector>,
}

impl SourceAggregatorAgent {
    pub fn new(collector: Arc<dyn SourceCollector>) -> Self {
        Self { collector }
    }
}

#[async_trait]
impl Agent for SourceAggregatorAgent {
    fn role(&self) -> AgentRole {
        AgentRole::SourceAggregator
    }

    async fn handle(&mut self, request: ActionRequest) -> AgentResult {
        match request {
            ActionRequest::GatherSources { topic, inputs } => {
                let digest = self.collector.collect(&topic, &inputs).await;
                if digest.degraded {
                    log::warn!("digest degraded: some sources were not collected");
                }
                Ok(ActionResponse::Digest(digest))
            }
            other => Err(AgentError::unsupported(self.role(), &other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::BasicCollector;
    use crate::domain::SourceInput;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_gather_sources_returns_digest() {
        let mut agent = SourceAggregatorAgent::new(Arc::new(BasicCollector::new()));
        let response = agent
            .handle(ActionRequest::GatherSources {
                topic: "ion channels".into(),
                inputs: vec![],
            })
            .await
            .unwrap();

        let ActionResponse::Digest(digest) = response else {
            panic!("expected digest");
        };
        assert!(digest.content.contains("ion channels"));
        assert!(!digest.degraded);
    }

    #[tokio::test]
    async fn test_gather_sources_degrades_on_bad_input() {
        let mut agent = SourceAggregatorAgent::new(Arc::new(BasicCollector::new()));
        let response = agent
            .handle(ActionRequest::GatherSources {
                topic: "t".into(),
                inputs: vec![SourceInput::Pdf {
                    path: PathBuf::from("/missing/file.pdf"),
                }],
            })
            .await
            .unwrap();

        let ActionResponse::Digest(digest) = response else {
            panic!("expected digest");
        };
        assert!(digest.degraded);
    }

    #[tokio::test]
    async fn test_unsupported_action_rejected() {
        let mut agent = SourceAggregatorAgent::new(Arc::new(BasicCollector::new()));
        let request = ActionRequest::CreateCodingPlan {
            topic: "t".into(),
            plan_text: "p".into(),
            digest: "d".into(),
        };
        assert!(agent.handle(request).await.is_err());
    }
}
