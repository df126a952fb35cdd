//! Critic summaries and reviewer verdicts

use crate::domain::CodeArtifact;
use serde::{Deserialize, Serialize};

/// The Critic's recommendation for the next loop decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recommendation {
    Continue,
    Stop,
}

/// Structured critique of one iteration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CritiqueSummary {
    /// Gaps found in the research draft, if one was reviewed
    pub research_gaps: Option<String>,

    /// Issues found in the code and its execution, if reviewed
    pub code_issues: Option<String>,

    /// Combined summary fed back into the next iteration's planning
    pub summary: String,

    pub recommendation: Recommendation,
}

impl CritiqueSummary {
    /// Render the feedback block carried into the next iteration
    pub fn feedback_text(&self) -> String {
        let mut parts = vec![self.summary.clone()];
        if let Some(gaps) = &self.research_gaps {
            parts.push(format!("Research gaps:\n{}", gaps));
        }
        if let Some(issues) = &self.code_issues {
            parts.push(format!("Code issues:\n{}", issues));
        }
        parts.join("\n\n")
    }
}

/// The Reviewer's decision after inspecting a failed execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ReviewVerdict {
    /// A patched artifact to re-execute, consuming one attempt
    Patched(CodeArtifact),
    /// No viable patch; hand the failure through to the Critic
    Escalate,
}

impl ReviewVerdict {
    pub fn is_patched(&self) -> bool {
        matches!(self, ReviewVerdict::Patched(_))
    }
}
