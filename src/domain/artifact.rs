//! Plan, draft, code, and source-digest artifacts
//!
//! Each artifact type carries a revision counter owned by exactly one agent.
//! Superseded revisions are retained in the store for audit; the counters
//! are strictly increasing within a run.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A research/coding plan produced by the Planner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// Ordered plan steps
    pub steps: Vec<String>,

    /// Revision counter, starts at 1 and increments on every revision
    pub revision: u32,

    /// Planner's reasoning about requested changes (revisions only)
    pub reasoning: Option<String>,
}

impl Plan {
    /// Create the initial plan from raw planner output
    pub fn initial(text: &str) -> Self {
        Self {
            steps: split_steps(text),
            revision: 1,
            reasoning: None,
        }
    }

    /// Create the next revision of this plan from raw planner output
    pub fn revised(&self, text: &str, reasoning: Option<String>) -> Self {
        Self {
            steps: split_steps(text),
            revision: self.revision + 1,
            reasoning,
        }
    }

    /// Overlay gate edits onto the approved revision.
    ///
    /// The revision counter tracks planner-generated revisions only; an
    /// approve-with-edits verdict amends the same revision in place.
    pub fn edited(&self, text: &str) -> Self {
        Self {
            steps: split_steps(text),
            revision: self.revision,
            reasoning: Some("edited at the approval gate".to_string()),
        }
    }

    /// Render the plan back into a single prompt-ready text block
    pub fn as_text(&self) -> String {
        self.steps.join("\n")
    }
}

/// Split raw plan text into steps, one per non-empty line
fn split_steps(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// A research document draft produced by the Drafting agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Draft {
    pub content: String,
    /// Iteration that produced this draft
    pub iteration: u32,
}

impl Draft {
    pub fn new(content: impl Into<String>, iteration: u32) -> Self {
        Self {
            content: content.into(),
            iteration,
        }
    }
}

/// Executable source produced by the CodeWriter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeArtifact {
    /// Source text
    pub source: String,

    /// Interpreter the source targets, e.g. "python3"
    pub interpreter: String,

    /// Revision counter, strictly increasing within a run
    pub revision: u32,

    /// Iteration that produced this revision
    pub iteration: u32,
}

impl CodeArtifact {
    pub fn new(source: impl Into<String>, interpreter: impl Into<String>, iteration: u32) -> Self {
        Self {
            source: source.into(),
            interpreter: interpreter.into(),
            revision: 1,
            iteration,
        }
    }

    /// Create the next revision with replacement source
    pub fn superseded_by(&self, source: impl Into<String>, iteration: u32) -> Self {
        Self {
            source: source.into(),
            interpreter: self.interpreter.clone(),
            revision: self.revision + 1,
            iteration,
        }
    }
}

/// One input handed to the Source-Aggregator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceInput {
    /// A PDF document on disk (text extraction stays behind the collector)
    Pdf { path: PathBuf },
    /// A web URL fetched and reduced to text
    Url { url: String },
    /// A directory whose file inventory is summarized
    Directory { path: PathBuf },
}

/// The combined digest the Source-Aggregator hands to the other agents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDigest {
    pub content: String,

    /// True when one or more inputs could not be collected and the digest
    /// only covers what succeeded
    pub degraded: bool,
}

impl SourceDigest {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            degraded: false,
        }
    }

    /// Build a degraded digest that records why collection fell short
    pub fn degraded(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            degraded: true,
        }
    }
}
