//! Domain records shared across the workflow
//!
//! Everything the orchestrator, agents, and store exchange lives here:
//! runs, iterations, artifacts, execution outcomes, remote job records, and
//! critiques. Records are serde-serializable so the artifact store can
//! persist them as-is.

mod artifact;
mod critique;
mod iteration;
mod job;
mod outcome;
mod run;

pub use artifact::{CodeArtifact, Draft, Plan, SourceDigest, SourceInput};
pub use critique::{CritiqueSummary, Recommendation, ReviewVerdict};
pub use iteration::IterationRecord;
pub use job::{JobRecord, JobState};
pub use outcome::{ExecutionOutcome, OutcomeKind};
pub use run::{Run, RunMode, RunResult, RunStatus};
