//! Iteration records
//!
//! One IterationRecord per pass through the refinement loop. Records are
//! sealed once their execution outcome and critique are in; sealed records
//! never change — the next iteration supersedes them.

use crate::domain::{CritiqueSummary, ExecutionOutcome};
use crate::error::{AgentLabError, Result};
use crate::id::now_ms;
use serde::{Deserialize, Serialize};

/// One pass through the refinement loop within a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationRecord {
    /// 1-based sequence number, gapless within a run
    pub sequence: u32,

    /// Plan revision used by this iteration
    pub plan_revision: u32,

    /// Code revision executed by this iteration, if the mode includes code
    pub code_revision: Option<u32>,

    /// The single sealed outcome of this iteration's final execution attempt
    pub outcome: Option<ExecutionOutcome>,

    /// Critic summary recorded at seal time
    pub critique: Option<CritiqueSummary>,

    sealed: bool,

    pub started_at: u64,
    pub sealed_at: Option<u64>,
}

impl IterationRecord {
    /// Open a new iteration at the given sequence number
    pub fn new(sequence: u32, plan_revision: u32) -> Self {
        Self {
            sequence,
            plan_revision,
            code_revision: None,
            outcome: None,
            critique: None,
            sealed: false,
            started_at: now_ms(),
            sealed_at: None,
        }
    }

    /// Returns true once the record is immutable
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Record which code revision this iteration executed
    pub fn set_code_revision(&mut self, revision: u32) -> Result<()> {
        self.guard_mutable()?;
        self.code_revision = Some(revision);
        Ok(())
    }

    /// Seal the record with its outcome and critique. One-way.
    pub fn seal(&mut self, outcome: ExecutionOutcome, critique: CritiqueSummary) -> Result<()> {
        self.guard_mutable()?;
        self.outcome = Some(outcome);
        self.critique = Some(critique);
        self.sealed = true;
        self.sealed_at = Some(now_ms());
        Ok(())
    }

    fn guard_mutable(&self) -> Result<()> {
        if self.sealed {
            return Err(AgentLabError::InvalidState(format!(
                "iteration {} is sealed",
                self.sequence
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OutcomeKind, Recommendation};
    use std::time::Duration;

    fn sample_outcome() -> ExecutionOutcome {
        ExecutionOutcome::success("ok", "", Duration::from_secs(1))
    }

    fn sample_critique() -> CritiqueSummary {
        CritiqueSummary {
            research_gaps: None,
            code_issues: None,
            summary: "fine".into(),
            recommendation: Recommendation::Stop,
        }
    }

    #[test]
    fn test_new_iteration_is_open() {
        let iter = IterationRecord::new(1, 1);
        assert_eq!(iter.sequence, 1);
        assert!(!iter.is_sealed());
        assert!(iter.outcome.is_none());
        assert!(iter.critique.is_none());
    }

    #[test]
    fn test_seal_records_outcome_and_critique() {
        let mut iter = IterationRecord::new(2, 3);
        iter.set_code_revision(4).unwrap();
        iter.seal(sample_outcome(), sample_critique()).unwrap();

        assert!(iter.is_sealed());
        assert!(iter.sealed_at.is_some());
        assert_eq!(iter.code_revision, Some(4));
        assert_eq!(iter.outcome.unwrap().kind, OutcomeKind::Success);
    }

    #[test]
    fn test_sealed_record_rejects_mutation() {
        let mut iter = IterationRecord::new(1, 1);
        iter.seal(sample_outcome(), sample_critique()).unwrap();

        assert!(iter.set_code_revision(9).is_err());
        assert!(iter.seal(sample_outcome(), sample_critique()).is_err());
    }

    #[test]
    fn test_serialization_roundtrip_preserves_seal() {
        let mut iter = IterationRecord::new(5, 2);
        iter.seal(sample_outcome(), sample_critique()).unwrap();

        let json = serde_json::to_string(&iter).unwrap();
        let parsed: IterationRecord = serde_json::from_str(&json).unwrap();
        assert!(parsed.is_sealed());
        assert_eq!(parsed.sequence, 5);
    }
}
