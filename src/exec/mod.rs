//! Local code execution
//!
//! Runs a code artifact as a subordinate process, captures split
//! stdout/stderr, and applies the single-shot missing-dependency
//! remediation before reporting. All failures are sealed into
//! [`crate::domain::ExecutionOutcome`] records; this layer never retries
//! beyond the one remediation re-run.

mod local;
mod remedy;

pub use local::{CapturedRun, LocalRunner};
pub use remedy::missing_modules;

use std::path::Path;

/// Resolve the interpreter executable for an optional environment root.
///
/// Mirrors conda-style layouts: `<env>/bin/python` on unix,
/// `<env>/Scripts/python.exe` on windows, falling back to the bare name.
pub fn resolve_interpreter(environment: Option<&Path>, fallback: &str) -> String {
    if let Some(env) = environment {
        let candidates = [env.join("bin").join("python"), env.join("Scripts").join("python.exe")];
        for candidate in candidates {
            if candidate.exists() {
                return candidate.to_string_lossy().to_string();
            }
        }
    }
    fallback.to_string()
}
