//! Missing-dependency detection
//!
//! Recognizes the interpreter's "module not found" signature and maps each
//! missing module to the package to install. The mapping is deliberately
//! the identity: one bounded, single-shot install per failure signature,
//! never an open-ended inference loop.

use regex::Regex;
use std::sync::OnceLock;

fn missing_module_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"No module named ['"]([^'"]+)['"]"#).unwrap())
}

/// Extract missing module names from a stderr capture.
///
/// Duplicates are collapsed, order of first appearance is kept, and the
/// list is truncated to `cap` entries.
pub fn missing_modules(stderr: &str, cap: usize) -> Vec<String> {
    let mut seen = Vec::new();
    for captures in missing_module_re().captures_iter(stderr) {
        // Only the top-level package is installable
        let module = captures[1].split('.').next().unwrap_or(&captures[1]).to_string();
        if !seen.contains(&module) {
            seen.push(module);
        }
        if seen.len() >= cap {
            break;
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_single_module() {
        let stderr = "Traceback (most recent call last):\n  ...\nModuleNotFoundError: No module named 'numpy'";
        assert_eq!(missing_modules(stderr, 5), vec!["numpy"]);
    }

    #[test]
    fn test_detects_double_quoted_module() {
        let stderr = "ImportError: No module named \"requests\"";
        assert_eq!(missing_modules(stderr, 5), vec!["requests"]);
    }

    #[test]
    fn test_collapses_duplicates() {
        let stderr = "No module named 'pandas'\nNo module named 'pandas'\nNo module named 'scipy'";
        assert_eq!(missing_modules(stderr, 5), vec!["pandas", "scipy"]);
    }

    #[test]
    fn test_submodule_maps_to_top_level_package() {
        let stderr = "No module named 'sklearn.model_selection'";
        assert_eq!(missing_modules(stderr, 5), vec!["sklearn"]);
    }

    #[test]
    fn test_cap_bounds_the_list() {
        let stderr = "No module named 'a'\nNo module named 'b'\nNo module named 'c'";
        assert_eq!(missing_modules(stderr, 2), vec!["a", "b"]);
    }

    #[test]
    fn test_no_signature_yields_empty() {
        let stderr = "ZeroDivisionError: division by zero";
        assert!(missing_modules(stderr, 5).is_empty());
    }
}
