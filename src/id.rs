//! ID generation utilities for agentlab
//!
//! Provides functions for generating unique identifiers for runs, execution
//! attempts, and remote job names.

use rand::Rng;

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}

/// Generate a unique run ID
///
/// Format: `{timestamp_ms}-{random_hex}`
/// Example: `1738300800123-a1b2`
pub fn generate_run_id() -> String {
    let timestamp = now_ms();
    let random: u16 = rand::rng().random();
    format!("{}-{:04x}", timestamp, random)
}

/// Generate the job name submitted to the batch scheduler
///
/// Format: `agentlab_{run_suffix}_i{iteration:02}_a{attempt:02}`
pub fn generate_job_name(run_id: &str, iteration: u32, attempt: u32) -> String {
    let run_suffix = run_id.split('-').next_back().unwrap_or(run_id);
    format!("agentlab_{}_i{:02}_a{:02}", run_suffix, iteration, attempt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_ms_returns_reasonable_timestamp() {
        let ts = now_ms();
        // Should be after 2020-01-01 and before 2100-01-01
        assert!(ts > 1577836800000); // 2020-01-01
        assert!(ts < 4102444800000); // 2100-01-01
    }

    #[test]
    fn test_generate_run_id_format() {
        let id = generate_run_id();
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 2);
        assert!(parts[0].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(parts[1].len(), 4);
        assert!(parts[1].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generate_run_id_uniqueness() {
        let id1 = generate_run_id();
        let id2 = generate_run_id();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_generate_job_name_format() {
        let name = generate_job_name("1738300800123-a1b2", 3, 1);
        assert_eq!(name, "agentlab_a1b2_i03_a01");
    }

    #[test]
    fn test_generate_job_name_plain_run_id() {
        let name = generate_job_name("demo", 1, 2);
        assert_eq!(name, "agentlab_demo_i01_a02");
    }
}
