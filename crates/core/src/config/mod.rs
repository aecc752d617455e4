//! Configuration for the slice executor and keeper.
//!
//! This module provides:
//! - File/profile configuration ([`SlicerConfig`]) loaded from TOML
//! - Runtime executor parameters ([`ExecutorConfig`])

mod executor;
mod slicer;

pub use executor::{check_deviation_bps, ExecutorConfig, OracleFailurePolicy};
pub use slicer::{ChainConfig, ContractsConfig, ExecutionConfig, KeeperConfig, SlicerConfig};

/// Expand ${VAR_NAME} patterns with environment variable values.
///
/// Unset variables are left as-is.
pub(crate) fn expand_env(s: &str) -> String {
    let mut result = s.to_string();
    let re = match regex_lite::Regex::new(r"\$\{([^}]+)\}") {
        Ok(re) => re,
        Err(_) => return result,
    };

    for cap in re.captures_iter(s) {
        if let (Some(full_match), Some(var_match)) = (cap.get(0), cap.get(1)) {
            if let Ok(value) = std::env::var(var_match.as_str()) {
                result = result.replace(full_match.as_str(), &value);
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env() {
        // Unique var name to avoid conflicts with parallel tests
        std::env::set_var("SLICER_EXPAND_TEST_VAR", "test_value");
        assert_eq!(expand_env("${SLICER_EXPAND_TEST_VAR}"), "test_value");
        assert_eq!(
            expand_env("http://${SLICER_EXPAND_TEST_VAR}:8545"),
            "http://test_value:8545"
        );
        assert_eq!(expand_env("no_vars"), "no_vars");
        assert_eq!(
            expand_env("${SLICER_EXPAND_UNSET_VAR}"),
            "${SLICER_EXPAND_UNSET_VAR}"
        );
        std::env::remove_var("SLICER_EXPAND_TEST_VAR");
    }
}
