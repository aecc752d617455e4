//! Runtime executor parameters.

use alloy::primitives::U256;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::ExecutionConfig;
use crate::error::SliceError;
use crate::registry::DEFAULT_MAX_VENUES;
use crate::u256_math::MAX_DEVIATION_CEILING_BPS;

/// What to do when the price reference fails after the sell went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OracleFailurePolicy {
    /// Abort the invocation without committing the slice
    #[default]
    Revert,
    /// Commit the slice and report the deviation as unknown
    CommitUnmeasured,
}

/// Parameters the executor starts with.
///
/// `max_deviation_bps` and `min_slice_amount` are governance-mutable after
/// construction; the rest are fixed for the executor's lifetime.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Deviation tolerance in bps, < 2000
    pub max_deviation_bps: u16,
    /// Pending amounts below this are treated as dust
    pub min_slice_amount: U256,
    /// Per-venue quote timeout
    pub quote_timeout: Duration,
    /// Registry capacity
    pub max_venues: usize,
    /// Behaviour on post-execution oracle failure
    pub oracle_failure_policy: OracleFailurePolicy,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_deviation_bps: 500,
            min_slice_amount: U256::ZERO,
            quote_timeout: Duration::from_secs(2),
            max_venues: DEFAULT_MAX_VENUES,
            oracle_failure_policy: OracleFailurePolicy::Revert,
        }
    }
}

impl ExecutorConfig {
    /// Check the deviation ceiling.
    pub fn validate(&self) -> Result<(), SliceError> {
        check_deviation_bps(self.max_deviation_bps)
    }

    pub fn with_max_deviation_bps(mut self, bps: u16) -> Self {
        self.max_deviation_bps = bps;
        self
    }

    pub fn with_min_slice_amount(mut self, amount: U256) -> Self {
        self.min_slice_amount = amount;
        self
    }

    pub fn with_quote_timeout(mut self, timeout: Duration) -> Self {
        self.quote_timeout = timeout;
        self
    }

    pub fn with_max_venues(mut self, max_venues: usize) -> Self {
        self.max_venues = max_venues;
        self
    }

    pub fn with_oracle_failure_policy(mut self, policy: OracleFailurePolicy) -> Self {
        self.oracle_failure_policy = policy;
        self
    }
}

impl TryFrom<&ExecutionConfig> for ExecutorConfig {
    type Error = anyhow::Error;

    fn try_from(config: &ExecutionConfig) -> anyhow::Result<Self> {
        Ok(Self {
            max_deviation_bps: config.max_deviation_bps,
            min_slice_amount: config.min_slice_amount()?,
            quote_timeout: config.quote_timeout(),
            max_venues: config.max_venues,
            oracle_failure_policy: config.oracle_failure_policy,
        })
    }
}

/// Fail with `ConfigOutOfRange` unless `bps < 2000`.
pub fn check_deviation_bps(bps: u16) -> Result<(), SliceError> {
    if bps >= MAX_DEVIATION_CEILING_BPS {
        return Err(SliceError::ConfigOutOfRange {
            bps,
            ceiling: MAX_DEVIATION_CEILING_BPS,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deviation_ceiling() {
        assert!(check_deviation_bps(0).is_ok());
        assert!(check_deviation_bps(1999).is_ok());
        assert!(matches!(
            check_deviation_bps(2000),
            Err(SliceError::ConfigOutOfRange { bps: 2000, .. })
        ));
        assert!(check_deviation_bps(u16::MAX).is_err());
    }

    #[test]
    fn test_from_execution_config() {
        let execution = ExecutionConfig {
            max_deviation_bps: 250,
            min_slice_amount: "1000".to_string(),
            quote_timeout_ms: 750,
            max_venues: 4,
            oracle_failure_policy: OracleFailurePolicy::CommitUnmeasured,
        };

        let config = ExecutorConfig::try_from(&execution).unwrap();
        assert_eq!(config.max_deviation_bps, 250);
        assert_eq!(config.min_slice_amount, U256::from(1_000u64));
        assert_eq!(config.quote_timeout, Duration::from_millis(750));
        assert_eq!(config.max_venues, 4);
        assert_eq!(
            config.oracle_failure_policy,
            OracleFailurePolicy::CommitUnmeasured
        );
    }
}
