//! Slice executor error taxonomy.

use alloy::primitives::{Address, U256};
use thiserror::Error;

/// Failure of a governance call or a slice execution.
///
/// Every variant aborts the invocation with no state change.
#[derive(Error, Debug)]
pub enum SliceError {
    #[error("Caller {0} is not authorized")]
    Unauthorized(Address),

    #[error("Max deviation {bps} bps out of range (must be < {ceiling})")]
    ConfigOutOfRange { bps: u16, ceiling: u16 },

    #[error("Venue index {index} out of range (registry has {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Venue registry is full ({max} venues)")]
    RegistryFull { max: usize },

    #[error("No pending slice for loan {loan_id} (pending {pending}, minimum {min_slice})")]
    NoPendingSlice {
        loan_id: U256,
        pending: U256,
        min_slice: U256,
    },

    #[error("No venue returned a usable quote")]
    NoVenueAvailable,

    #[error("Min out {min_out} below floor {floor}")]
    MinOutTooLow { min_out: U256, floor: U256 },

    #[error("Price reference returned non-positive price")]
    OraclePriceInvalid,

    #[error("Price reference unavailable: {0}")]
    OracleUnavailable(String),

    #[error("Re-entrant call into slice executor")]
    ReentrantCall,

    #[error("Position controller error: {0:#}")]
    Controller(anyhow::Error),

    #[error("Execution failed on venue {venue}: {error:#}")]
    Execution { venue: String, error: anyhow::Error },

    #[error("Arithmetic overflow")]
    Overflow,
}

impl SliceError {
    /// Whether the keeper should simply retry on its next tick.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NoPendingSlice { .. }
                | Self::NoVenueAvailable
                | Self::OracleUnavailable(_)
                | Self::Controller(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        assert!(SliceError::NoVenueAvailable.is_retryable());
        assert!(SliceError::Controller(anyhow::anyhow!("rpc down")).is_retryable());
        assert!(!SliceError::ReentrantCall.is_retryable());
        assert!(!SliceError::MinOutTooLow {
            min_out: U256::from(1u64),
            floor: U256::from(2u64)
        }
        .is_retryable());
    }

    #[test]
    fn test_display() {
        let err = SliceError::IndexOutOfRange { index: 3, len: 2 };
        assert_eq!(err.to_string(), "Venue index 3 out of range (registry has 2)");
    }
}
