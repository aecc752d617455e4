//! Trading venue adapters for slice liquidation.
//!
//! This crate provides a trait-based abstraction over trading venues so the
//! executor can quote every registered venue and dispatch the sell to the
//! best one.
//!
//! # Example
//!
//! ```rust,ignore
//! use slicer_venues::{OnChainVenue, TradeRequest, VenueAdapter};
//!
//! let venue = OnChainVenue::new(adapter_address, provider, sender);
//! let request = TradeRequest::new(collateral, stable, amount_in);
//! let quote = venue.quote(&request).await?;
//! let out = venue.sell(&request, min_out).await?;
//! ```

mod onchain;
mod stats;

pub use onchain::OnChainVenue;
pub use stats::{VenueStats, VenueStatsSnapshot};

use alloy::primitives::{Address, Bytes, U256};
use anyhow::Result;
use async_trait::async_trait;
use std::fmt::Debug;

/// A single trade request passed to a venue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeRequest {
    /// Collateral token sold
    pub collateral_token: Address,
    /// Stable token bought
    pub stable_token: Address,
    /// Collateral amount sold (raw, with decimals)
    pub amount_in: U256,
    /// Opaque venue-specific routing data
    pub venue_data: Bytes,
}

impl TradeRequest {
    /// Create a trade request with empty venue data.
    pub fn new(collateral_token: Address, stable_token: Address, amount_in: U256) -> Self {
        Self {
            collateral_token,
            stable_token,
            amount_in,
            venue_data: Bytes::new(),
        }
    }

    /// Attach venue-specific data.
    pub fn with_venue_data(mut self, venue_data: Bytes) -> Self {
        self.venue_data = venue_data;
        self
    }
}

/// Trait for trading venues.
///
/// Implement this trait to plug a new venue into the registry.
#[async_trait]
pub trait VenueAdapter: Send + Sync + Debug {
    /// Venue identifier used in logs and events.
    fn venue_id(&self) -> &str;

    /// Expected stable output for selling `request.amount_in` collateral.
    ///
    /// Must not change state. Errors are treated as a zero quote by the
    /// executor.
    async fn quote(&self, request: &TradeRequest) -> Result<U256>;

    /// Sell collateral, returning the realized stable output.
    ///
    /// Implementations must fail rather than return less than `min_out`.
    async fn sell(&self, request: &TradeRequest, min_out: U256) -> Result<U256>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trade_request_builder() {
        let request = TradeRequest::new(Address::ZERO, Address::repeat_byte(1), U256::from(1000u64))
            .with_venue_data(Bytes::from(vec![0xab, 0xcd]));

        assert_eq!(request.amount_in, U256::from(1000u64));
        assert_eq!(request.venue_data.len(), 2);
    }
}
