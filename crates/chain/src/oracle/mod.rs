//! Price reference abstraction.
//!
//! The slice executor sanity-checks every fill against an external price
//! reference. This module defines the [`PriceReference`] trait and the
//! price payload it returns, plus a Chainlink-backed implementation.
//!
//! # Example
//!
//! ```rust,ignore
//! use slicer_chain::oracle::{ChainlinkPriceReference, PriceReference};
//!
//! let reference = ChainlinkPriceReference::new(aggregator, provider).with_decimals(8);
//! let price = reference.latest_price().await?;
//! ```

mod chainlink;

pub use chainlink::ChainlinkPriceReference;

use alloy::primitives::{I256, U256};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Source of the reference price used to measure fill deviation.
///
/// Staleness is not checked here; that is left to an external monitor.
#[async_trait]
pub trait PriceReference: Send + Sync + Debug {
    /// Latest price of one unit of collateral, expressed in stable units
    /// scaled by `10^decimals`.
    async fn latest_price(&self) -> Result<PriceData>;
}

/// Price payload returned by a [`PriceReference`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceData {
    /// Signed answer as reported by the feed
    pub price: I256,
    /// Number of decimals in `price`
    pub decimals: u8,
    /// Feed update timestamp (0 if unknown)
    pub updated_at: u64,
}

impl PriceData {
    /// Create price data without an update timestamp.
    pub fn new(price: I256, decimals: u8) -> Self {
        Self {
            price,
            decimals,
            updated_at: 0,
        }
    }

    /// Set the update timestamp.
    pub fn with_updated_at(mut self, updated_at: u64) -> Self {
        self.updated_at = updated_at;
        self
    }

    /// The price as an unsigned value, or `None` if it is zero or negative.
    pub fn positive_price(&self) -> Option<U256> {
        if self.price.is_positive() {
            Some(self.price.into_raw())
        } else {
            None
        }
    }

    /// Price as f64 (logging only).
    pub fn price_f64(&self) -> f64 {
        let divisor = 10_f64.powi(self.decimals as i32);
        self.price.to_string().parse::<f64>().unwrap_or(0.0) / divisor
    }
}
