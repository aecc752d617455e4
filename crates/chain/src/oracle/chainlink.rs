//! Chainlink aggregator price reference.

use super::{PriceData, PriceReference};
use alloy::primitives::Address;
use alloy::providers::Provider;
use alloy::sol;
use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

// Chainlink AggregatorV3 interface
sol! {
    #[sol(rpc)]
    interface IAggregatorV3 {
        function latestRoundData() external view returns (
            uint80 roundId,
            int256 answer,
            uint256 startedAt,
            uint256 updatedAt,
            uint80 answeredInRound
        );

        function decimals() external view returns (uint8);
    }
}

/// Price reference backed by a Chainlink `AggregatorV3` feed.
///
/// Feed decimals are fetched once and cached unless supplied up front.
pub struct ChainlinkPriceReference<P> {
    /// Aggregator contract address
    aggregator: Address,
    /// Cached feed decimals
    decimals: RwLock<Option<u8>>,
    /// Provider for RPC calls
    provider: Arc<P>,
}

impl<P> std::fmt::Debug for ChainlinkPriceReference<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainlinkPriceReference")
            .field("aggregator", &self.aggregator)
            .field("decimals", &*self.decimals.read())
            .finish()
    }
}

impl<P: Provider + Clone + 'static> ChainlinkPriceReference<P> {
    /// Create a price reference for the given aggregator.
    pub fn new(aggregator: Address, provider: Arc<P>) -> Self {
        Self {
            aggregator,
            decimals: RwLock::new(None),
            provider,
        }
    }

    /// Use known feed decimals instead of querying the contract.
    pub fn with_decimals(self, decimals: u8) -> Self {
        *self.decimals.write() = Some(decimals);
        self
    }

    async fn feed_decimals(&self) -> Result<u8> {
        if let Some(decimals) = *self.decimals.read() {
            return Ok(decimals);
        }

        let contract = IAggregatorV3::new(self.aggregator, &*self.provider);
        let decimals = contract
            .decimals()
            .call()
            .await
            .context("Failed to fetch feed decimals")?
            ._0;

        *self.decimals.write() = Some(decimals);
        debug!(aggregator = %self.aggregator, decimals, "Cached feed decimals");
        Ok(decimals)
    }
}

#[async_trait]
impl<P: Provider + Clone + Send + Sync + 'static> PriceReference for ChainlinkPriceReference<P> {
    async fn latest_price(&self) -> Result<PriceData> {
        let decimals = self.feed_decimals().await?;

        let contract = IAggregatorV3::new(self.aggregator, &*self.provider);
        let round = contract
            .latestRoundData()
            .call()
            .await
            .context("Failed to fetch latest round")?;

        Ok(price_from_round(&round, decimals))
    }
}

/// Feed timestamps that do not fit in a u64 saturate.
fn price_from_round(round: &IAggregatorV3::latestRoundDataReturn, decimals: u8) -> PriceData {
    PriceData::new(round.answer, decimals).with_updated_at(round.updatedAt.saturating_to::<u64>())
}
