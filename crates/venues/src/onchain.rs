//! Venue adapter contract client.
//!
//! Talks to a deployed adapter exposing `quote` (view) and `sell`. The sell
//! is simulated with `eth_call` from the sender's address to learn the
//! output, then submitted as a transaction; the simulated amount is
//! reported as the realized output.

use alloy::primitives::{Address, U256};
use alloy::providers::Provider;
use alloy::sol;
use alloy::sol_types::SolCall;
use anyhow::{Context, Result};
use async_trait::async_trait;
use slicer_chain::TransactionSender;
use std::sync::Arc;
use tracing::{debug, info};

use crate::{TradeRequest, VenueAdapter};

sol! {
    #[sol(rpc)]
    interface ISliceVenue {
        function quote(
            address collateralToken,
            address stableToken,
            uint256 amountIn,
            bytes calldata venueData
        ) external view returns (uint256 amountOut);

        function sell(
            address collateralToken,
            address stableToken,
            uint256 amountIn,
            uint256 minOut,
            bytes calldata venueData
        ) external returns (uint256 amountOut);
    }
}

/// Venue adapter deployed on-chain.
pub struct OnChainVenue<P> {
    /// Adapter contract address
    address: Address,
    /// Identifier used in logs
    venue_id: String,
    /// Provider for view calls and simulation
    provider: Arc<P>,
    /// Sender for the sell transaction
    sender: Arc<TransactionSender>,
}

impl<P> std::fmt::Debug for OnChainVenue<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnChainVenue")
            .field("venue_id", &self.venue_id)
            .field("address", &self.address)
            .finish()
    }
}

impl<P: Provider + Clone + 'static> OnChainVenue<P> {
    /// Create a client for the adapter at `address`.
    pub fn new(address: Address, provider: Arc<P>, sender: Arc<TransactionSender>) -> Self {
        Self {
            address,
            venue_id: format!("onchain:{address}"),
            provider,
            sender,
        }
    }

    /// Override the venue identifier.
    pub fn with_venue_id(mut self, venue_id: impl Into<String>) -> Self {
        self.venue_id = venue_id.into();
        self
    }
}

#[async_trait]
impl<P: Provider + Clone + Send + Sync + 'static> VenueAdapter for OnChainVenue<P> {
    fn venue_id(&self) -> &str {
        &self.venue_id
    }

    async fn quote(&self, request: &TradeRequest) -> Result<U256> {
        let contract = ISliceVenue::new(self.address, &*self.provider);
        let quote = contract
            .quote(
                request.collateral_token,
                request.stable_token,
                request.amount_in,
                request.venue_data.clone(),
            )
            .call()
            .await
            .with_context(|| format!("Quote failed on {}", self.venue_id))?;

        Ok(quote.amountOut)
    }

    async fn sell(&self, request: &TradeRequest, min_out: U256) -> Result<U256> {
        let contract = ISliceVenue::new(self.address, &*self.provider);
        let simulated = contract
            .sell(
                request.collateral_token,
                request.stable_token,
                request.amount_in,
                min_out,
                request.venue_data.clone(),
            )
            .from(self.sender.address)
            .call()
            .await
            .with_context(|| format!("Sell simulation failed on {}", self.venue_id))?
            .amountOut;

        debug!(venue = %self.venue_id, simulated = %simulated, "Sell simulated");

        let calldata = ISliceVenue::sellCall {
            collateralToken: request.collateral_token,
            stableToken: request.stable_token,
            amountIn: request.amount_in,
            minOut: min_out,
            venueData: request.venue_data.clone(),
        }
        .abi_encode();

        let tx_hash = self
            .sender
            .send_transaction(self.address, calldata.into())
            .await
            .with_context(|| format!("Sell transaction failed on {}", self.venue_id))?;

        info!(
            venue = %self.venue_id,
            tx_hash = %tx_hash,
            amount_in = %request.amount_in,
            amount_out = %simulated,
            "Sell executed"
        );

        Ok(simulated)
    }
}
