//! Position controller interface.
//!
//! The controller owns the loan book: it decides how much collateral of a
//! loan is currently eligible for liquidation and records which slices have
//! been processed. The executor only reads the pending amount and reports
//! back the outcome.

use alloy::primitives::{Address, U256};
use alloy::providers::Provider;
use alloy::sol;
use alloy::sol_types::SolCall;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::info;

use crate::signer::TransactionSender;

sol! {
    #[sol(rpc)]
    interface IPositionController {
        function getPendingSliceAmount(uint256 loanId) external view returns (
            uint256 amount,
            address collateralToken,
            address stableToken
        );

        function markSliceProcessed(uint256 loanId, uint256 amountIn, uint256 amountOut) external;
    }
}

/// Collateral currently eligible for liquidation on a loan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingSlice {
    /// Amount of collateral eligible right now
    pub amount: U256,
    /// Collateral token being sold
    pub collateral_token: Address,
    /// Stable token received
    pub stable_token: Address,
}

/// Source of truth for pending slices and sink for processed ones.
#[async_trait]
pub trait PositionController: Send + Sync + Debug {
    /// Pending liquidatable amount for `loan_id`.
    async fn pending_slice(&self, loan_id: U256) -> Result<PendingSlice>;

    /// Record that `amount_in` collateral of `loan_id` was sold for
    /// `amount_out` stable.
    async fn mark_slice_processed(&self, loan_id: U256, amount_in: U256, amount_out: U256)
        -> Result<()>;
}

/// On-chain position controller.
pub struct ControllerContract<P> {
    /// Controller contract address
    address: Address,
    /// Provider for view calls
    provider: Arc<P>,
    /// Sender for state-changing calls
    sender: Arc<TransactionSender>,
}

impl<P> Debug for ControllerContract<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerContract")
            .field("address", &self.address)
            .field("sender", &self.sender.address)
            .finish()
    }
}

impl<P: Provider + Clone + 'static> ControllerContract<P> {
    /// Create a controller client.
    pub fn new(address: Address, provider: Arc<P>, sender: Arc<TransactionSender>) -> Self {
        Self {
            address,
            provider,
            sender,
        }
    }

    /// Controller address.
    pub fn address(&self) -> Address {
        self.address
    }
}

#[async_trait]
impl<P: Provider + Clone + Send + Sync + 'static> PositionController for ControllerContract<P> {
    async fn pending_slice(&self, loan_id: U256) -> Result<PendingSlice> {
        let contract = IPositionController::new(self.address, &*self.provider);
        let pending = contract
            .getPendingSliceAmount(loan_id)
            .call()
            .await
            .with_context(|| format!("Failed to read pending slice for loan {loan_id}"))?;

        Ok(PendingSlice {
            amount: pending.amount,
            collateral_token: pending.collateralToken,
            stable_token: pending.stableToken,
        })
    }

    async fn mark_slice_processed(
        &self,
        loan_id: U256,
        amount_in: U256,
        amount_out: U256,
    ) -> Result<()> {
        let calldata = IPositionController::markSliceProcessedCall {
            loanId: loan_id,
            amountIn: amount_in,
            amountOut: amount_out,
        }
        .abi_encode();

        let tx_hash = self
            .sender
            .send_transaction(self.address, calldata.into())
            .await
            .with_context(|| format!("Failed to mark slice processed for loan {loan_id}"))?;

        info!(
            controller = %self.address,
            loan_id = %loan_id,
            tx_hash = %tx_hash,
            "Slice marked processed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_processed_encoding() {
        let call = IPositionController::markSliceProcessedCall {
            loanId: U256::from(7u64),
            amountIn: U256::from(100u64),
            amountOut: U256::from(1900u64),
        };

        let encoded = call.abi_encode();
        // selector + three words
        assert_eq!(encoded.len(), 4 + 3 * 32);
        assert_eq!(&encoded[..4], &IPositionController::markSliceProcessedCall::SELECTOR);
    }
}
