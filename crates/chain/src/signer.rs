//! Transaction signer and sender.
//! Uses Alloy providers for type-safe RPC interactions.
//!
//! Nonces are tracked locally with an atomic counter so consecutive slice
//! transactions do not each pay for a `eth_getTransactionCount` round trip.

use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use anyhow::{Context, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Default gas limit for adapter sells and controller commits.
const DEFAULT_GAS_LIMIT: u64 = 1_000_000;

/// Default gas price cap (10 gwei).
const DEFAULT_MAX_GAS_PRICE: u128 = 10_000_000_000;

/// Cached nonce manager.
pub struct NonceManager {
    /// Next nonce to hand out
    current: AtomicU64,
}

impl NonceManager {
    /// Create a nonce manager starting at the chain's value.
    pub fn new(initial_nonce: u64) -> Self {
        Self {
            current: AtomicU64::new(initial_nonce),
        }
    }

    /// Get next nonce and increment counter.
    #[inline]
    pub fn next(&self) -> u64 {
        self.current.fetch_add(1, Ordering::SeqCst)
    }

    /// Get current nonce without incrementing.
    #[inline]
    pub fn current(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }

    /// Move forward to the chain nonce if the chain is ahead.
    pub fn sync(&self, chain_nonce: u64) {
        self.current.fetch_max(chain_nonce, Ordering::SeqCst);
    }

    /// Reset nonce to chain value (use after tx failure).
    pub fn reset(&self, chain_nonce: u64) {
        self.current.store(chain_nonce, Ordering::SeqCst);
    }
}

/// Signs and submits transactions with a local key and legacy gas pricing.
pub struct TransactionSender {
    /// RPC URL for sending transactions
    rpc_url: String,
    /// Signer wallet
    wallet: EthereumWallet,
    /// Signer address
    pub address: Address,
    /// Chain ID
    chain_id: u64,
    /// Cached nonce manager
    nonce_manager: NonceManager,
    /// Gas limit for every transaction
    gas_limit: u64,
    /// Upper bound on the gas price we are willing to pay (wei)
    max_gas_price: u128,
}

impl TransactionSender {
    /// Create a sender from a hex private key (with or without `0x`).
    ///
    /// Fetches the initial nonce from the chain.
    pub async fn new(private_key: &str, rpc_url: &str, chain_id: u64) -> Result<Self> {
        let key_str = private_key.trim_start_matches("0x");
        let signer: PrivateKeySigner = key_str.parse().context("Invalid private key")?;
        let address = signer.address();
        let wallet = EthereumWallet::from(signer);

        let provider = ProviderBuilder::new().on_http(rpc_url.parse()?);
        let initial_nonce = provider
            .get_transaction_count(address)
            .await
            .context("Failed to fetch initial nonce")?;

        info!(
            address = %address,
            chain_id,
            initial_nonce,
            "Transaction sender initialized"
        );

        Ok(Self {
            rpc_url: rpc_url.to_string(),
            wallet,
            address,
            chain_id,
            nonce_manager: NonceManager::new(initial_nonce),
            gas_limit: DEFAULT_GAS_LIMIT,
            max_gas_price: DEFAULT_MAX_GAS_PRICE,
        })
    }

    /// Set the gas limit.
    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = gas_limit;
        self
    }

    /// Set the gas price cap in gwei.
    pub fn with_max_gas_price_gwei(mut self, gwei: f64) -> Self {
        self.max_gas_price = (gwei * 1e9) as u128;
        self
    }

    /// Send a transaction and wait for the receipt.
    ///
    /// Fails if the transaction reverts; the nonce is then resynced from
    /// the chain.
    pub async fn send_transaction(&self, to: Address, calldata: Bytes) -> Result<B256> {
        let total_start = Instant::now();
        let provider = ProviderBuilder::new()
            .wallet(self.wallet.clone())
            .on_http(self.rpc_url.parse()?);

        let gas_price = provider
            .get_gas_price()
            .await
            .context("Failed to fetch gas price")?
            .min(self.max_gas_price);
        let nonce = self.nonce_manager.next();

        let tx = TransactionRequest::default()
            .with_to(to)
            .with_input(calldata)
            .with_value(U256::ZERO)
            .with_nonce(nonce)
            .with_gas_limit(self.gas_limit)
            .with_gas_price(gas_price)
            .with_chain_id(self.chain_id);

        debug!(to = %to, nonce, gas_price, "Sending transaction");

        let pending = match provider.send_transaction(tx).await {
            Ok(pending) => pending,
            Err(e) => {
                self.sync_nonce().await;
                return Err(e).context("Failed to submit transaction");
            }
        };
        let tx_hash = *pending.tx_hash();
        let receipt = pending.get_receipt().await?;

        if receipt.status() {
            info!(
                tx_hash = %tx_hash,
                block = receipt.block_number.unwrap_or(0),
                gas_used = receipt.gas_used,
                total_ms = total_start.elapsed().as_millis(),
                "Transaction confirmed"
            );
            Ok(tx_hash)
        } else {
            warn!(tx_hash = %tx_hash, "Transaction reverted, syncing nonce");
            self.sync_nonce().await;
            anyhow::bail!("Transaction reverted: {:?}", tx_hash)
        }
    }

    /// Resync the local nonce from the chain.
    pub async fn sync_nonce(&self) {
        let url = match self.rpc_url.parse() {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "Invalid RPC URL, cannot sync nonce");
                return;
            }
        };
        let provider = ProviderBuilder::new().on_http(url);
        match provider.get_transaction_count(self.address).await {
            Ok(chain_nonce) => {
                self.nonce_manager.reset(chain_nonce);
                debug!(nonce = chain_nonce, "Nonce synced from chain");
            }
            Err(e) => {
                warn!(error = %e, "Failed to sync nonce from chain");
            }
        }
    }

    /// Get current cached nonce.
    pub fn current_nonce(&self) -> u64 {
        self.nonce_manager.current()
    }
}

impl std::fmt::Debug for TransactionSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionSender")
            .field("address", &self.address)
            .field("chain_id", &self.chain_id)
            .field("rpc_url", &self.rpc_url)
            .finish_non_exhaustive()
    }
}
