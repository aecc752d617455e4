//! Slicer keeper
//!
//! Liquidates large loans in slices, routing each slice through whichever
//! registered venue quotes the most stable output.
//! Features:
//! - Concurrent venue discovery with per-venue timeouts
//! - Keeper-side slippage on top of the executor's deviation floor
//! - Post-trade deviation check against an independent price reference

use std::sync::Arc;

use alloy::primitives::Address;
use alloy::providers::{Provider, ProviderBuilder};
use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use slicer_chain::{ChainlinkPriceReference, ControllerContract, TransactionSender};
use slicer_core::{ExecutorConfig, Keeper, SliceExecutor, SlicerConfig};
use slicer_venues::OnChainVenue;

/// Environment variable names.
mod env {
    pub const PRIVATE_KEY: &str = "PRIVATE_KEY";
    pub const LOG_FORMAT: &str = "LOG_FORMAT";
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    // SLICER_CONFIG / SLICER_PROFILE select the configuration source
    let config = SlicerConfig::from_env()?;
    config.validate()?;
    config.log_config();

    let private_key = std::env::var(env::PRIVATE_KEY)
        .map_err(|_| anyhow::anyhow!("Missing env var: {}", env::PRIVATE_KEY))?;

    let (executor, identity) = initialize_executor(&config, &private_key).await?;

    let keeper = Keeper::from_config(executor, identity, &config.keeper)?;

    info!("Starting keeper loop...");
    keeper
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
        })
        .await;

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,slicer_core=debug,slicer_chain=debug"));

    let json = std::env::var(env::LOG_FORMAT).is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }
}

/// Build the executor and its on-chain collaborators.
///
/// The signing address owns the executor and doubles as the keeper identity.
async fn initialize_executor(
    config: &SlicerConfig,
    private_key: &str,
) -> Result<(Arc<SliceExecutor>, Address)> {
    let rpc_url = &config.chain.rpc_url;
    let provider = Arc::new(
        ProviderBuilder::new().on_http(rpc_url.parse().context("Invalid rpc_url")?),
    );
    let block = provider
        .get_block_number()
        .await
        .context("RPC endpoint unreachable")?;
    info!(block, chain_id = config.chain.chain_id, "Provider connection verified");

    let sender = Arc::new(
        TransactionSender::new(private_key, rpc_url, config.chain.chain_id)
            .await?
            .with_gas_limit(config.chain.gas_limit)
            .with_max_gas_price_gwei(config.chain.max_gas_price_gwei),
    );
    let identity = sender.address;

    let controller = Arc::new(ControllerContract::new(
        config.contracts.controller_address()?,
        provider.clone(),
        sender.clone(),
    ));

    let mut price_reference =
        ChainlinkPriceReference::new(config.contracts.price_reference_address()?, provider.clone());
    if let Some(decimals) = config.contracts.price_decimals {
        price_reference = price_reference.with_decimals(decimals);
    }

    let executor_config = ExecutorConfig::try_from(&config.execution)?;
    let executor = Arc::new(SliceExecutor::new(
        identity,
        controller,
        Arc::new(price_reference),
        executor_config,
    )?);

    for address in config.contracts.venue_addresses()? {
        let venue = OnChainVenue::new(address, provider.clone(), sender.clone());
        let index = executor.add_venue(identity, Arc::new(venue)).await?;
        info!(index, venue = %address, "Venue registered");
    }

    info!(
        owner = %identity,
        venues = executor.venue_count(),
        "Executor initialized"
    );

    Ok((executor, identity))
}
