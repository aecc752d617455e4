//! Configuration management with profile support.
//!
//! Provides all runtime parameters of the slicer with built-in profiles
//! (testing, production) and TOML file loading.

use alloy::primitives::{Address, Bytes, U256};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use super::executor::{check_deviation_bps, OracleFailurePolicy};
use super::expand_env;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlicerConfig {
    /// Profile name (for logging/identification)
    #[serde(default = "default_profile_name")]
    pub profile: String,

    /// Slice execution parameters
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Keeper loop parameters
    #[serde(default)]
    pub keeper: KeeperConfig,

    /// Chain connection
    #[serde(default)]
    pub chain: ChainConfig,

    /// Contract addresses
    #[serde(default)]
    pub contracts: ContractsConfig,
}

fn default_profile_name() -> String {
    "default".to_string()
}

impl Default for SlicerConfig {
    fn default() -> Self {
        Self {
            profile: default_profile_name(),
            execution: ExecutionConfig::default(),
            keeper: KeeperConfig::default(),
            chain: ChainConfig::default(),
            contracts: ContractsConfig::default(),
        }
    }
}

/// Slice execution parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Deviation tolerance in basis points (must be < 2000)
    #[serde(default = "default_max_deviation")]
    pub max_deviation_bps: u16,

    /// Minimum pending amount worth liquidating (decimal or 0x-hex string)
    #[serde(default = "default_min_slice")]
    pub min_slice_amount: String,

    /// Per-venue quote timeout (milliseconds)
    #[serde(default = "default_quote_timeout")]
    pub quote_timeout_ms: u64,

    /// Maximum number of registered venues
    #[serde(default = "default_max_venues")]
    pub max_venues: usize,

    /// Behaviour when the price reference fails after a sell
    #[serde(default)]
    pub oracle_failure_policy: OracleFailurePolicy,
}

fn default_max_deviation() -> u16 {
    500
}
fn default_min_slice() -> String {
    "0".to_string()
}
fn default_quote_timeout() -> u64 {
    2000
}
fn default_max_venues() -> usize {
    16
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_deviation_bps: default_max_deviation(),
            min_slice_amount: default_min_slice(),
            quote_timeout_ms: default_quote_timeout(),
            max_venues: default_max_venues(),
            oracle_failure_policy: OracleFailurePolicy::default(),
        }
    }
}

impl ExecutionConfig {
    pub fn quote_timeout(&self) -> Duration {
        Duration::from_millis(self.quote_timeout_ms)
    }

    /// Parsed dust threshold.
    pub fn min_slice_amount(&self) -> Result<U256> {
        parse_u256(&self.min_slice_amount)
            .with_context(|| format!("Invalid min_slice_amount '{}'", self.min_slice_amount))
    }
}

/// Keeper loop parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeeperConfig {
    /// Interval between polling rounds (milliseconds)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Keeper's own haircut on the best quote (basis points)
    #[serde(default = "default_slippage")]
    pub slippage_bps: u16,

    /// Loan ids to watch (decimal or 0x-hex strings)
    #[serde(default)]
    pub loans: Vec<String>,

    /// Hex-encoded venue data passed to every quote and sell
    #[serde(default)]
    pub venue_data: String,
}

fn default_poll_interval() -> u64 {
    2000
}
fn default_slippage() -> u16 {
    100
}

impl Default for KeeperConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            slippage_bps: default_slippage(),
            loans: Vec::new(),
            venue_data: String::new(),
        }
    }
}

impl KeeperConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Parsed loan ids.
    pub fn loan_ids(&self) -> Result<Vec<U256>> {
        self.loans
            .iter()
            .map(|s| parse_u256(s).with_context(|| format!("Invalid loan id '{s}'")))
            .collect()
    }

    /// Decoded venue data.
    pub fn venue_data(&self) -> Result<Bytes> {
        let raw = self.venue_data.trim_start_matches("0x");
        let bytes = hex::decode(raw).context("Invalid venue_data hex")?;
        Ok(Bytes::from(bytes))
    }
}

/// Chain connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// HTTP RPC endpoint (supports ${VAR})
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    /// Chain ID
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,

    /// Gas price cap (gwei)
    #[serde(default = "default_max_gas_price")]
    pub max_gas_price_gwei: f64,

    /// Gas limit per transaction
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,
}

fn default_rpc_url() -> String {
    "${RPC_URL}".to_string()
}
fn default_chain_id() -> u64 {
    1
}
fn default_max_gas_price() -> f64 {
    100.0
}
fn default_gas_limit() -> u64 {
    1_000_000
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            chain_id: default_chain_id(),
            max_gas_price_gwei: default_max_gas_price(),
            gas_limit: default_gas_limit(),
        }
    }
}

/// Contract addresses (strings support ${VAR}).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractsConfig {
    /// Position controller
    #[serde(default = "default_controller")]
    pub controller: String,

    /// Price reference aggregator
    #[serde(default = "default_price_reference")]
    pub price_reference: String,

    /// Known feed decimals (fetched from the feed if unset)
    #[serde(default)]
    pub price_decimals: Option<u8>,

    /// Venue adapter contracts, in registry order
    #[serde(default)]
    pub venues: Vec<String>,
}

fn default_controller() -> String {
    "${CONTROLLER}".to_string()
}
fn default_price_reference() -> String {
    "${PRICE_REFERENCE}".to_string()
}

impl Default for ContractsConfig {
    fn default() -> Self {
        Self {
            controller: default_controller(),
            price_reference: default_price_reference(),
            price_decimals: None,
            venues: Vec::new(),
        }
    }
}

impl ContractsConfig {
    pub fn controller_address(&self) -> Result<Address> {
        parse_address("controller", &self.controller)
    }

    pub fn price_reference_address(&self) -> Result<Address> {
        parse_address("price_reference", &self.price_reference)
    }

    pub fn venue_addresses(&self) -> Result<Vec<Address>> {
        self.venues
            .iter()
            .map(|v| parse_address("venue", v))
            .collect()
    }
}

fn parse_address(name: &str, value: &str) -> Result<Address> {
    value
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid address for {}: '{}' ({})", name, value, e))
}

fn parse_u256(value: &str) -> Result<U256> {
    let value = value.trim();
    let parsed = match value.strip_prefix("0x") {
        Some(hex) => U256::from_str_radix(hex, 16),
        None => U256::from_str_radix(value, 10),
    };
    parsed.map_err(|e| anyhow::anyhow!("{e}"))
}

impl SlicerConfig {
    /// Load configuration from a TOML file, expanding ${VAR} placeholders.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {:?}", path))?;
        let mut config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {:?}", path))?;
        config.expand_env_vars();
        Ok(config)
    }

    /// Testing profile: tight polling, no dust filter, tolerant deviation.
    pub fn testing() -> Self {
        let mut config = Self {
            profile: "testing".to_string(),
            execution: ExecutionConfig {
                max_deviation_bps: 1000,
                min_slice_amount: "0".to_string(),
                quote_timeout_ms: 5000,
                max_venues: 8,
                oracle_failure_policy: OracleFailurePolicy::CommitUnmeasured,
            },
            keeper: KeeperConfig {
                poll_interval_ms: 1000,
                slippage_bps: 300,
                ..Default::default()
            },
            chain: ChainConfig {
                chain_id: 31337,
                ..Default::default()
            },
            contracts: ContractsConfig::default(),
        };
        config.expand_env_vars();
        config
    }

    /// Production profile: conservative deviation and a dust floor.
    pub fn production() -> Self {
        let mut config = Self {
            profile: "production".to_string(),
            execution: ExecutionConfig {
                max_deviation_bps: 300,
                min_slice_amount: "1000000000000000".to_string(), // 0.001 of an 18-decimal token
                quote_timeout_ms: 1500,
                max_venues: 16,
                oracle_failure_policy: OracleFailurePolicy::Revert,
            },
            keeper: KeeperConfig {
                poll_interval_ms: 3000,
                slippage_bps: 50,
                ..Default::default()
            },
            chain: ChainConfig::default(),
            contracts: ContractsConfig::default(),
        };
        config.expand_env_vars();
        config
    }

    /// Pick configuration from the environment.
    ///
    /// `SLICER_CONFIG` names a TOML file; otherwise `SLICER_PROFILE`
    /// selects a built-in profile (testing, production, default).
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = std::env::var("SLICER_CONFIG") {
            return Self::from_file(path);
        }

        let profile = std::env::var("SLICER_PROFILE").unwrap_or_else(|_| "default".to_string());
        Ok(match profile.to_lowercase().as_str() {
            "testing" | "test" => Self::testing(),
            "production" | "prod" => Self::production(),
            _ => {
                let mut config = Self::default();
                config.expand_env_vars();
                config
            }
        })
    }

    /// Expand ${VAR} placeholders in string fields.
    pub fn expand_env_vars(&mut self) {
        self.chain.rpc_url = expand_env(&self.chain.rpc_url);
        self.contracts.controller = expand_env(&self.contracts.controller);
        self.contracts.price_reference = expand_env(&self.contracts.price_reference);
        for venue in &mut self.contracts.venues {
            *venue = expand_env(venue);
        }
        for loan in &mut self.keeper.loans {
            *loan = expand_env(loan);
        }
        self.keeper.venue_data = expand_env(&self.keeper.venue_data);
    }

    /// Reject values the executor would refuse or misbehave with.
    pub fn validate(&self) -> Result<()> {
        check_deviation_bps(self.execution.max_deviation_bps)?;
        anyhow::ensure!(self.execution.max_venues > 0, "max_venues must be > 0");
        anyhow::ensure!(
            self.execution.quote_timeout_ms > 0,
            "quote_timeout_ms must be > 0"
        );
        anyhow::ensure!(
            self.keeper.slippage_bps < 10_000,
            "keeper slippage_bps must be < 10000"
        );
        self.execution.min_slice_amount()?;
        self.keeper.loan_ids()?;
        self.keeper.venue_data()?;
        Ok(())
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        tracing::info!(profile = %self.profile, "Slicer configuration loaded");
        tracing::info!(
            max_deviation_bps = self.execution.max_deviation_bps,
            min_slice_amount = %self.execution.min_slice_amount,
            quote_timeout_ms = self.execution.quote_timeout_ms,
            max_venues = self.execution.max_venues,
            oracle_failure_policy = ?self.execution.oracle_failure_policy,
            "Execution parameters"
        );
        tracing::info!(
            poll_interval_ms = self.keeper.poll_interval_ms,
            slippage_bps = self.keeper.slippage_bps,
            loans = self.keeper.loans.len(),
            "Keeper parameters"
        );
        tracing::info!(
            chain_id = self.chain.chain_id,
            venues = self.contracts.venues.len(),
            "Chain parameters"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SlicerConfig::default();
        assert_eq!(config.execution.max_deviation_bps, 500);
        assert_eq!(config.keeper.slippage_bps, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_profiles() {
        let testing = SlicerConfig::testing();
        assert_eq!(testing.profile, "testing");
        assert_eq!(
            testing.execution.oracle_failure_policy,
            OracleFailurePolicy::CommitUnmeasured
        );

        let production = SlicerConfig::production();
        assert_eq!(production.profile, "production");
        assert!(production.execution.min_slice_amount().unwrap() > U256::ZERO);
        assert!(production.validate().is_ok());
    }

    #[test]
    fn test_parse_toml() {
        let raw = r#"
            profile = "custom"

            [execution]
            max_deviation_bps = 750
            min_slice_amount = "0x10"
            oracle_failure_policy = "commit_unmeasured"

            [keeper]
            loans = ["1", "0x2a"]
            venue_data = "0xabcd"

            [contracts]
            controller = "0x0000000000000000000000000000000000000001"
            venues = ["0x0000000000000000000000000000000000000002"]
        "#;

        let config: SlicerConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.profile, "custom");
        assert_eq!(config.execution.max_deviation_bps, 750);
        assert_eq!(config.execution.min_slice_amount().unwrap(), U256::from(16u64));
        assert_eq!(config.execution.quote_timeout_ms, 2000);
        assert_eq!(
            config.keeper.loan_ids().unwrap(),
            vec![U256::from(1u64), U256::from(42u64)]
        );
        assert_eq!(config.keeper.venue_data().unwrap(), Bytes::from(vec![0xab, 0xcd]));
        assert_eq!(
            config.contracts.controller_address().unwrap(),
            Address::with_last_byte(1)
        );
        assert_eq!(config.contracts.venue_addresses().unwrap().len(), 1);
    }

    #[test]
    fn test_validate_rejects_deviation_ceiling() {
        let mut config = SlicerConfig::default();
        config.execution.max_deviation_bps = 2000;
        assert!(config.validate().is_err());

        config.execution.max_deviation_bps = 1999;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_loan_id() {
        let mut config = SlicerConfig::default();
        config.keeper.loans = vec!["not-a-number".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_serialization_round_trip() {
        let config = SlicerConfig::production();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("profile = \"production\""));

        let parsed: SlicerConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.execution.max_deviation_bps, 300);
    }
}
