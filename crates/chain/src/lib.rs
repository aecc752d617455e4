//! Slicer chain interaction layer.
//!
//! This crate provides:
//! - The [`PositionController`] interface and its on-chain client
//! - The [`PriceReference`] interface and a Chainlink-backed implementation
//! - Transaction signing and sending

mod controller;
pub mod oracle;
mod signer;

pub use controller::{ControllerContract, PendingSlice, PositionController};
pub use oracle::{ChainlinkPriceReference, PriceData, PriceReference};
pub use signer::{NonceManager, TransactionSender};
