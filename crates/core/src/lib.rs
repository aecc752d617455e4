//! Sliced-liquidation core logic.
//!
//! This crate provides:
//! - Owner/keeper access control with two-step ownership handoff
//! - Bounded venue registry
//! - The slice executor (discovery, selection, execution, deviation check, commit)
//! - Executor events and a broadcast bus for monitors
//! - Keeper loop driving the executor for a set of loans
//! - Configuration profiles loaded from TOML

mod access;
pub mod config;
mod error;
mod events;
mod executor;
mod keeper;
mod registry;
pub mod u256_math;

#[cfg(test)]
mod testing;

pub use access::AccessControl;
pub use config::{ExecutorConfig, OracleFailurePolicy, SlicerConfig};
pub use error::SliceError;
pub use events::{EventBus, EventRecord, SliceEvent};
pub use executor::{select_best, SliceExecutor, SlicePreview, SliceResult};
pub use keeper::{Keeper, RoundSummary};
pub use registry::{VenueRegistry, DEFAULT_MAX_VENUES};
