//! Observability records emitted by the executor.
//!
//! Records are logged through `tracing` and fanned out on a broadcast
//! channel so off-chain monitors can alert on abnormal fills.

use alloy::primitives::{Address, U256};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Capacity of the event broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Executor event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SliceEvent {
    VenueAdded {
        index: usize,
        venue: String,
    },
    VenueRemoved {
        index: usize,
        venue: String,
    },
    VenueSelected {
        slice_id: u64,
        venue: String,
        quote: U256,
    },
    SliceExecuted {
        slice_id: u64,
        loan_id: U256,
        venue: String,
        amount_in: U256,
        amount_out: U256,
        /// `None` when the price reference could not be read
        deviation_bps: Option<u64>,
    },
    AbnormalFill {
        slice_id: u64,
        deviation_bps: u64,
    },
    KeeperSet {
        identity: Address,
        enabled: bool,
    },
    OwnershipTransferStarted {
        owner: Address,
        pending_owner: Address,
    },
    OwnershipTransferred {
        previous_owner: Address,
        new_owner: Address,
    },
    MaxDeviationUpdated {
        bps: u16,
    },
    MinSliceAmountUpdated {
        amount: U256,
    },
}

impl SliceEvent {
    /// Short name used as the log message.
    pub fn name(&self) -> &'static str {
        match self {
            Self::VenueAdded { .. } => "VenueAdded",
            Self::VenueRemoved { .. } => "VenueRemoved",
            Self::VenueSelected { .. } => "VenueSelected",
            Self::SliceExecuted { .. } => "SliceExecuted",
            Self::AbnormalFill { .. } => "AbnormalFill",
            Self::KeeperSet { .. } => "KeeperSet",
            Self::OwnershipTransferStarted { .. } => "OwnershipTransferStarted",
            Self::OwnershipTransferred { .. } => "OwnershipTransferred",
            Self::MaxDeviationUpdated { .. } => "MaxDeviationUpdated",
            Self::MinSliceAmountUpdated { .. } => "MinSliceAmountUpdated",
        }
    }
}

/// Timestamped event as published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventRecord {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: SliceEvent,
}

/// Broadcast fan-out for executor events.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EventRecord>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Subscribe to events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.tx.subscribe()
    }

    /// Log and broadcast an event.
    pub fn publish(&self, event: SliceEvent) {
        let record = EventRecord {
            at: Utc::now(),
            event,
        };

        let payload = serde_json::to_string(&record).unwrap_or_default();
        if matches!(record.event, SliceEvent::AbnormalFill { .. }) {
            warn!(event = record.event.name(), record = %payload, "Executor event");
        } else {
            info!(event = record.event.name(), record = %payload, "Executor event");
        }

        // No subscribers is fine
        let _ = self.tx.send(record);
    }

    /// Publish a batch in order.
    pub fn publish_all(&self, events: impl IntoIterator<Item = SliceEvent>) {
        for event in events {
            self.publish(event);
        }
    }
}
