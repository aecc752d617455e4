//! In-memory collaborators for unit tests.

use alloy::primitives::{Address, I256, U256};
use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use slicer_chain::{PendingSlice, PositionController, PriceData, PriceReference};
use slicer_venues::{TradeRequest, VenueAdapter};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use crate::SliceExecutor;

pub const OWNER: Address = Address::repeat_byte(0x01);
pub const KEEPER: Address = Address::repeat_byte(0x02);
pub const STRANGER: Address = Address::repeat_byte(0x03);
pub const COLLATERAL: Address = Address::repeat_byte(0xc0);
pub const STABLE: Address = Address::repeat_byte(0x5d);

pub fn u(value: u64) -> U256 {
    U256::from(value)
}

/// Controller holding a single pending amount for every loan.
///
/// `mark_slice_processed` subtracts the sold amount.
#[derive(Debug, Default)]
pub struct MockController {
    pending: Mutex<U256>,
    pub reads: AtomicUsize,
    pub marks: Mutex<Vec<(U256, U256, U256)>>,
    pub fail_mark: bool,
}

impl MockController {
    pub fn with_pending(amount: u64) -> Self {
        Self {
            pending: Mutex::new(u(amount)),
            ..Default::default()
        }
    }

    pub fn failing_mark(amount: u64) -> Self {
        Self {
            fail_mark: true,
            ..Self::with_pending(amount)
        }
    }

    pub fn set_pending(&self, amount: u64) {
        *self.pending.lock() = u(amount);
    }

    pub fn mark_count(&self) -> usize {
        self.marks.lock().len()
    }
}

#[async_trait]
impl PositionController for MockController {
    async fn pending_slice(&self, _loan_id: U256) -> Result<PendingSlice> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(PendingSlice {
            amount: *self.pending.lock(),
            collateral_token: COLLATERAL,
            stable_token: STABLE,
        })
    }

    async fn mark_slice_processed(
        &self,
        loan_id: U256,
        amount_in: U256,
        amount_out: U256,
    ) -> Result<()> {
        if self.fail_mark {
            anyhow::bail!("controller rejected slice");
        }
        let mut pending = self.pending.lock();
        *pending = pending.saturating_sub(amount_in);
        self.marks.lock().push((loan_id, amount_in, amount_out));
        Ok(())
    }
}

/// How a scripted venue answers quotes.
#[derive(Debug, Clone, Copy)]
pub enum QuoteBehavior {
    Amount(u64),
    /// Answer `amount` after a delay
    Delayed(u64, Duration),
    Fail,
    Hang,
}

/// Venue with scripted quote and fill.
#[derive(Debug)]
pub struct ScriptedVenue {
    id: String,
    quote: QuoteBehavior,
    /// `None` makes every sell fail
    fill: Option<u64>,
    pub sells: AtomicUsize,
    reenter: Mutex<Option<Weak<SliceExecutor>>>,
    pub inner_result: Mutex<Option<String>>,
}

impl ScriptedVenue {
    pub fn new(id: &str, quote: QuoteBehavior, fill: Option<u64>) -> Self {
        Self {
            id: id.to_string(),
            quote,
            fill,
            sells: AtomicUsize::new(0),
            reenter: Mutex::new(None),
            inner_result: Mutex::new(None),
        }
    }

    /// Venue quoting and filling the same amount.
    pub fn quoting(id: &str, amount: u64) -> Arc<Self> {
        Arc::new(Self::new(id, QuoteBehavior::Amount(amount), Some(amount)))
    }

    /// Call back into `executor` from inside `sell`.
    pub fn reenter_into(&self, executor: &Arc<SliceExecutor>) {
        *self.reenter.lock() = Some(Arc::downgrade(executor));
    }

    pub fn sell_count(&self) -> usize {
        self.sells.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VenueAdapter for ScriptedVenue {
    fn venue_id(&self) -> &str {
        &self.id
    }

    async fn quote(&self, _request: &TradeRequest) -> Result<U256> {
        match self.quote {
            QuoteBehavior::Amount(amount) => Ok(u(amount)),
            QuoteBehavior::Delayed(amount, delay) => {
                tokio::time::sleep(delay).await;
                Ok(u(amount))
            }
            QuoteBehavior::Fail => anyhow::bail!("venue {} is down", self.id),
            QuoteBehavior::Hang => std::future::pending().await,
        }
    }

    async fn sell(&self, request: &TradeRequest, min_out: U256) -> Result<U256> {
        self.sells.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;

        let executor = self.reenter.lock().as_ref().and_then(Weak::upgrade);
        if let Some(executor) = executor {
            let inner = executor
                .execute_slice(OWNER, U256::ZERO, U256::ZERO, request.venue_data.clone())
                .await;
            *self.inner_result.lock() = Some(match inner {
                Ok(_) => "ok".to_string(),
                Err(e) => e.to_string(),
            });
        }

        let fill = match self.fill {
            Some(fill) => u(fill),
            None => anyhow::bail!("venue {} reverted", self.id),
        };
        if fill < min_out {
            anyhow::bail!("output {} below min out {}", fill, min_out);
        }
        Ok(fill)
    }
}

/// Price reference returning a fixed answer.
#[derive(Debug)]
pub struct FixedPrice {
    pub price: i64,
    pub decimals: u8,
    pub fail: bool,
}

impl FixedPrice {
    pub fn new(price: i64, decimals: u8) -> Arc<Self> {
        Arc::new(Self {
            price,
            decimals,
            fail: false,
        })
    }

    pub fn unavailable() -> Arc<Self> {
        Arc::new(Self {
            price: 0,
            decimals: 0,
            fail: true,
        })
    }
}

#[async_trait]
impl PriceReference for FixedPrice {
    async fn latest_price(&self) -> Result<PriceData> {
        if self.fail {
            anyhow::bail!("feed unreachable");
        }
        let price = I256::try_from(self.price)?;
        Ok(PriceData::new(price, self.decimals))
    }
}
