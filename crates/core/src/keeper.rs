//! Keeper loop.
//!
//! Polls the configured loans, previews each one and executes the slice
//! with a `min_out` derived from the best quote.

use alloy::primitives::{Address, Bytes, U256};
use anyhow::Result;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::KeeperConfig;
use crate::error::SliceError;
use crate::executor::{SliceExecutor, SlicePreview, SliceResult};
use crate::u256_math::apply_basis_points;

/// Outcome counts for one polling round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundSummary {
    pub executed: usize,
    /// Nothing to do (dust, no venue) or transient failures
    pub skipped: usize,
    pub failed: usize,
}

/// Drives the executor for a fixed set of loans.
#[derive(Debug)]
pub struct Keeper {
    executor: Arc<SliceExecutor>,

    /// Identity the keeper calls the executor with
    identity: Address,

    loans: Vec<U256>,

    poll_interval: Duration,

    /// Haircut on the best quote (basis points)
    slippage_bps: u16,

    venue_data: Bytes,
}

impl Keeper {
    /// Create a keeper with default polling parameters.
    pub fn new(executor: Arc<SliceExecutor>, identity: Address, loans: Vec<U256>) -> Self {
        let defaults = KeeperConfig::default();
        Self {
            executor,
            identity,
            loans,
            poll_interval: defaults.poll_interval(),
            slippage_bps: defaults.slippage_bps,
            venue_data: Bytes::new(),
        }
    }

    /// Create a keeper from the `[keeper]` config section.
    pub fn from_config(
        executor: Arc<SliceExecutor>,
        identity: Address,
        config: &KeeperConfig,
    ) -> Result<Self> {
        Ok(Self::new(executor, identity, config.loan_ids()?)
            .with_poll_interval(config.poll_interval())
            .with_slippage(config.slippage_bps)
            .with_venue_data(config.venue_data()?))
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_slippage(mut self, slippage_bps: u16) -> Self {
        self.slippage_bps = slippage_bps;
        self
    }

    pub fn with_venue_data(mut self, venue_data: Bytes) -> Self {
        self.venue_data = venue_data;
        self
    }

    /// `min_out` to submit for a preview: the best quote less slippage,
    /// never below the executor's floor.
    pub fn min_out_for(&self, preview: &SlicePreview) -> U256 {
        apply_basis_points(preview.best_quote, self.slippage_bps)
            .map_or(preview.min_out_floor, |haircut| {
                haircut.max(preview.min_out_floor)
            })
    }

    /// Preview and execute one slice of `loan_id`.
    pub async fn process_loan(&self, loan_id: U256) -> Result<SliceResult, SliceError> {
        let preview = self
            .executor
            .preview_slice(loan_id, self.venue_data.clone())
            .await?;
        let min_out = self.min_out_for(&preview);

        debug!(
            loan_id = %loan_id,
            venue = %preview.venue,
            best_quote = %preview.best_quote,
            min_out = %min_out,
            "Submitting slice"
        );

        self.executor
            .execute_slice(self.identity, loan_id, min_out, self.venue_data.clone())
            .await
    }

    /// Process every loan once.
    pub async fn run_once(&self) -> RoundSummary {
        let mut summary = RoundSummary::default();

        for &loan_id in &self.loans {
            match self.process_loan(loan_id).await {
                Ok(result) => {
                    summary.executed += 1;
                    info!(
                        loan_id = %loan_id,
                        slice_id = result.slice_id,
                        venue = %result.venue,
                        amount_out = %result.amount_out,
                        "Slice executed"
                    );
                }
                Err(e @ (SliceError::NoPendingSlice { .. } | SliceError::NoVenueAvailable)) => {
                    summary.skipped += 1;
                    debug!(loan_id = %loan_id, reason = %e, "Nothing to slice");
                }
                Err(e) if e.is_retryable() => {
                    summary.skipped += 1;
                    warn!(loan_id = %loan_id, error = %e, "Slice attempt failed, will retry");
                }
                Err(e) => {
                    summary.failed += 1;
                    warn!(loan_id = %loan_id, error = %e, "Slice rejected");
                }
            }
        }

        summary
    }

    /// Poll until `shutdown` resolves.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) {
        info!(
            keeper = %self.identity,
            loans = self.loans.len(),
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            slippage_bps = self.slippage_bps,
            "Keeper started"
        );

        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        let mut rounds: u64 = 0;
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(rounds, "Keeper shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let round_start = Instant::now();
                    let summary = self.run_once().await;
                    rounds += 1;
                    debug!(
                        round = rounds,
                        executed = summary.executed,
                        skipped = summary.skipped,
                        failed = summary.failed,
                        round_ms = round_start.elapsed().as_millis() as u64,
                        "Keeper round complete"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExecutorConfig;
    use crate::testing::*;

    const LOAN: U256 = U256::from_limbs([1, 0, 0, 0]);

    async fn setup(pending: u64, venues: &[(&str, u64)]) -> (Arc<SliceExecutor>, Arc<MockController>) {
        let controller = Arc::new(MockController::with_pending(pending));
        let executor = Arc::new(
            SliceExecutor::new(
                OWNER,
                controller.clone(),
                FixedPrice::new(1, 0),
                ExecutorConfig::default().with_max_deviation_bps(500),
            )
            .unwrap(),
        );
        for (id, amount) in venues {
            executor
                .add_venue(OWNER, ScriptedVenue::quoting(id, *amount))
                .await
                .unwrap();
        }
        executor.set_keeper(OWNER, KEEPER, true).await.unwrap();
        (executor, controller)
    }

    fn preview(best_quote: u64, floor: u64) -> SlicePreview {
        SlicePreview {
            loan_id: LOAN,
            amount_in: u(best_quote),
            collateral_token: COLLATERAL,
            stable_token: STABLE,
            venue_index: 0,
            venue: "v".to_string(),
            best_quote: u(best_quote),
            min_out_floor: u(floor),
        }
    }

    #[tokio::test]
    async fn test_min_out_respects_floor() {
        let (executor, _) = setup(0, &[]).await;

        let keeper = Keeper::new(executor.clone(), KEEPER, vec![LOAN]).with_slippage(100);
        assert_eq!(keeper.min_out_for(&preview(10_000, 9500)), u(9900));

        // Slippage wider than the tolerance is clamped to the floor
        let keeper = Keeper::new(executor, KEEPER, vec![LOAN]).with_slippage(900);
        assert_eq!(keeper.min_out_for(&preview(10_000, 9500)), u(9500));
    }

    #[tokio::test]
    async fn test_run_once_executes_pending_loan() {
        let (executor, controller) = setup(1000, &[("a", 980), ("b", 1000)]).await;
        let keeper = Keeper::new(executor.clone(), KEEPER, vec![LOAN]);

        let summary = keeper.run_once().await;

        assert_eq!(summary.executed, 1);
        assert_eq!(*controller.marks.lock(), vec![(LOAN, u(1000), u(1000))]);
        assert_eq!(executor.slice_nonce(), 1);

        // Pending is now zero
        let summary = keeper.run_once().await;
        assert_eq!(summary.skipped, 1);
        assert_eq!(executor.slice_nonce(), 1);
    }

    #[tokio::test]
    async fn test_run_once_without_venues_skips() {
        let (executor, controller) = setup(1000, &[]).await;
        let keeper = Keeper::new(executor, KEEPER, vec![LOAN, U256::from(2u64)]);

        let summary = keeper.run_once().await;

        assert_eq!(
            summary,
            RoundSummary {
                executed: 0,
                skipped: 2,
                failed: 0,
            }
        );
        assert_eq!(controller.mark_count(), 0);
    }

    #[tokio::test]
    async fn test_unauthorized_keeper_fails() {
        let (executor, _) = setup(1000, &[("a", 1000)]).await;
        let keeper = Keeper::new(executor, STRANGER, vec![LOAN]);

        let summary = keeper.run_once().await;
        assert_eq!(summary.failed, 1);
    }

    #[tokio::test]
    async fn test_from_config() {
        let (executor, _) = setup(0, &[]).await;
        let config = KeeperConfig {
            poll_interval_ms: 250,
            slippage_bps: 30,
            loans: vec!["7".to_string(), "0x10".to_string()],
            venue_data: "0xbeef".to_string(),
        };

        let keeper = Keeper::from_config(executor, KEEPER, &config).unwrap();
        assert_eq!(keeper.loans, vec![U256::from(7u64), U256::from(16u64)]);
        assert_eq!(keeper.poll_interval, Duration::from_millis(250));
        assert_eq!(keeper.slippage_bps, 30);
        assert_eq!(keeper.venue_data, Bytes::from(vec![0xbe, 0xef]));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (executor, controller) = setup(1000, &[("a", 1000)]).await;
        let keeper = Keeper::new(executor, KEEPER, vec![LOAN])
            .with_poll_interval(Duration::from_millis(10));
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            keeper
                .run(async {
                    let _ = rx.await;
                })
                .await;
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(controller.mark_count(), 1);
    }
}
