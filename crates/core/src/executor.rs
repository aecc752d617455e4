//! Slice executor.
//!
//! Runs one liquidation slice end to end: read the pending amount from the
//! position controller, quote every registered venue, sell through the best
//! one, measure the fill against the price reference, then commit the slice
//! back to the controller. Either the whole invocation commits or nothing
//! observable changes.

use alloy::primitives::{Address, Bytes, U256};
use futures::future::join_all;
use parking_lot::RwLock;
use serde::Serialize;
use slicer_chain::{PendingSlice, PositionController, PriceReference};
use slicer_venues::{TradeRequest, VenueAdapter, VenueStats};
use smallvec::SmallVec;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, instrument, warn};

use crate::access::AccessControl;
use crate::config::{check_deviation_bps, ExecutorConfig, OracleFailurePolicy};
use crate::error::SliceError;
use crate::events::{EventBus, EventRecord, SliceEvent};
use crate::registry::VenueRegistry;
use crate::u256_math::{deviation_bps, expected_output, min_out_floor};

tokio::task_local! {
    /// Set while this task holds the execution guard.
    static IN_FLIGHT: ();
}

/// Quotes gathered during discovery, in registry order.
type Quotes = SmallVec<[U256; 8]>;

/// Events buffered until commit.
type PendingEvents = SmallVec<[SliceEvent; 3]>;

/// Outcome of a committed slice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SliceResult {
    /// Correlation id, strictly increasing across committed slices
    pub slice_id: u64,
    pub loan_id: U256,
    /// Registry index of the venue used
    pub venue_index: usize,
    pub venue: String,
    pub amount_in: U256,
    pub best_quote: U256,
    pub min_out: U256,
    pub amount_out: U256,
    /// `None` when the price reference could not be read
    pub deviation_bps: Option<u64>,
    /// Deviation exceeded the configured tolerance
    pub abnormal: bool,
}

/// What a slice would do right now, without executing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlicePreview {
    pub loan_id: U256,
    pub amount_in: U256,
    pub collateral_token: Address,
    pub stable_token: Address,
    pub venue_index: usize,
    pub venue: String,
    pub best_quote: U256,
    /// Smallest `min_out` an execution would accept
    pub min_out_floor: U256,
}

/// Venue chosen by discovery.
struct Selection {
    index: usize,
    venue: Arc<dyn VenueAdapter>,
    quote: U256,
}

/// Governance state values captured at the start of an invocation.
struct Snapshot {
    venues: Vec<Arc<dyn VenueAdapter>>,
    max_deviation_bps: u16,
    min_slice_amount: U256,
    next_slice_id: u64,
}

#[derive(Debug)]
struct ExecutorState {
    access: AccessControl,
    registry: VenueRegistry,
    max_deviation_bps: u16,
    min_slice_amount: U256,
    slice_nonce: u64,
}

impl ExecutorState {
    fn snapshot(&self) -> Snapshot {
        Snapshot {
            venues: self.registry.snapshot(),
            max_deviation_bps: self.max_deviation_bps,
            min_slice_amount: self.min_slice_amount,
            next_slice_id: self.slice_nonce + 1,
        }
    }
}

/// Sliced-liquidation executor.
///
/// Slice executions, previews and governance mutations are serialized by a
/// single guard. A collaborator that calls back into the executor from the
/// same task while the guard is held gets [`SliceError::ReentrantCall`].
/// A callback issued from a spawned task is not detected and waits on the
/// guard forever. Read accessors never wait on the guard.
#[derive(Debug)]
pub struct SliceExecutor {
    /// Serializes invocations
    guard: Mutex<()>,

    /// Governance state and nonce
    state: RwLock<ExecutorState>,

    /// Source of pending amounts and commit target
    controller: Arc<dyn PositionController>,

    /// Independent price used for deviation measurement
    price_reference: Arc<dyn PriceReference>,

    /// Per-venue quote timeout
    quote_timeout: Duration,

    oracle_failure_policy: OracleFailurePolicy,

    events: EventBus,

    stats: VenueStats,
}

impl SliceExecutor {
    /// Create an executor owned by `owner` with an empty venue registry.
    pub fn new(
        owner: Address,
        controller: Arc<dyn PositionController>,
        price_reference: Arc<dyn PriceReference>,
        config: ExecutorConfig,
    ) -> Result<Self, SliceError> {
        config.validate()?;

        info!(
            owner = %owner,
            max_deviation_bps = config.max_deviation_bps,
            min_slice_amount = %config.min_slice_amount,
            quote_timeout_ms = config.quote_timeout.as_millis() as u64,
            max_venues = config.max_venues,
            oracle_failure_policy = ?config.oracle_failure_policy,
            "Slice executor created"
        );

        Ok(Self {
            guard: Mutex::new(()),
            state: RwLock::new(ExecutorState {
                access: AccessControl::new(owner),
                registry: VenueRegistry::new(config.max_venues),
                max_deviation_bps: config.max_deviation_bps,
                min_slice_amount: config.min_slice_amount,
                slice_nonce: 0,
            }),
            controller,
            price_reference,
            quote_timeout: config.quote_timeout,
            oracle_failure_policy: config.oracle_failure_policy,
            events: EventBus::new(),
            stats: VenueStats::new(),
        })
    }

    /// Execute one slice of `loan_id`.
    ///
    /// `caller` must be the owner or an enabled keeper. `min_out` must be at
    /// least the best quote reduced by the deviation tolerance.
    #[instrument(skip_all, fields(caller = %caller, loan_id = %loan_id))]
    pub async fn execute_slice(
        &self,
        caller: Address,
        loan_id: U256,
        min_out: U256,
        venue_data: Bytes,
    ) -> Result<SliceResult, SliceError> {
        ensure_not_reentrant()?;
        let _guard = self.guard.lock().await;
        IN_FLIGHT
            .scope((), self.run_slice(caller, loan_id, min_out, venue_data))
            .await
    }

    async fn run_slice(
        &self,
        caller: Address,
        loan_id: U256,
        min_out: U256,
        venue_data: Bytes,
    ) -> Result<SliceResult, SliceError> {
        let started = Instant::now();

        let snapshot = {
            let state = self.state.read();
            if !state.access.is_authorized(&caller) {
                return Err(SliceError::Unauthorized(caller));
            }
            state.snapshot()
        };

        let (pending, request) = self.fetch_pending(&snapshot, loan_id, venue_data).await?;
        let selection = self
            .select_venue(&snapshot.venues, &request, Some(&self.stats))
            .await?;

        let floor = min_out_floor(selection.quote, snapshot.max_deviation_bps)
            .ok_or(SliceError::Overflow)?;
        if min_out < floor {
            warn!(
                min_out = %min_out,
                floor = %floor,
                best_quote = %selection.quote,
                "Rejecting slice: min out below floor"
            );
            return Err(SliceError::MinOutTooLow { min_out, floor });
        }

        let slice_id = snapshot.next_slice_id;
        let venue_id = selection.venue.venue_id().to_string();
        let mut events = PendingEvents::new();
        events.push(SliceEvent::VenueSelected {
            slice_id,
            venue: venue_id.clone(),
            quote: selection.quote,
        });

        let sell_start = Instant::now();
        let amount_out = selection
            .venue
            .sell(&request, min_out)
            .await
            .map_err(|error| SliceError::Execution {
                venue: venue_id.clone(),
                error,
            })?;
        debug!(
            venue = %venue_id,
            amount_out = %amount_out,
            sell_ms = sell_start.elapsed().as_millis() as u64,
            "Sell completed"
        );

        let deviation = match self.measure_deviation(pending.amount, amount_out).await {
            Ok(bps) => Some(bps),
            Err(e) if self.oracle_failure_policy == OracleFailurePolicy::CommitUnmeasured => {
                warn!(error = %e, slice_id, "Committing slice with deviation unknown");
                None
            }
            Err(e) => {
                warn!(error = %e, slice_id, "Deviation measurement failed, aborting slice");
                return Err(e);
            }
        };
        let abnormal = deviation.is_some_and(|bps| bps > u64::from(snapshot.max_deviation_bps));

        self.controller
            .mark_slice_processed(loan_id, pending.amount, amount_out)
            .await
            .map_err(SliceError::Controller)?;

        self.state.write().slice_nonce = slice_id;
        self.stats.record_win(&venue_id);

        events.push(SliceEvent::SliceExecuted {
            slice_id,
            loan_id,
            venue: venue_id.clone(),
            amount_in: pending.amount,
            amount_out,
            deviation_bps: deviation,
        });
        if let (true, Some(bps)) = (abnormal, deviation) {
            events.push(SliceEvent::AbnormalFill {
                slice_id,
                deviation_bps: bps,
            });
        }
        self.events.publish_all(events);

        info!(
            slice_id,
            venue = %venue_id,
            amount_in = %pending.amount,
            amount_out = %amount_out,
            deviation_bps = ?deviation,
            abnormal,
            total_ms = started.elapsed().as_millis() as u64,
            "Slice committed"
        );

        Ok(SliceResult {
            slice_id,
            loan_id,
            venue_index: selection.index,
            venue: venue_id,
            amount_in: pending.amount,
            best_quote: selection.quote,
            min_out,
            amount_out,
            deviation_bps: deviation,
            abnormal,
        })
    }

    /// Run discovery for `loan_id` without selling or committing anything.
    ///
    /// Needs no authorization and leaves venue stats untouched. Fails the
    /// same way an execution would before its sell step.
    #[instrument(skip_all, fields(loan_id = %loan_id))]
    pub async fn preview_slice(
        &self,
        loan_id: U256,
        venue_data: Bytes,
    ) -> Result<SlicePreview, SliceError> {
        ensure_not_reentrant()?;
        let _guard = self.guard.lock().await;
        IN_FLIGHT
            .scope((), async move {
                let snapshot = self.state.read().snapshot();
                let (pending, request) =
                    self.fetch_pending(&snapshot, loan_id, venue_data).await?;
                let selection = self.select_venue(&snapshot.venues, &request, None).await?;
                let floor = min_out_floor(selection.quote, snapshot.max_deviation_bps)
                    .ok_or(SliceError::Overflow)?;

                Ok(SlicePreview {
                    loan_id,
                    amount_in: pending.amount,
                    collateral_token: pending.collateral_token,
                    stable_token: pending.stable_token,
                    venue_index: selection.index,
                    venue: selection.venue.venue_id().to_string(),
                    best_quote: selection.quote,
                    min_out_floor: floor,
                })
            })
            .await
    }

    /// Read the pending amount and reject dust.
    async fn fetch_pending(
        &self,
        snapshot: &Snapshot,
        loan_id: U256,
        venue_data: Bytes,
    ) -> Result<(PendingSlice, TradeRequest), SliceError> {
        let pending = self
            .controller
            .pending_slice(loan_id)
            .await
            .map_err(SliceError::Controller)?;

        if pending.amount.is_zero() || pending.amount < snapshot.min_slice_amount {
            debug!(
                pending = %pending.amount,
                min_slice = %snapshot.min_slice_amount,
                "No pending slice"
            );
            return Err(SliceError::NoPendingSlice {
                loan_id,
                pending: pending.amount,
                min_slice: snapshot.min_slice_amount,
            });
        }

        let request = TradeRequest::new(
            pending.collateral_token,
            pending.stable_token,
            pending.amount,
        )
        .with_venue_data(venue_data);

        Ok((pending, request))
    }

    /// Quote every venue and pick the best one.
    async fn select_venue(
        &self,
        venues: &[Arc<dyn VenueAdapter>],
        request: &TradeRequest,
        stats: Option<&VenueStats>,
    ) -> Result<Selection, SliceError> {
        let quotes = self.discover(venues, request, stats).await;
        let (index, quote) = select_best(&quotes).ok_or(SliceError::NoVenueAvailable)?;
        let venue = venues
            .get(index)
            .cloned()
            .ok_or(SliceError::NoVenueAvailable)?;

        debug!(
            index,
            venue = venue.venue_id(),
            quote = %quote,
            candidates = venues.len(),
            "Venue selected"
        );

        Ok(Selection {
            index,
            venue,
            quote,
        })
    }

    /// Query all venues concurrently. Errors and timeouts count as zero.
    ///
    /// Outcomes are counted in `stats` when given.
    async fn discover(
        &self,
        venues: &[Arc<dyn VenueAdapter>],
        request: &TradeRequest,
        stats: Option<&VenueStats>,
    ) -> Quotes {
        let timeout = self.quote_timeout;

        let quotes = join_all(venues.iter().map(|venue| async move {
            let venue_id = venue.venue_id();
            match tokio::time::timeout(timeout, venue.quote(request)).await {
                Ok(Ok(quote)) => {
                    if let (Some(stats), false) = (stats, quote.is_zero()) {
                        stats.record_quote(venue_id);
                    }
                    debug!(venue = venue_id, quote = %quote, "Quote received");
                    quote
                }
                Ok(Err(e)) => {
                    if let Some(stats) = stats {
                        stats.record_failure(venue_id);
                    }
                    warn!(venue = venue_id, error = %e, "Quote failed, treating as zero");
                    U256::ZERO
                }
                Err(_) => {
                    if let Some(stats) = stats {
                        stats.record_failure(venue_id);
                    }
                    warn!(
                        venue = venue_id,
                        timeout_ms = timeout.as_millis() as u64,
                        "Quote timed out, treating as zero"
                    );
                    U256::ZERO
                }
            }
        }))
        .await;

        quotes.into_iter().collect()
    }

    /// Deviation of `amount_out` from the reference-priced expectation.
    async fn measure_deviation(&self, amount_in: U256, amount_out: U256) -> Result<u64, SliceError> {
        let price = self
            .price_reference
            .latest_price()
            .await
            .map_err(|e| SliceError::OracleUnavailable(format!("{e:#}")))?;
        let unit_price = price.positive_price().ok_or(SliceError::OraclePriceInvalid)?;
        let expected =
            expected_output(amount_in, unit_price, price.decimals).ok_or(SliceError::Overflow)?;
        let deviation = deviation_bps(expected, amount_out);

        debug!(
            price = price.price_f64(),
            updated_at = price.updated_at,
            expected = %expected,
            amount_out = %amount_out,
            deviation_bps = deviation,
            "Fill measured against price reference"
        );

        Ok(deviation)
    }

    // ---- Governance ----

    /// Enable or disable a keeper. Owner only.
    pub async fn set_keeper(
        &self,
        caller: Address,
        identity: Address,
        enabled: bool,
    ) -> Result<(), SliceError> {
        ensure_not_reentrant()?;
        let _guard = self.guard.lock().await;

        self.state
            .write()
            .access
            .set_keeper(&caller, identity, enabled)?;
        self.events
            .publish(SliceEvent::KeeperSet { identity, enabled });
        Ok(())
    }

    /// Set the deviation tolerance. Owner only, must stay below 2000 bps.
    pub async fn set_max_deviation_bps(&self, caller: Address, bps: u16) -> Result<(), SliceError> {
        ensure_not_reentrant()?;
        let _guard = self.guard.lock().await;

        {
            let mut state = self.state.write();
            state.access.ensure_owner(&caller)?;
            check_deviation_bps(bps)?;
            state.max_deviation_bps = bps;
        }
        self.events.publish(SliceEvent::MaxDeviationUpdated { bps });
        Ok(())
    }

    /// Set the dust threshold. Owner only.
    pub async fn set_min_slice_amount(
        &self,
        caller: Address,
        amount: U256,
    ) -> Result<(), SliceError> {
        ensure_not_reentrant()?;
        let _guard = self.guard.lock().await;

        {
            let mut state = self.state.write();
            state.access.ensure_owner(&caller)?;
            state.min_slice_amount = amount;
        }
        self.events
            .publish(SliceEvent::MinSliceAmountUpdated { amount });
        Ok(())
    }

    /// Register a venue. Owner only. Returns its index.
    pub async fn add_venue(
        &self,
        caller: Address,
        venue: Arc<dyn VenueAdapter>,
    ) -> Result<usize, SliceError> {
        ensure_not_reentrant()?;
        let _guard = self.guard.lock().await;

        let venue_id = venue.venue_id().to_string();
        let index = {
            let mut state = self.state.write();
            state.access.ensure_owner(&caller)?;
            state.registry.add(venue)?
        };
        self.events.publish(SliceEvent::VenueAdded {
            index,
            venue: venue_id,
        });
        Ok(index)
    }

    /// Remove the venue at `index`. Owner only.
    ///
    /// The last venue takes the freed slot, so indexes are not stable
    /// across removals.
    pub async fn remove_venue(
        &self,
        caller: Address,
        index: usize,
    ) -> Result<Arc<dyn VenueAdapter>, SliceError> {
        ensure_not_reentrant()?;
        let _guard = self.guard.lock().await;

        let removed = {
            let mut state = self.state.write();
            state.access.ensure_owner(&caller)?;
            state.registry.remove(index)?
        };
        self.events.publish(SliceEvent::VenueRemoved {
            index,
            venue: removed.venue_id().to_string(),
        });
        Ok(removed)
    }

    /// Start an ownership handoff. Owner only.
    pub async fn transfer_ownership(
        &self,
        caller: Address,
        new_owner: Address,
    ) -> Result<(), SliceError> {
        ensure_not_reentrant()?;
        let _guard = self.guard.lock().await;

        self.state
            .write()
            .access
            .transfer_ownership(&caller, new_owner)?;
        self.events.publish(SliceEvent::OwnershipTransferStarted {
            owner: caller,
            pending_owner: new_owner,
        });
        Ok(())
    }

    /// Complete an ownership handoff. Pending owner only.
    pub async fn accept_ownership(&self, caller: Address) -> Result<(), SliceError> {
        ensure_not_reentrant()?;
        let _guard = self.guard.lock().await;

        let previous_owner = self.state.write().access.accept_ownership(&caller)?;
        self.events.publish(SliceEvent::OwnershipTransferred {
            previous_owner,
            new_owner: caller,
        });
        Ok(())
    }

    // ---- Accessors ----

    pub fn owner(&self) -> Address {
        self.state.read().access.owner()
    }

    pub fn pending_owner(&self) -> Option<Address> {
        self.state.read().access.pending_owner()
    }

    pub fn is_keeper(&self, identity: &Address) -> bool {
        self.state.read().access.is_keeper(identity)
    }

    pub fn max_deviation_bps(&self) -> u16 {
        self.state.read().max_deviation_bps
    }

    pub fn min_slice_amount(&self) -> U256 {
        self.state.read().min_slice_amount
    }

    /// Number of committed slices; also the id of the latest one.
    pub fn slice_nonce(&self) -> u64 {
        self.state.read().slice_nonce
    }

    pub fn venue_count(&self) -> usize {
        self.state.read().registry.len()
    }

    /// Registered venues as `(index, venue_id)`.
    pub fn venues(&self) -> Vec<(usize, String)> {
        self.state.read().registry.venue_ids()
    }

    pub fn oracle_failure_policy(&self) -> OracleFailurePolicy {
        self.oracle_failure_policy
    }

    /// Subscribe to executor events.
    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.events.subscribe()
    }

    pub fn venue_stats(&self) -> &VenueStats {
        &self.stats
    }
}

/// Pick the highest non-zero quote. Ties go to the lowest index.
pub fn select_best(quotes: &[U256]) -> Option<(usize, U256)> {
    let mut best: Option<(usize, U256)> = None;
    for (index, quote) in quotes.iter().enumerate() {
        if quote.is_zero() {
            continue;
        }
        match best {
            Some((_, current)) if *quote <= current => {}
            _ => best = Some((index, *quote)),
        }
    }
    best
}

fn ensure_not_reentrant() -> Result<(), SliceError> {
    if IN_FLIGHT.try_with(|_| ()).is_ok() {
        return Err(SliceError::ReentrantCall);
    }
    Ok(())
}
