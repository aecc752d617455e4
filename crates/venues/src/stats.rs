//! Per-venue discovery statistics.

use dashmap::DashMap;

/// Counters for one venue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VenueStatsSnapshot {
    /// Quotes that returned a non-zero amount
    pub quotes_ok: u64,
    /// Quotes that errored or timed out
    pub quotes_failed: u64,
    /// Slices this venue was selected for
    pub wins: u64,
}

/// Discovery statistics keyed by venue id.
///
/// Lets operators spot a venue that keeps failing before it starves the
/// selection.
#[derive(Debug, Default)]
pub struct VenueStats {
    entries: DashMap<String, VenueStatsSnapshot>,
}

impl VenueStats {
    /// Create an empty stats table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful quote.
    pub fn record_quote(&self, venue_id: &str) {
        self.entries.entry(venue_id.to_string()).or_default().quotes_ok += 1;
    }

    /// Record a failed or timed-out quote.
    pub fn record_failure(&self, venue_id: &str) {
        self.entries.entry(venue_id.to_string()).or_default().quotes_failed += 1;
    }

    /// Record a venue being selected for execution.
    pub fn record_win(&self, venue_id: &str) {
        self.entries.entry(venue_id.to_string()).or_default().wins += 1;
    }

    /// Counters for a venue.
    pub fn get(&self, venue_id: &str) -> VenueStatsSnapshot {
        self.entries.get(venue_id).map(|e| *e).unwrap_or_default()
    }

    /// All venues with their counters.
    pub fn all(&self) -> Vec<(String, VenueStatsSnapshot)> {
        self.entries
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect()
    }
}
