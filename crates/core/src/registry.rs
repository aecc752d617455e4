//! Ordered collection of active trading venues.

use slicer_venues::VenueAdapter;
use std::sync::Arc;

use crate::error::SliceError;

/// Default cap on registered venues.
pub const DEFAULT_MAX_VENUES: usize = 16;

/// Governance-managed list of venue adapters.
///
/// Duplicates are allowed and occupy independent slots. Removal swaps the
/// last entry into the removed slot, so indices are not stable across
/// mutations.
#[derive(Debug, Clone)]
pub struct VenueRegistry {
    venues: Vec<Arc<dyn VenueAdapter>>,
    max_venues: usize,
}

impl Default for VenueRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_VENUES)
    }
}

#[allow(clippy::len_without_is_empty)]
impl VenueRegistry {
    /// Create an empty registry holding at most `max_venues` adapters.
    pub fn new(max_venues: usize) -> Self {
        Self {
            venues: Vec::new(),
            max_venues,
        }
    }

    /// Append an adapter, returning its index.
    pub fn add(&mut self, venue: Arc<dyn VenueAdapter>) -> Result<usize, SliceError> {
        if self.venues.len() >= self.max_venues {
            return Err(SliceError::RegistryFull {
                max: self.max_venues,
            });
        }
        self.venues.push(venue);
        Ok(self.venues.len() - 1)
    }

    /// Swap-remove the adapter at `index`.
    pub fn remove(&mut self, index: usize) -> Result<Arc<dyn VenueAdapter>, SliceError> {
        if index >= self.venues.len() {
            return Err(SliceError::IndexOutOfRange {
                index,
                len: self.venues.len(),
            });
        }
        Ok(self.venues.swap_remove(index))
    }

    pub fn len(&self) -> usize {
        self.venues.len()
    }

    /// Copy of the current adapter list, in registry order.
    pub fn snapshot(&self) -> Vec<Arc<dyn VenueAdapter>> {
        self.venues.clone()
    }

    /// `(index, venue_id)` for every slot.
    pub fn venue_ids(&self) -> Vec<(usize, String)> {
        self.venues
            .iter()
            .enumerate()
            .map(|(i, v)| (i, v.venue_id().to_string()))
            .collect()
    }
}
