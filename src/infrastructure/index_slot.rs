//! Current Index Slot
//!
//! Holds the GeoIndex currently being served. Readers take a snapshot
//! without locking; a refresh replaces the whole index in one atomic store.

use crate::domain::services::GeoIndex;
use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Atomically replaceable reference to the served index.
///
/// A snapshot obtained by [`GeoIndexSlot::snapshot`] stays valid for as
/// long as the caller holds it, even if a newer index is stored meanwhile.
/// Old indexes are freed when the last snapshot is dropped.
pub struct GeoIndexSlot {
    current: ArcSwap<GeoIndex>,
    version: AtomicU64,
}

impl GeoIndexSlot {
    /// Create a slot serving `index` as version 0.
    pub fn new(index: GeoIndex) -> Self {
        Self {
            current: ArcSwap::from_pointee(index),
            version: AtomicU64::new(0),
        }
    }

    /// Create a slot serving an empty index.
    pub fn empty() -> Self {
        Self::new(GeoIndex::empty())
    }

    /// The index to use for one whole request.
    pub fn snapshot(&self) -> Arc<GeoIndex> {
        self.current.load_full()
    }

    /// Replace the served index and return the new version number.
    pub fn swap(&self, index: GeoIndex) -> u64 {
        self.current.store(Arc::new(index));
        self.version.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Number of successful swaps so far.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }
}

impl Default for GeoIndexSlot {
    fn default() -> Self {
        Self::empty()
    }
}
