//! Bounded tile cache with least-recently-used eviction.
//!
//! Every thread in the engine touches the store: the render/caller threads
//! read it, the loader workers and the tile builder write it. The entries live
//! in a `moka::sync::Cache` configured for pure LRU eviction:
//!
//! - [`TileStore::get`] is a lock-free lookup; the access is recorded for the
//!   LRU order when pending maintenance runs.
//! - [`TileStore::put`] merges with any existing entry (see
//!   [`TileState::merge`]) atomically per id, then runs pending maintenance so
//!   the store is back within capacity when `put` returns.
//!
//! No I/O happens inside a cache operation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use moka::notification::RemovalCause;
use moka::ops::compute::{CompResult, Op};
use moka::policy::EvictionPolicy;
use moka::sync::Cache;

use crate::coord::TileId;
use crate::tile::TileState;

/// Point-in-time store counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
    pub capacity: usize,
}

/// Shared tile cache keyed by [`TileId`].
///
/// Callers receive `Arc<TileState>` snapshots; the store exclusively owns
/// what it holds and replaces entries wholesale on write.
pub struct TileStore {
    cache: Cache<TileId, Arc<TileState>>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: Arc<AtomicU64>,
}

impl TileStore {
    /// Creates a store holding at most `capacity` tiles (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let evictions = Arc::new(AtomicU64::new(0));

        let counter = Arc::clone(&evictions);
        let cache = Cache::builder()
            .max_capacity(capacity as u64)
            .eviction_policy(EvictionPolicy::lru())
            .eviction_listener(move |id: Arc<TileId>, _state, cause| {
                if cause == RemovalCause::Size {
                    counter.fetch_add(1, Ordering::Relaxed);
                    tracing::trace!(tile = %id, "Evicted tile from store");
                }
            })
            .build();

        Self {
            cache,
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions,
        }
    }

    /// Looks up a tile and marks it as recently used.
    pub fn get(&self, id: &TileId) -> Option<Arc<TileState>> {
        match self.cache.get(id) {
            Some(state) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(state)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Stores an observation of a tile and returns the resulting entry.
    ///
    /// When the id is already present the two states are merged, so the
    /// returned entry may differ from `state`.
    pub fn put(&self, id: TileId, state: TileState) -> Arc<TileState> {
        let outcome = self.cache.entry(id).and_compute_with(|existing| {
            let merged = match existing {
                Some(entry) => entry.value().merge(&state),
                None => state,
            };
            Op::Put(Arc::new(merged))
        });
        self.cache.run_pending_tasks();

        match outcome {
            CompResult::Inserted(entry)
            | CompResult::ReplacedWith(entry)
            | CompResult::Unchanged(entry)
            | CompResult::Removed(entry) => entry.into_value(),
            // Op::Put always leaves a value behind
            CompResult::StillNone(_) => Arc::new(TileState::pending()),
        }
    }

    /// Checks for a tile without touching its recency.
    pub fn contains(&self, id: &TileId) -> bool {
        self.cache.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.cache.entry_count() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drops every entry.
    pub fn clear(&self) {
        let ids: Vec<TileId> = self.cache.iter().map(|(id, _)| *id).collect();
        for id in &ids {
            self.cache.invalidate(id);
        }
        self.cache.run_pending_tasks();
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: self.len(),
            capacity: self.capacity,
        }
    }
}

impl std::fmt::Debug for TileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileStore")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
