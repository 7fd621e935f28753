//! Deduplicated, viewport-ordered load queue.
//!
//! Each [`LoadQueue`] is consumed by exactly one worker thread. It tracks two
//! things under one mutex:
//!
//! - `pending`: every id that is queued *or* currently being loaded. This is
//!   the dedup set; an id stays in it from [`LoadQueue::enqueue`] until the
//!   worker calls [`LoadQueue::complete`].
//! - `order`: the ids still waiting, in pop order.
//!
//! The worker sleeps on a condition variable while `order` is empty and is
//! woken by `enqueue` or `close`. Only bookkeeping happens under the mutex;
//! the worker does its I/O after [`LoadQueue::next`] returns.
//!
//! # Ordering
//!
//! Before each render pass the engine calls [`LoadQueue::reprioritize`] with
//! the tile under the viewport centre. Waiting ids are then sorted by
//! [`LoadPriority`]: tiles of the active map first, then by zoom distance, then
//! by tile-grid distance. The order is a heuristic; ids enqueued after the
//! sort are appended at the back until the next pass.

use std::cmp::Ordering;
use std::collections::{HashSet, VecDeque};

use parking_lot::{Condvar, Mutex};

use crate::coord::TileId;

/// Sort key of a queued id relative to the viewport-centre tile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadPriority {
    /// The id belongs to a map other than the centre tile's.
    pub background: bool,
    /// `|z - centre.z|`.
    pub zoom_distance: u8,
    /// Euclidean distance of tile centres in tile units of the id's zoom.
    pub grid_distance: f64,
}

impl LoadPriority {
    pub fn new(id: &TileId, center: &TileId) -> Self {
        let (cx, cy) = center.center_at_zoom(id.z);
        let (ix, iy) = id.center_at_zoom(id.z);
        Self {
            background: id.map_id != center.map_id,
            zoom_distance: id.z.abs_diff(center.z),
            grid_distance: (ix - cx).hypot(iy - cy),
        }
    }
}

impl Eq for LoadPriority {}

impl PartialOrd for LoadPriority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LoadPriority {
    fn cmp(&self, other: &Self) -> Ordering {
        self.background
            .cmp(&other.background)
            .then(self.zoom_distance.cmp(&other.zoom_distance))
            .then(self.grid_distance.total_cmp(&other.grid_distance))
    }
}

#[derive(Debug, Default)]
struct QueueInner {
    pending: HashSet<TileId>,
    order: VecDeque<TileId>,
    closed: bool,
}

/// Pending-id set consumed by one loader worker.
#[derive(Debug)]
pub struct LoadQueue {
    name: &'static str,
    inner: Mutex<QueueInner>,
    available: Condvar,
}

impl LoadQueue {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inner: Mutex::new(QueueInner::default()),
            available: Condvar::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Adds an id unless it is already pending or the queue is closed.
    ///
    /// Returns `true` if the id was added.
    pub fn enqueue(&self, id: TileId) -> bool {
        let mut inner = self.inner.lock();
        if inner.closed || !inner.pending.insert(id) {
            return false;
        }
        inner.order.push_back(id);
        drop(inner);

        self.available.notify_one();
        true
    }

    /// Whether the id is queued or being loaded.
    pub fn is_pending(&self, id: &TileId) -> bool {
        self.inner.lock().pending.contains(id)
    }

    /// Blocks until an id is available and returns it, or returns `None` once
    /// the queue is closed.
    ///
    /// The id remains pending until [`complete`](Self::complete) is called.
    pub fn next(&self) -> Option<TileId> {
        let mut inner = self.inner.lock();
        loop {
            if inner.closed {
                return None;
            }
            if let Some(id) = inner.order.pop_front() {
                return Some(id);
            }
            self.available.wait(&mut inner);
        }
    }

    /// Non-blocking variant of [`next`](Self::next).
    pub fn try_next(&self) -> Option<TileId> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return None;
        }
        inner.order.pop_front()
    }

    /// Marks a popped id as finished so it can be enqueued again.
    pub fn complete(&self, id: &TileId) {
        self.inner.lock().pending.remove(id);
    }

    /// Re-sorts waiting ids by their [`LoadPriority`] relative to `center`.
    pub fn reprioritize(&self, center: &TileId) {
        let mut inner = self.inner.lock();
        inner
            .order
            .make_contiguous()
            .sort_by_cached_key(|id| LoadPriority::new(id, center));
    }

    /// Wakes the worker and makes every further `next` return `None`.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        inner.order.clear();
        drop(inner);

        self.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Number of pending ids, including the one being loaded.
    pub fn len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().pending.is_empty()
    }

    /// Number of ids waiting to be popped.
    pub fn waiting(&self) -> usize {
        self.inner.lock().order.len()
    }
}
