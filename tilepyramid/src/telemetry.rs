//! Engine telemetry.
//!
//! Lock-free atomic counters updated by the loader workers and the tile
//! builder, read through point-in-time snapshots.
//!
//! ```text
//! LocalLoader ──┐
//! RemoteLoader ─┼──► EngineMetrics ──► TelemetrySnapshot ──► CLI / host UI
//! TileBuilder ──┘    (atomic counters)  (plain copy)
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Counters for tile loading and synthesis.
#[derive(Debug)]
pub struct EngineMetrics {
    started: Instant,
    local_hits: AtomicU64,
    local_misses: AtomicU64,
    remote_fetched: AtomicU64,
    remote_absent: AtomicU64,
    remote_errors: AtomicU64,
    tiles_synthesized: AtomicU64,
    bytes_downloaded: AtomicU64,
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            local_hits: AtomicU64::new(0),
            local_misses: AtomicU64::new(0),
            remote_fetched: AtomicU64::new(0),
            remote_absent: AtomicU64::new(0),
            remote_errors: AtomicU64::new(0),
            tiles_synthesized: AtomicU64::new(0),
            bytes_downloaded: AtomicU64::new(0),
        }
    }

    pub fn local_hit(&self) {
        self.local_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn local_miss(&self) {
        self.local_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// A tile was downloaded and decoded.
    pub fn remote_fetched(&self, bytes: usize) {
        self.remote_fetched.fetch_add(1, Ordering::Relaxed);
        self.bytes_downloaded
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// The server does not have the tile (or sent something undecodable).
    pub fn remote_absent(&self) {
        self.remote_absent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn remote_error(&self) {
        self.remote_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tile_synthesized(&self) {
        self.tiles_synthesized.fetch_add(1, Ordering::Relaxed);
    }

    /// Takes a snapshot. `evictions` comes from the tile store, which keeps
    /// its own counter.
    pub fn snapshot(&self, evictions: u64) -> TelemetrySnapshot {
        TelemetrySnapshot {
            uptime: self.started.elapsed(),
            local_hits: self.local_hits.load(Ordering::Relaxed),
            local_misses: self.local_misses.load(Ordering::Relaxed),
            remote_fetched: self.remote_fetched.load(Ordering::Relaxed),
            remote_absent: self.remote_absent.load(Ordering::Relaxed),
            remote_errors: self.remote_errors.load(Ordering::Relaxed),
            tiles_synthesized: self.tiles_synthesized.load(Ordering::Relaxed),
            bytes_downloaded: self.bytes_downloaded.load(Ordering::Relaxed),
            store_evictions: evictions,
        }
    }
}

/// Point-in-time copy of [`EngineMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub uptime: Duration,
    pub local_hits: u64,
    pub local_misses: u64,
    pub remote_fetched: u64,
    pub remote_absent: u64,
    pub remote_errors: u64,
    pub tiles_synthesized: u64,
    pub bytes_downloaded: u64,
    pub store_evictions: u64,
}

impl TelemetrySnapshot {
    /// Fraction of local lookups that found a tile, 0.0 when nothing was looked up.
    pub fn local_hit_rate(&self) -> f64 {
        let total = self.local_hits + self.local_misses;
        if total == 0 {
            0.0
        } else {
            self.local_hits as f64 / total as f64
        }
    }

    /// Tiles loaded from any source.
    pub fn tiles_loaded(&self) -> u64 {
        self.local_hits + self.remote_fetched
    }
}

impl fmt::Display for TelemetrySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Uptime:            {:.1}s", self.uptime.as_secs_f64())?;
        writeln!(
            f,
            "Local cache:       {} hits, {} misses ({:.0}% hit rate)",
            self.local_hits,
            self.local_misses,
            self.local_hit_rate() * 100.0
        )?;
        writeln!(
            f,
            "Remote:            {} fetched ({} bytes), {} absent, {} errors",
            self.remote_fetched, self.bytes_downloaded, self.remote_absent, self.remote_errors
        )?;
        writeln!(f, "Synthesized tiles: {}", self.tiles_synthesized)?;
        write!(f, "Store evictions:   {}", self.store_evictions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_feed_snapshot() {
        let metrics = EngineMetrics::new();
        metrics.local_hit();
        metrics.local_miss();
        metrics.local_miss();
        metrics.remote_fetched(1000);
        metrics.remote_absent();
        metrics.remote_error();
        metrics.tile_synthesized();

        let snapshot = metrics.snapshot(7);
        assert_eq!(snapshot.local_hits, 1);
        assert_eq!(snapshot.local_misses, 2);
        assert_eq!(snapshot.remote_fetched, 1);
        assert_eq!(snapshot.bytes_downloaded, 1000);
        assert_eq!(snapshot.remote_absent, 1);
        assert_eq!(snapshot.remote_errors, 1);
        assert_eq!(snapshot.tiles_synthesized, 1);
        assert_eq!(snapshot.store_evictions, 7);
        assert_eq!(snapshot.tiles_loaded(), 2);
    }

    #[test]
    fn test_hit_rate_without_lookups() {
        assert_eq!(TelemetrySnapshot::default().local_hit_rate(), 0.0);
    }

    #[test]
    fn test_display_mentions_counters() {
        let metrics = EngineMetrics::new();
        metrics.local_hit();
        let text = metrics.snapshot(0).to_string();
        assert!(text.contains("1 hits"));
        assert!(text.contains("100% hit rate"));
    }
}
