//! Tile cache entries.
//!
//! A [`TileState`] is what the store keeps per [`crate::coord::TileId`]: the
//! decoded pixels (if any), whether an exact fetch is still outstanding,
//! whether the entry is a synthesized approximation that may still improve,
//! and how authoritative it is ([`TileLevel`]).
//!
//! # Lifecycle
//!
//! ```text
//! Pending ──► Synthesized(n) ──► Synthesized(m < n) ──► Loaded
//!    │              ▲
//!    └──► ConfirmedAbsent (keeps the best synthesis, never refetched)
//! ```
//!
//! Entries only move towards lower levels and towards [`TileState::ready`];
//! [`TileState::merge`] enforces this when the store receives a second
//! observation for the same id.

pub mod codec;
pub mod pixels;

use std::fmt;
use std::sync::Arc;

pub use codec::{CodecError, ImageCodec, TileCodec};
pub use pixels::{upscale_quadrant, PixelBuffer};

/// How authoritative a tile entry is.
///
/// Variants are declared from most to least authoritative, so the derived
/// ordering is the merge preference: a lower value wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TileLevel {
    /// Exact tile loaded from local storage or the tile server.
    Loaded,
    /// Crop-and-scale of an ancestor this many generations up.
    Synthesized(u32),
    /// The tile server confirmed the tile does not exist.
    ConfirmedAbsent,
    /// Empty placeholder created on first request.
    Pending,
}

impl TileLevel {
    /// Distance to authoritative pixel data: 0 for loaded tiles, `n` for
    /// synthesized ones, `None` when the entry has no pixel lineage.
    pub fn generations(&self) -> Option<u32> {
        match self {
            TileLevel::Loaded => Some(0),
            TileLevel::Synthesized(n) => Some(*n),
            TileLevel::ConfirmedAbsent | TileLevel::Pending => None,
        }
    }
}

impl fmt::Display for TileLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TileLevel::Loaded => write!(f, "loaded"),
            TileLevel::Synthesized(n) => write!(f, "synthesized({})", n),
            TileLevel::ConfirmedAbsent => write!(f, "absent"),
            TileLevel::Pending => write!(f, "pending"),
        }
    }
}

/// One cache entry.
#[derive(Debug, Clone, PartialEq)]
pub struct TileState {
    pub pixels: Option<Arc<PixelBuffer>>,
    /// An exact-match fetch is still outstanding.
    pub needs_load: bool,
    /// The entry is an approximation that a better synthesis may replace.
    pub needs_build: bool,
    pub level: TileLevel,
}

impl TileState {
    /// Empty placeholder for a tile nobody has looked for yet.
    pub fn pending() -> Self {
        Self {
            pixels: None,
            needs_load: true,
            needs_build: true,
            level: TileLevel::Pending,
        }
    }

    /// Authoritative tile.
    pub fn loaded(pixels: PixelBuffer) -> Self {
        Self {
            pixels: Some(Arc::new(pixels)),
            needs_load: false,
            needs_build: false,
            level: TileLevel::Loaded,
        }
    }

    /// Tile the server does not have; it still needs synthesis from an
    /// ancestor but must never be fetched again.
    pub fn confirmed_absent() -> Self {
        Self {
            pixels: None,
            needs_load: false,
            needs_build: true,
            level: TileLevel::ConfirmedAbsent,
        }
    }

    /// Approximation built from an ancestor `generations` levels up.
    pub fn synthesized(
        pixels: PixelBuffer,
        generations: u32,
        needs_load: bool,
        needs_build: bool,
    ) -> Self {
        Self {
            pixels: Some(Arc::new(pixels)),
            needs_load,
            needs_build,
            level: TileLevel::Synthesized(generations),
        }
    }

    /// Terminal: nothing will change without external invalidation.
    #[inline]
    pub fn ready(&self) -> bool {
        !self.needs_load && !self.needs_build
    }

    /// Combines the stored entry (`self`) with a new observation.
    ///
    /// The more authoritative (lower level) of the two is kept; on a tie the
    /// incoming entry wins. `needs_load` and `needs_build` on the result are
    /// each cleared if either observation has cleared them.
    pub fn merge(&self, incoming: &TileState) -> TileState {
        let (kept, other) = if self.level < incoming.level {
            (self, incoming)
        } else {
            (incoming, self)
        };
        TileState {
            pixels: kept.pixels.clone(),
            needs_load: kept.needs_load && other.needs_load,
            needs_build: kept.needs_build && other.needs_build,
            level: kept.level,
        }
    }
}
