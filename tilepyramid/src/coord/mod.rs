//! Coordinate value types
//!
//! Provides the tile identifier used as the cache and queue key throughout the
//! engine, plus the geographic, world and tile-space point types consumed by
//! [`crate::projection`].
//!
//! # Tile grid
//!
//! Zoom levels start at 1. At zoom `z` the grid is `2^(z-1)` tiles wide and
//! tall, so zoom 1 is a single tile covering the whole world and every
//! integer zoom step doubles the grid in each direction.

use std::fmt;

use thiserror::Error;

/// Identifier of a map in the [`crate::map::MapRegistry`].
pub type MapId = u32;

/// Coarsest valid zoom level.
pub const MIN_ZOOM: u8 = 1;

/// Finest supported zoom level (keeps grid coordinates within `u32`).
pub const MAX_ZOOM: u8 = 30;

/// Errors raised when a tile identifier is outside the tile grid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordError {
    /// Zoom level outside `MIN_ZOOM..=MAX_ZOOM`.
    #[error("invalid zoom level {0} (must be {MIN_ZOOM}..={MAX_ZOOM})")]
    InvalidZoom(u8),

    /// Column or row outside the grid for the tile's zoom level.
    #[error("tile ({x}, {y}) is outside the {size}x{size} grid at zoom {z}")]
    OutOfGrid { z: u8, x: u32, y: u32, size: u32 },
}

/// Number of tiles along one axis of the grid at integer zoom `z`.
///
/// Returns 0 for zoom levels outside the supported range.
#[inline]
pub fn grid_size(z: u8) -> u32 {
    if (MIN_ZOOM..=MAX_ZOOM).contains(&z) {
        1u32 << (z - 1)
    } else {
        0
    }
}

/// Identifies one tile of one map: `{map_id, z, x, y}`.
///
/// Equality and hashing cover all four fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId {
    pub map_id: MapId,
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl TileId {
    pub fn new(map_id: MapId, z: u8, x: u32, y: u32) -> Self {
        Self { map_id, z, x, y }
    }

    /// Checks that the zoom level is supported and `x`/`y` lie in its grid.
    pub fn validate(&self) -> Result<(), CoordError> {
        if !(MIN_ZOOM..=MAX_ZOOM).contains(&self.z) {
            return Err(CoordError::InvalidZoom(self.z));
        }
        let size = grid_size(self.z);
        if self.x >= size || self.y >= size {
            return Err(CoordError::OutOfGrid {
                z: self.z,
                x: self.x,
                y: self.y,
                size,
            });
        }
        Ok(())
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// The tile one zoom level coarser that covers this tile, if any.
    pub fn parent(&self) -> Option<TileId> {
        if self.z <= MIN_ZOOM {
            return None;
        }
        Some(TileId {
            map_id: self.map_id,
            z: self.z - 1,
            x: self.x >> 1,
            y: self.y >> 1,
        })
    }

    /// Which quarter of the parent tile this tile occupies, as `(x & 1, y & 1)`.
    #[inline]
    pub fn quadrant(&self) -> (u32, u32) {
        (self.x & 1, self.y & 1)
    }

    /// Centre of this tile expressed in tile units of zoom level `z`.
    ///
    /// Used to compare tiles of different zoom levels on a common grid.
    pub fn center_at_zoom(&self, z: u8) -> (f64, f64) {
        let shift = z as i32 - self.z as i32;
        let scale = 2.0_f64.powi(shift);
        (
            (self.x as f64 + 0.5) * scale,
            (self.y as f64 + 0.5) * scale,
        )
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}/{}", self.map_id, self.z, self.x, self.y)
    }
}

/// Geographic coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Projected coordinate normalized so the whole map spans `[0, 1] x [0, 1]`.
///
/// `x` grows eastwards, `y` grows southwards.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WorldPoint {
    pub x: f64,
    pub y: f64,
}

impl WorldPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Position in tile units at some (possibly fractional) zoom level.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TilePoint {
    pub x: f64,
    pub y: f64,
}

impl TilePoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// The integer tile containing this point on map `map_id` at zoom `z`.
    ///
    /// Does not validate; callers check [`TileId::is_valid`].
    pub fn tile_id(&self, map_id: MapId, z: u8) -> TileId {
        TileId::new(
            map_id,
            z,
            self.x.floor().max(0.0) as u32,
            self.y.floor().max(0.0) as u32,
        )
    }
}

/// Position in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

impl ScreenPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}
