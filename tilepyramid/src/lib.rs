//! TilePyramid - slippy-map tile engine
//!
//! Resolves, caches and synthesizes map tiles on demand while background
//! workers load exact tiles from a local cache and a remote tile server.
//!
//! - [`projection`] and [`geodesic`] hold the pure coordinate and geodesy math.
//! - [`store`], [`queue`], [`loader`] and [`builder`] are the tile pipeline.
//! - [`engine::TileEngine`] wires the pipeline and its threads together.

pub mod builder;
pub mod config;
pub mod coord;
pub mod engine;
pub mod error;
pub mod geodesic;
pub mod loader;
pub mod logging;
pub mod map;
pub mod projection;
pub mod queue;
pub mod scheduler;
pub mod store;
pub mod telemetry;
pub mod tile;

pub use config::{ConfigError, ConfigFile, EngineConfig};
pub use coord::{GeoPoint, MapId, TileId};
pub use engine::{TileEngine, View};
pub use error::{CatalogError, EngineError};
pub use map::{MapDescriptor, MapRegistry, Projection, TileContentType};
pub use scheduler::{NoopRedraw, RedrawSink};
pub use tile::{PixelBuffer, TileLevel, TileState};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
