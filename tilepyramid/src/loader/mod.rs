//! Tile loading from local storage and the tile server.
//!
//! Two workers, each on its own thread and each draining one [`LoadQueue`]:
//!
//! - [`LocalLoader`] checks the on-disk cache. A hit becomes an authoritative
//!   tile in the store; a miss is handed to the remote queue (or, in a
//!   cache-only deployment, settles the tile as confirmed absent).
//! - [`RemoteLoader`] fetches from the tile server, stores the decoded tile
//!   and persists the raw body for later local hits.
//!
//! Both call the [`RedrawSink`] after every store write.
//!
//! # Storage layout
//!
//! ```text
//! {cache_root}/{stable_id}/z{z}/{x >> 10}/x{x}/{y >> 10}/y{y}.{ext}
//! ```
//!
//! The `>> 10` shard directories keep any one directory under ~1024 entries.

pub mod http;
mod local;
mod remote;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::coord::TileId;
use crate::map::{MapDescriptor, MapRegistry};
use crate::queue::LoadQueue;
use crate::scheduler::RedrawSink;
use crate::store::TileStore;
use crate::telemetry::EngineMetrics;
use crate::tile::TileCodec;

pub use http::{FetchError, HttpClient, HttpResponse, ReqwestClient};
pub use local::{LocalLoader, LocalOutcome};
pub use remote::{RemoteLoader, RemoteOutcome};

/// Sharded on-disk location of a tile.
pub fn storage_path(cache_root: &Path, map: &MapDescriptor, id: &TileId) -> PathBuf {
    cache_root
        .join(&map.stable_id)
        .join(format!("z{}", id.z))
        .join((id.x >> 10).to_string())
        .join(format!("x{}", id.x))
        .join((id.y >> 10).to_string())
        .join(format!("y{}.{}", id.y, map.file_extension))
}

/// Tile server request URL. `base_url` is `http://host:port`.
pub fn tile_url(base_url: &str, map: &MapDescriptor, id: &TileId) -> String {
    format!(
        "{}/maps/gettile?map={}&z={}&x={}&y={}",
        base_url.trim_end_matches('/'),
        map.stable_id,
        id.z,
        id.x,
        id.y
    )
}

/// Shared state the loader workers write into.
pub struct LoaderContext {
    pub store: Arc<TileStore>,
    pub maps: Arc<MapRegistry>,
    pub local_queue: Arc<LoadQueue>,
    pub remote_queue: Arc<LoadQueue>,
    pub codec: Arc<dyn TileCodec>,
    pub redraw: Arc<dyn RedrawSink>,
    pub metrics: Arc<EngineMetrics>,
    pub cache_root: PathBuf,
    pub cache_only: bool,
}

/// Pops ids from `queue` and hands them to `load` until the queue closes or
/// `token` is cancelled. Every popped id is completed, whatever `load` did.
fn drain_queue(queue: &LoadQueue, token: &CancellationToken, mut load: impl FnMut(TileId)) {
    info!(queue = queue.name(), "Loader worker started");

    while !token.is_cancelled() {
        let Some(id) = queue.next() else {
            break;
        };
        if token.is_cancelled() {
            queue.complete(&id);
            break;
        }
        load(id);
        queue.complete(&id);
    }

    debug!(queue = queue.name(), pending = queue.len(), "Loader queue drained");
    info!(queue = queue.name(), "Loader worker stopped");
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::{Projection, TileContentType};

    fn map() -> MapDescriptor {
        MapDescriptor::new(3, "osm", "OpenStreetMap", TileContentType::Png, Projection::Spherical)
    }

    #[test]
    fn test_storage_path_shards_high_bits() {
        let id = TileId::new(3, 17, 19295, 24640);
        let path = storage_path(Path::new("/cache"), &map(), &id);
        assert_eq!(
            path,
            PathBuf::from("/cache/osm/z17/18/x19295/24/y24640.png")
        );
    }

    #[test]
    fn test_storage_path_uses_descriptor_extension() {
        let map = map().with_extension("tile");
        let path = storage_path(Path::new("cache"), &map, &TileId::new(3, 1, 0, 0));
        assert_eq!(path, PathBuf::from("cache/osm/z1/0/x0/0/y0.tile"));
    }

    #[test]
    fn test_tile_url() {
        let id = TileId::new(3, 5, 7, 9);
        assert_eq!(
            tile_url("http://localhost:8080/", &map(), &id),
            "http://localhost:8080/maps/gettile?map=osm&z=5&x=7&y=9"
        );
    }
}
