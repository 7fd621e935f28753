//! Local cache worker.

use std::io;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{drain_queue, storage_path, LoaderContext};
use crate::coord::TileId;
use crate::tile::{CodecError, PixelBuffer, TileState};

/// Result of probing the local cache for one tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalOutcome {
    /// Decoded and stored as an authoritative tile.
    Loaded,
    /// Not found or unreadable.
    Missing,
}

#[derive(Debug, Error)]
enum ReadError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Reads persisted tiles from the sharded cache directory.
pub struct LocalLoader {
    context: Arc<LoaderContext>,
}

impl LocalLoader {
    pub fn new(context: Arc<LoaderContext>) -> Self {
        Self { context }
    }

    /// Runs the worker loop until the local queue closes or `token` fires.
    pub fn run(&self, token: CancellationToken) {
        drain_queue(&self.context.local_queue, &token, |id| {
            self.load(id);
        });
    }

    /// Probes the cache for one tile and records the outcome.
    ///
    /// Missing or corrupt files are never errors: the id moves on to the
    /// remote queue, or is settled as absent in a cache-only deployment.
    pub fn load(&self, id: TileId) -> LocalOutcome {
        let ctx = &self.context;
        let Some(map) = ctx.maps.get(id.map_id) else {
            debug!(tile = %id, "Skipping tile of unknown map");
            return LocalOutcome::Missing;
        };

        let path = storage_path(&ctx.cache_root, map, &id);
        match self.read(&path) {
            Ok(pixels) => {
                ctx.store.put(id, TileState::loaded(pixels));
                ctx.metrics.local_hit();
                debug!(tile = %id, path = %path.display(), "Loaded tile from local cache");
                ctx.redraw.request_redraw();
                LocalOutcome::Loaded
            }
            Err(e) => {
                ctx.metrics.local_miss();
                debug!(tile = %id, path = %path.display(), error = %e, "Local cache miss");
                if ctx.cache_only {
                    ctx.store.put(id, TileState::confirmed_absent());
                    ctx.redraw.request_redraw();
                } else {
                    ctx.remote_queue.enqueue(id);
                }
                LocalOutcome::Missing
            }
        }
    }

    fn read(&self, path: &Path) -> Result<PixelBuffer, ReadError> {
        let bytes = std::fs::read(path)?;
        Ok(self.context.codec.decode(&bytes)?)
    }
}
