//! Pyramid fallback: synthesizing missing tiles from their ancestors.
//!
//! [`TileBuilder::resolve`] always returns the best tile available right now
//! and, as a side effect, queues the loads that will make it better:
//!
//! 1. Invalid ids (bad zoom, outside the grid, unknown map) resolve to `None`
//!    and queue nothing.
//! 2. A missing entry gets a pending placeholder; any entry still waiting for
//!    its exact tile is queued for the local loader, unless the remote loader
//!    already has it.
//! 3. Entries that need no building are returned as-is.
//! 4. Otherwise the parent is resolved first (recursion strictly decreases
//!    `z`, so the depth is bounded by the starting zoom).
//! 5. An entry already built from a parent of the same level is not rebuilt;
//!    once that parent is ready the entry is marked as final.
//! 6. Otherwise the parent's quadrant is upscaled into a new approximation
//!    one generation further from real data and written through the store's
//!    merge policy.

use std::sync::Arc;

use tracing::trace;

use crate::coord::TileId;
use crate::map::MapRegistry;
use crate::queue::LoadQueue;
use crate::store::TileStore;
use crate::telemetry::EngineMetrics;
use crate::tile::{upscale_quadrant, TileLevel, TileState};

/// Resolves tiles against the store, queueing loads and synthesizing
/// approximations.
pub struct TileBuilder {
    store: Arc<TileStore>,
    maps: Arc<MapRegistry>,
    local_queue: Arc<LoadQueue>,
    remote_queue: Arc<LoadQueue>,
    metrics: Arc<EngineMetrics>,
}

impl TileBuilder {
    pub fn new(
        store: Arc<TileStore>,
        maps: Arc<MapRegistry>,
        local_queue: Arc<LoadQueue>,
        remote_queue: Arc<LoadQueue>,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self {
            store,
            maps,
            local_queue,
            remote_queue,
            metrics,
        }
    }

    /// Best currently available state for `id`, or `None` for invalid ids.
    pub fn resolve(&self, id: TileId) -> Option<Arc<TileState>> {
        if let Err(e) = id.validate() {
            trace!(tile = %id, error = %e, "Ignoring invalid tile id");
            return None;
        }
        if !self.maps.contains(id.map_id) {
            trace!(tile = %id, "Ignoring tile of unknown map");
            return None;
        }
        Some(self.resolve_valid(id))
    }

    fn resolve_valid(&self, id: TileId) -> Arc<TileState> {
        let entry = match self.store.get(&id) {
            Some(entry) => entry,
            None => self.store.put(id, TileState::pending()),
        };
        if entry.needs_load {
            self.request_load(id);
        }
        if !entry.needs_build {
            return entry;
        }

        let Some(parent_id) = id.parent() else {
            return entry;
        };
        debug_assert!(parent_id.z < id.z);
        let parent = self.resolve_valid(parent_id);
        let (Some(parent_pixels), Some(parent_generations)) =
            (parent.pixels.as_ref(), parent.level.generations())
        else {
            return entry;
        };

        let target = parent_generations + 1;
        if let TileLevel::Synthesized(current) = entry.level {
            if current <= target {
                if !parent.ready() {
                    return entry;
                }
                // the parent is final, so this approximation is too
                return self.store.put(
                    id,
                    TileState {
                        pixels: entry.pixels.clone(),
                        needs_load: entry.needs_load,
                        needs_build: false,
                        level: entry.level,
                    },
                );
            }
        }

        let (qx, qy) = id.quadrant();
        let pixels = upscale_quadrant(
            parent_pixels,
            qx,
            qy,
            parent_pixels.width(),
            parent_pixels.height(),
        );
        self.metrics.tile_synthesized();
        trace!(tile = %id, generations = target, "Synthesized tile from ancestor");

        self.store.put(
            id,
            TileState::synthesized(pixels, target, entry.needs_load, !parent.ready()),
        )
    }

    /// Queues the exact tile for the local loader unless a remote fetch for
    /// it is already in flight.
    fn request_load(&self, id: TileId) {
        if !self.remote_queue.is_pending(&id) {
            self.local_queue.enqueue(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::fixtures::{registry, MAP};
    use crate::tile::PixelBuffer;
    use rand::Rng;

    struct Fixture {
        store: Arc<TileStore>,
        local: Arc<LoadQueue>,
        remote: Arc<LoadQueue>,
        metrics: Arc<EngineMetrics>,
        builder: TileBuilder,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(TileStore::new(256));
        let local = Arc::new(LoadQueue::new("local"));
        let remote = Arc::new(LoadQueue::new("remote"));
        let metrics = Arc::new(EngineMetrics::new());
        let builder = TileBuilder::new(
            store.clone(),
            registry(),
            local.clone(),
            remote.clone(),
            metrics.clone(),
        );
        Fixture {
            store,
            local,
            remote,
            metrics,
            builder,
        }
    }

    /// 8x8 RGBA tile whose red channel encodes the pixel position.
    fn ancestor_pixels() -> PixelBuffer {
        let mut data = Vec::new();
        for i in 0..64u8 {
            data.extend_from_slice(&[i, 0, 0, 255]);
        }
        PixelBuffer::new(8, 8, 4, data).unwrap()
    }

    #[test]
    fn test_invalid_ids_resolve_to_none() {
        let f = fixture();
        assert!(f.builder.resolve(TileId::new(MAP, 0, 0, 0)).is_none());
        assert!(f.builder.resolve(TileId::new(MAP, 3, 4, 0)).is_none());
        assert!(f.builder.resolve(TileId::new(99, 3, 0, 0)).is_none());
        assert!(f.local.is_empty());
        assert!(f.store.is_empty());
    }

    #[test]
    fn test_unknown_tile_gets_placeholder_and_load() {
        let f = fixture();
        let id = TileId::new(MAP, 1, 0, 0);

        let state = f.builder.resolve(id).unwrap();
        assert_eq!(state.level, TileLevel::Pending);
        assert!(state.pixels.is_none());
        assert!(f.local.is_pending(&id));
        assert!(f.store.contains(&id));
    }

    #[test]
    fn test_ready_tile_is_returned_without_loading() {
        let f = fixture();
        let id = TileId::new(MAP, 5, 3, 3);
        f.store.put(id, TileState::loaded(ancestor_pixels()));

        let state = f.builder.resolve(id).unwrap();
        assert_eq!(state.level, TileLevel::Loaded);
        assert!(f.local.is_empty());
    }

    #[test]
    fn test_remote_pending_id_is_not_queued_locally() {
        let f = fixture();
        let id = TileId::new(MAP, 2, 1, 0);
        f.remote.enqueue(id);

        f.builder.resolve(id);
        assert!(!f.local.is_pending(&id));
    }

    #[test]
    fn test_first_pass_synthesizes_from_grandparent() {
        let f = fixture();
        let ancestor = TileId::new(MAP, 3, 2, 1);
        let child = TileId::new(MAP, 5, 9, 6);
        f.store.put(ancestor, TileState::loaded(ancestor_pixels()));

        let state = f.builder.resolve(child).unwrap();

        assert_eq!(state.level, TileLevel::Synthesized(2));
        assert!(state.needs_load);
        assert!(state.needs_build, "parent is still waiting for its own tile");
        assert!(f.local.is_pending(&child));
        assert!(f.local.is_pending(&child.parent().unwrap()));
        assert_eq!(f.metrics.snapshot(0).tiles_synthesized, 2);
    }

    #[test]
    fn test_pyramid_settles_on_ready_grandparent() {
        let f = fixture();
        let ancestor = TileId::new(MAP, 3, 2, 1);
        let parent = TileId::new(MAP, 4, 4, 3);
        let child = TileId::new(MAP, 5, 9, 6);
        f.store.put(ancestor, TileState::loaded(ancestor_pixels()));
        // neither exact tile exists anywhere
        f.store.put(parent, TileState::confirmed_absent());
        f.store.put(child, TileState::confirmed_absent());

        let state = f.builder.resolve(child).unwrap();

        assert_eq!(state.level, TileLevel::Synthesized(2));
        assert!(!state.needs_build);
        assert!(state.ready());
        assert!(f.local.is_empty());

        let ancestor_pixels = ancestor_pixels();
        let (px, py) = parent.quadrant();
        let (cx, cy) = child.quadrant();
        let via_parent = upscale_quadrant(&ancestor_pixels, px, py, 8, 8);
        let expected = upscale_quadrant(&via_parent, cx, cy, 8, 8);
        assert_eq!(state.pixels.as_deref(), Some(&expected));

        let parent_state = f.store.get(&parent).unwrap();
        assert_eq!(parent_state.level, TileLevel::Synthesized(1));
        assert!(parent_state.ready());
    }

    #[test]
    fn test_no_rebuild_from_same_parent() {
        let f = fixture();
        let parent = TileId::new(MAP, 4, 4, 3);
        let child = TileId::new(MAP, 5, 9, 6);
        f.store.put(parent, TileState::loaded(ancestor_pixels()));

        f.builder.resolve(child);
        f.builder.resolve(child);
        f.builder.resolve(child);

        assert_eq!(f.metrics.snapshot(0).tiles_synthesized, 1);
        let state = f.store.get(&child).unwrap();
        assert_eq!(state.level, TileLevel::Synthesized(1));
        assert!(!state.needs_build);
        assert!(state.needs_load);
    }

    #[test]
    fn test_synthesis_marked_final_once_parent_ready() {
        let f = fixture();
        let parent = TileId::new(MAP, 4, 4, 3);
        let child = TileId::new(MAP, 5, 9, 6);
        f.store.put(
            parent,
            TileState::synthesized(ancestor_pixels(), 1, true, false),
        );
        let first = f.builder.resolve(child).unwrap();
        assert_eq!(first.level, TileLevel::Synthesized(2));
        assert!(first.needs_build);

        // parent's exact tile turns out not to exist
        f.store.put(parent, TileState::confirmed_absent());
        let second = f.builder.resolve(child).unwrap();

        assert_eq!(second.level, TileLevel::Synthesized(2));
        assert!(!second.needs_build);
        assert_eq!(f.metrics.snapshot(0).tiles_synthesized, 1);
    }

    #[test]
    fn test_loaded_parent_improves_child() {
        let f = fixture();
        let grandparent = TileId::new(MAP, 3, 2, 1);
        let parent = TileId::new(MAP, 4, 4, 3);
        let child = TileId::new(MAP, 5, 9, 6);
        f.store.put(grandparent, TileState::loaded(ancestor_pixels()));
        assert_eq!(f.builder.resolve(child).unwrap().level, TileLevel::Synthesized(2));

        f.store.put(parent, TileState::loaded(PixelBuffer::filled(8, 8, &[1, 2, 3, 255]).unwrap()));
        let state = f.builder.resolve(child).unwrap();

        assert_eq!(state.level, TileLevel::Synthesized(1));
        assert_eq!(state.pixels.as_deref().unwrap().pixel(0, 0), &[1, 2, 3, 255]);
    }

    #[test]
    fn test_concurrent_resolve_with_writer() {
        const OPERATIONS: usize = 10_000;
        let f = fixture();
        let ids: Vec<TileId> = (0..16u32)
            .map(|i| TileId::new(MAP, 6, i % 4 + 8, i / 4 + 8))
            .collect();
        let root = TileId::new(MAP, 1, 0, 0);
        f.store.put(root, TileState::loaded(PixelBuffer::filled(4, 4, &[9, 9, 9, 255]).unwrap()));

        std::thread::scope(|scope| {
            for _ in 0..4 {
                let f = &f;
                let ids = &ids;
                scope.spawn(move || {
                    let mut rng = rand::rng();
                    for _ in 0..OPERATIONS / 4 {
                        let id = ids[rng.random_range(0..ids.len())];
                        let state = f.builder.resolve(id).unwrap();
                        assert!(state.level != TileLevel::Loaded || !state.needs_build);
                    }
                });
            }
            scope.spawn(|| {
                let mut rng = rand::rng();
                for i in 0..OPERATIONS {
                    let id = ids[i % ids.len()];
                    if rng.random_bool(0.1) {
                        f.store.put(id, TileState::loaded(PixelBuffer::filled(4, 4, &[1, 1, 1, 255]).unwrap()));
                    } else {
                        f.store.put(id, TileState::confirmed_absent());
                    }
                }
            });
        });

        for id in &ids {
            let state = f.store.get(id).unwrap();
            assert!(!state.needs_load, "every id was observed by the writer");
            assert!(state.level <= TileLevel::Synthesized(5));
        }
    }
}
