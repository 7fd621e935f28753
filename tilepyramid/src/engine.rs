//! Engine facade.
//!
//! [`TileEngine`] owns every component and the threads that drive them:
//!
//! ```text
//!            resolve()                      ┌──────────────┐
//! render ───────────────► TileBuilder ────► │  TileStore   │ ◄── moka LRU
//! thread                      │             └──────────────┘
//!                             │ enqueue            ▲  ▲
//!                             ▼                    │  │ put
//!                    local LoadQueue ──► LocalLoader  │
//!                             │ miss                  │
//!                             ▼                       │
//!                    remote LoadQueue ──► RemoteLoader
//!
//! Scheduler ──tick──► RedrawSink ◄── loaders after each put
//! ```
//!
//! # Shutdown
//!
//! [`TileEngine::stop`] cancels the shared token, closes both queues (waking
//! sleeping workers), stops the scheduler and waits for the worker threads
//! with a bounded timeout. After that, [`TileEngine::resolve`] only returns
//! what is already cached.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::builder::TileBuilder;
use crate::config::EngineConfig;
use crate::coord::{grid_size, GeoPoint, MapId, ScreenPoint, TileId, MAX_ZOOM, MIN_ZOOM};
use crate::error::{CatalogError, EngineError};
use crate::geodesic::normalize_longitude;
use crate::loader::{HttpClient, LoaderContext, LocalLoader, RemoteLoader, ReqwestClient};
use crate::map::{MapDescriptor, MapRegistry, Projection};
use crate::projection::{clamp_latitude, geo_to_tile, geo_to_world, ScreenAnchor};
use crate::queue::LoadQueue;
use crate::scheduler::{join_with_timeout, RedrawSink, Scheduler, SchedulerStats};
use crate::store::TileStore;
use crate::telemetry::{EngineMetrics, TelemetrySnapshot};
use crate::tile::{ImageCodec, TileCodec, TileState};

/// What the viewport is looking at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct View {
    pub map_id: MapId,
    /// Possibly fractional zoom level.
    pub zoom: f64,
    pub center: GeoPoint,
}

impl View {
    /// Integer zoom level whose tiles are drawn for this view.
    pub fn tile_zoom(&self) -> u8 {
        self.zoom.floor().clamp(MIN_ZOOM as f64, MAX_ZOOM as f64) as u8
    }
}

/// The running tile engine.
pub struct TileEngine {
    config: EngineConfig,
    maps: Arc<MapRegistry>,
    store: Arc<TileStore>,
    local_queue: Arc<LoadQueue>,
    remote_queue: Arc<LoadQueue>,
    builder: TileBuilder,
    metrics: Arc<EngineMetrics>,
    view: RwLock<View>,
    token: CancellationToken,
    workers: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
    scheduler: Mutex<Option<Scheduler>>,
    stopped: AtomicBool,
}

impl TileEngine {
    /// Validates the configuration and catalog, then starts the loader
    /// workers and the scheduler.
    pub fn start(
        config: EngineConfig,
        maps: MapRegistry,
        http: Arc<dyn HttpClient>,
        codec: Arc<dyn TileCodec>,
        redraw: Arc<dyn RedrawSink>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        if maps.is_empty() {
            return Err(CatalogError::Empty.into());
        }
        let map_id = match config.initial_map {
            Some(id) if maps.contains(id) => id,
            Some(id) => return Err(EngineError::UnknownMap(id)),
            None => maps.first_id().ok_or(CatalogError::Empty)?,
        };
        std::fs::create_dir_all(&config.cache_dir).map_err(|source| {
            EngineError::CacheDirectory {
                path: config.cache_dir.clone(),
                source,
            }
        })?;

        let maps = Arc::new(maps);
        let store = Arc::new(TileStore::new(config.cache_capacity));
        let local_queue = Arc::new(LoadQueue::new("local"));
        let remote_queue = Arc::new(LoadQueue::new("remote"));
        let metrics = Arc::new(EngineMetrics::new());
        let builder = TileBuilder::new(
            Arc::clone(&store),
            Arc::clone(&maps),
            Arc::clone(&local_queue),
            Arc::clone(&remote_queue),
            Arc::clone(&metrics),
        );

        let mut engine = Self {
            view: RwLock::new(View {
                map_id,
                zoom: MIN_ZOOM as f64,
                center: GeoPoint::new(0.0, 0.0),
            }),
            config,
            maps,
            store,
            local_queue,
            remote_queue,
            builder,
            metrics,
            token: CancellationToken::new(),
            workers: Mutex::new(Vec::new()),
            scheduler: Mutex::new(None),
            stopped: AtomicBool::new(false),
        };
        engine.move_to(
            engine.config.initial_zoom,
            engine.config.initial_lat,
            engine.config.initial_lon,
        );
        // on error the engine is dropped, which stops whatever already runs
        engine.spawn_threads(http, codec, redraw)?;

        info!(
            map = map_id,
            cache_dir = %engine.config.cache_dir.display(),
            cache_only = engine.config.cache_only,
            capacity = engine.config.cache_capacity,
            "Tile engine started"
        );
        Ok(engine)
    }

    /// Starts with the reqwest HTTP client and the `image` codec.
    pub fn start_default(
        config: EngineConfig,
        maps: MapRegistry,
        redraw: Arc<dyn RedrawSink>,
    ) -> Result<Self, EngineError> {
        let http = Arc::new(ReqwestClient::with_timeout(config.request_timeout)?);
        Self::start(config, maps, http, Arc::new(ImageCodec), redraw)
    }

    fn spawn_threads(
        &mut self,
        http: Arc<dyn HttpClient>,
        codec: Arc<dyn TileCodec>,
        redraw: Arc<dyn RedrawSink>,
    ) -> Result<(), EngineError> {
        let context = Arc::new(LoaderContext {
            store: Arc::clone(&self.store),
            maps: Arc::clone(&self.maps),
            local_queue: Arc::clone(&self.local_queue),
            remote_queue: Arc::clone(&self.remote_queue),
            codec,
            redraw: Arc::clone(&redraw),
            metrics: Arc::clone(&self.metrics),
            cache_root: self.config.cache_dir.clone(),
            cache_only: self.config.cache_only,
        });

        let local = LocalLoader::new(Arc::clone(&context));
        let token = self.token.clone();
        self.spawn_worker("local-loader", move || local.run(token))?;

        if self.config.cache_only {
            debug!("Cache-only mode, remote loader not started");
        } else {
            let remote = RemoteLoader::new(context, http, self.config.server_url());
            let token = self.token.clone();
            self.spawn_worker("remote-loader", move || remote.run(token))?;
        }

        let scheduler = Scheduler::start(
            self.config.animation_period,
            self.config.rolling_samples,
            redraw,
        )?;
        *self.scheduler.lock() = Some(scheduler);
        Ok(())
    }

    fn spawn_worker(
        &self,
        name: &'static str,
        work: impl FnOnce() + Send + 'static,
    ) -> Result<(), EngineError> {
        let handle = std::thread::Builder::new()
            .name(format!("tilepyramid-{name}"))
            .spawn(work)
            .map_err(|source| EngineError::Spawn { name, source })?;
        self.workers.lock().push((name, handle));
        Ok(())
    }

    /// Best currently available tile for `id`, queueing whatever loads and
    /// synthesis would improve it. `None` for invalid ids.
    ///
    /// After [`stop`](Self::stop) this only reads the store.
    pub fn resolve(&self, id: TileId) -> Option<Arc<TileState>> {
        if self.is_stopped() {
            return self.store.get(&id);
        }
        self.builder.resolve(id)
    }

    /// Moves the viewport. The zoom is clamped to the supported range, the
    /// latitude to the active projection's band and the longitude is wrapped.
    /// Non-finite components are ignored.
    pub fn move_to(&self, zoom: f64, lat: f64, lon: f64) {
        let mut view = self.view.write();
        let projection = self.projection_of(view.map_id);
        if zoom.is_finite() {
            view.zoom = zoom.clamp(MIN_ZOOM as f64, MAX_ZOOM as f64);
        }
        if lat.is_finite() {
            view.center.lat = clamp_latitude(lat, projection);
        }
        if lon.is_finite() {
            view.center.lon = normalize_longitude(lon);
        }
        debug!(zoom = view.zoom, lat = view.center.lat, lon = view.center.lon, "View moved");
    }

    /// Switches the map being displayed.
    pub fn set_active_map(&self, map_id: MapId) -> Result<(), EngineError> {
        if !self.maps.contains(map_id) {
            return Err(EngineError::UnknownMap(map_id));
        }
        let mut view = self.view.write();
        view.map_id = map_id;
        let projection = self.projection_of(map_id);
        view.center.lat = clamp_latitude(view.center.lat, projection);
        info!(map = map_id, "Active map changed");
        Ok(())
    }

    pub fn view(&self) -> View {
        *self.view.read()
    }

    pub fn active_map(&self) -> Option<&MapDescriptor> {
        self.maps.get(self.view().map_id)
    }

    /// Tile under the viewport centre at the view's tile zoom.
    pub fn center_tile(&self) -> TileId {
        let view = self.view();
        let z = view.tile_zoom();
        geo_to_tile(view.center, self.projection_of(view.map_id), z as f64).tile_id(view.map_id, z)
    }

    /// Per-frame setup: re-sorts both load queues around the centre tile and
    /// returns the screen anchor for a `width` x `height` viewport.
    pub fn prepare_frame(&self, width: u32, height: u32) -> ScreenAnchor {
        let view = self.view();
        let center = self.center_tile();
        self.local_queue.reprioritize(&center);
        self.remote_queue.reprioritize(&center);

        ScreenAnchor::new(
            ScreenPoint::new(width as f64 / 2.0, height as f64 / 2.0),
            geo_to_world(view.center, self.projection_of(view.map_id)),
            view.zoom,
            self.config.tile_size,
        )
    }

    /// Tiles covering a `width` x `height` viewport centred on the view, at
    /// the view's tile zoom, nearest to the centre first.
    pub fn visible_tiles(&self, width: u32, height: u32) -> Vec<TileId> {
        let view = self.view();
        let z = view.tile_zoom();
        let size = grid_size(z);
        let center = geo_to_tile(view.center, self.projection_of(view.map_id), z as f64);
        let half_w = width as f64 / 2.0 / self.config.tile_size as f64;
        let half_h = height as f64 / 2.0 / self.config.tile_size as f64;

        let clip = |v: f64| v.floor().clamp(0.0, (size - 1) as f64) as u32;
        let (x0, x1) = (clip(center.x - half_w), clip(center.x + half_w));
        let (y0, y1) = (clip(center.y - half_h), clip(center.y + half_h));

        let mut tiles: Vec<TileId> = (y0..=y1)
            .flat_map(|y| (x0..=x1).map(move |x| TileId::new(view.map_id, z, x, y)))
            .collect();
        tiles.sort_by(|a, b| {
            let da = (a.x as f64 + 0.5 - center.x).hypot(a.y as f64 + 0.5 - center.y);
            let db = (b.x as f64 + 0.5 - center.x).hypot(b.y as f64 + 0.5 - center.y);
            da.total_cmp(&db)
        });
        tiles
    }

    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.metrics.snapshot(self.store.stats().evictions)
    }

    pub fn scheduler_stats(&self) -> SchedulerStats {
        self.scheduler
            .lock()
            .as_ref()
            .map(Scheduler::stats)
            .unwrap_or_default()
    }

    /// Ids waiting in or being processed by the local and remote queues.
    pub fn pending_loads(&self) -> (usize, usize) {
        (self.local_queue.len(), self.remote_queue.len())
    }

    pub fn store(&self) -> &Arc<TileStore> {
        &self.store
    }

    pub fn maps(&self) -> &MapRegistry {
        &self.maps
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache_dir(&self) -> &Path {
        &self.config.cache_dir
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Shuts down the workers and the scheduler.
    ///
    /// Returns `false` if some thread did not exit within the configured
    /// shutdown timeout. Calling it again is a no-op.
    pub fn stop(&self) -> bool {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return true;
        }
        info!("Stopping tile engine");
        self.token.cancel();
        self.local_queue.close();
        self.remote_queue.close();

        let timeout = self.config.shutdown_timeout;
        let started = Instant::now();
        let mut clean = match self.scheduler.lock().as_mut() {
            Some(scheduler) => scheduler.stop(timeout),
            None => true,
        };
        for (name, handle) in self.workers.lock().drain(..) {
            let remaining = timeout.saturating_sub(started.elapsed());
            clean &= join_with_timeout(handle, remaining, name);
        }

        if clean {
            info!("Tile engine stopped");
        } else {
            warn!("Tile engine stopped with threads still running");
        }
        clean
    }

    fn projection_of(&self, map_id: MapId) -> Projection {
        self.maps
            .get(map_id)
            .map(|map| map.projection)
            .unwrap_or_default()
    }
}

impl Drop for TileEngine {
    fn drop(&mut self) {
        self.stop();
    }
}
