//! Integration tests for the tile engine.
//!
//! These drive a full engine (store, builder, both queues, both loader
//! threads) against a temporary cache directory and an in-process tile
//! server:
//! - remote fetch → store → persisted file → later local hit
//! - pyramid synthesis for zoom levels the server does not have
//! - cache-only operation without any network traffic
//!
//! Run with: `cargo test --test engine_integration`

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use tilepyramid::loader::{storage_path, FetchError, HttpClient, HttpResponse};
use tilepyramid::tile::{ImageCodec, TileCodec};
use tilepyramid::{
    EngineConfig, MapDescriptor, MapRegistry, NoopRedraw, PixelBuffer, Projection, RedrawSink,
    TileContentType, TileEngine, TileId, TileLevel, TileState,
};

// ============================================================================
// Helpers
// ============================================================================

const MAP: u32 = 1;

/// Serves a solid PNG for every tile up to `max_zoom`, 404 beyond it.
struct TileServer {
    png: Vec<u8>,
    max_zoom: u8,
    requests: AtomicUsize,
}

impl TileServer {
    fn new(max_zoom: u8) -> Self {
        let pixels = PixelBuffer::filled(16, 16, &[30, 120, 200, 255]).unwrap();
        Self {
            png: ImageCodec.encode(&pixels, TileContentType::Png).unwrap(),
            max_zoom,
            requests: AtomicUsize::new(0),
        }
    }

    fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl HttpClient for TileServer {
    fn get(&self, url: &str) -> Result<HttpResponse, FetchError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let z: u8 = url
            .split('&')
            .find_map(|part| part.strip_prefix("z="))
            .and_then(|z| z.parse().ok())
            .ok_or_else(|| FetchError::Request {
                url: url.to_string(),
                message: "no zoom in url".to_string(),
            })?;
        if z <= self.max_zoom {
            Ok(HttpResponse::new(200, self.png.clone()))
        } else {
            Ok(HttpResponse::new(404, Vec::new()))
        }
    }
}

#[derive(Default)]
struct RedrawCounter(AtomicUsize);

impl RedrawSink for RedrawCounter {
    fn request_redraw(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

fn catalog() -> MapRegistry {
    MapRegistry::new([MapDescriptor::new(
        MAP,
        "test-map",
        "Test map",
        TileContentType::Png,
        Projection::Spherical,
    )])
    .unwrap()
}

fn config(cache: &TempDir) -> EngineConfig {
    EngineConfig::default()
        .with_cache_dir(cache.path())
        .with_server("tiles.test", 8080)
        .with_initial_view(Some(MAP), 4.0, 0.0, 0.0)
        .with_animation(Duration::ZERO, 10)
}

/// Renders frames until every visible tile satisfies `settled` or the
/// timeout expires, returning the last frame.
fn render_until(
    engine: &TileEngine,
    width: u32,
    height: u32,
    settled: impl Fn(&TileState) -> bool,
) -> Vec<(TileId, Arc<TileState>)> {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        engine.prepare_frame(width, height);
        let frame: Vec<_> = engine
            .visible_tiles(width, height)
            .into_iter()
            .map(|id| (id, engine.resolve(id).unwrap()))
            .collect();
        if frame.iter().all(|(_, state)| settled(state.as_ref())) || Instant::now() >= deadline {
            return frame;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

fn render_until_ready(engine: &TileEngine, width: u32, height: u32) -> Vec<(TileId, Arc<TileState>)> {
    render_until(engine, width, height, TileState::ready)
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn test_missing_zoom_levels_are_synthesized_from_fetched_ancestors() {
    let cache = TempDir::new().unwrap();
    let server = Arc::new(TileServer::new(2));
    let redraw = Arc::new(RedrawCounter::default());
    let engine = TileEngine::start(
        config(&cache),
        catalog(),
        server.clone(),
        Arc::new(ImageCodec),
        redraw.clone(),
    )
    .unwrap();

    let frame = render_until_ready(&engine, 512, 512);

    assert_eq!(frame.len(), 9);
    for (id, state) in &frame {
        assert!(state.ready(), "tile {id} did not settle: {:?}", state.level);
        assert_eq!(state.level, TileLevel::Synthesized(2), "tile {id}");
        let pixels = state.pixels.as_deref().unwrap();
        assert_eq!(pixels.pixel(0, 0), &[30, 120, 200, 255]);
    }

    let telemetry = engine.telemetry();
    assert!(telemetry.remote_fetched > 0);
    assert!(telemetry.remote_absent > 0);
    assert!(telemetry.tiles_synthesized >= 9);
    assert!(server.requests() > 0);
    assert!(redraw.0.load(Ordering::SeqCst) > 0);

    // fetched ancestors were persisted for later local hits
    let map = engine.maps().get(MAP).unwrap().clone();
    let ancestor = frame[0].0.parent().unwrap().parent().unwrap();
    assert!(storage_path(cache.path(), &map, &ancestor).is_file());

    assert!(engine.stop());
}

#[test]
fn test_second_run_loads_from_local_cache() {
    let cache = TempDir::new().unwrap();
    {
        let engine = TileEngine::start(
            config(&cache),
            catalog(),
            Arc::new(TileServer::new(4)),
            Arc::new(ImageCodec),
            Arc::new(NoopRedraw),
        )
        .unwrap();
        let frame = render_until_ready(&engine, 256, 256);
        assert!(frame.iter().all(|(_, s)| s.level == TileLevel::Loaded));
        assert!(engine.stop());
    }

    let server = Arc::new(TileServer::new(4));
    let engine = TileEngine::start(
        config(&cache).with_cache_only(true),
        catalog(),
        server.clone(),
        Arc::new(ImageCodec),
        Arc::new(NoopRedraw),
    )
    .unwrap();

    let frame = render_until_ready(&engine, 256, 256);
    assert!(frame.iter().all(|(_, s)| s.level == TileLevel::Loaded));
    assert!(engine.telemetry().local_hits > 0);
    assert_eq!(server.requests(), 0);
    assert!(engine.stop());
}

#[test]
fn test_cache_only_without_data_settles_on_placeholders() {
    let cache = TempDir::new().unwrap();
    let server = Arc::new(TileServer::new(30));
    let engine = TileEngine::start(
        config(&cache).with_cache_only(true),
        catalog(),
        server.clone(),
        Arc::new(ImageCodec),
        Arc::new(NoopRedraw),
    )
    .unwrap();

    // with no ancestor anywhere nothing can be synthesized, so tiles settle
    // as absent leaves that still need building
    let frame = render_until(&engine, 256, 256, |state| !state.needs_load);
    for (id, state) in &frame {
        assert!(!state.needs_load, "tile {id} still loading");
        assert_eq!(state.level, TileLevel::ConfirmedAbsent);
        assert!(state.pixels.is_none());
    }

    let deadline = Instant::now() + Duration::from_secs(5);
    while engine.pending_loads() != (0, 0) && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(engine.pending_loads(), (0, 0));
    assert_eq!(server.requests(), 0);
    assert!(engine.stop());
}

#[test]
fn test_stop_is_prompt_and_final() {
    let cache = TempDir::new().unwrap();
    let engine = Arc::new(
        TileEngine::start(
            config(&cache).with_animation(Duration::from_millis(10), 10),
            catalog(),
            Arc::new(TileServer::new(2)),
            Arc::new(ImageCodec),
            Arc::new(NoopRedraw),
        )
        .unwrap(),
    );

    let started = Instant::now();
    assert!(engine.stop());
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(engine.is_stopped());

    let before = engine.store().len();
    assert!(engine.resolve(TileId::new(MAP, 6, 10, 10)).is_none());
    assert_eq!(engine.store().len(), before);
}
