//! `view` command: drive the engine headlessly over a viewport.
//!
//! Each frame re-sorts the load queues around the viewport centre and resolves
//! every visible tile, the same calls a map widget would make while painting.
//! The loop ends after `--seconds` or on Ctrl+C, then the engine is stopped and
//! a summary of the visible tiles is printed.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Args;
use tilepyramid::{ConfigFile, MapId, RedrawSink, TileEngine, TileLevel};
use tracing::info;

use super::common::{format_point, resolve_map};
use crate::error::CliError;

/// Frame period used when the scheduler is disabled.
const FALLBACK_FRAME_PERIOD: Duration = Duration::from_millis(40);

#[derive(Debug, Args)]
#[command(allow_negative_numbers = true)]
pub struct ViewArgs {
    /// Latitude of the viewport centre (defaults to the configured view)
    #[arg(long)]
    pub lat: Option<f64>,
    /// Longitude of the viewport centre
    #[arg(long)]
    pub lon: Option<f64>,
    /// Fractional zoom level
    #[arg(long)]
    pub zoom: Option<f64>,
    /// Map id
    #[arg(long)]
    pub map: Option<MapId>,
    /// How long to keep resolving tiles
    #[arg(long, default_value_t = 5.0)]
    pub seconds: f64,
    /// Viewport width in pixels
    #[arg(long, default_value_t = 1024)]
    pub width: u32,
    /// Viewport height in pixels
    #[arg(long, default_value_t = 768)]
    pub height: u32,
    /// Never contact the tile server
    #[arg(long)]
    pub cache_only: bool,
}

/// Counts redraw requests from the scheduler and the loaders.
#[derive(Debug, Default)]
struct RedrawCounter {
    requests: AtomicU64,
}

impl RedrawSink for RedrawCounter {
    fn request_redraw(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }
}

/// Parses `--seconds`, rejecting negative, non-finite and oversized values.
fn view_duration(seconds: f64) -> Result<Duration, CliError> {
    Duration::try_from_secs_f64(seconds)
        .map_err(|e| CliError::Config(format!("--seconds {}: {}", seconds, e)))
}

fn deadline_after(start: Instant, run_for: Duration) -> Result<Instant, CliError> {
    start
        .checked_add(run_for)
        .ok_or_else(|| CliError::Config(format!("--seconds {} is too far in the future", run_for.as_secs_f64())))
}

pub fn run(args: ViewArgs, config: ConfigFile) -> Result<(), CliError> {
    let run_for = view_duration(args.seconds)?;
    // checked again once the engine is up; fail before starting it
    deadline_after(Instant::now(), run_for)?;
    let map_id = resolve_map(&config, args.map)?.id;

    let mut engine_config = config.engine.clone().with_initial_view(
        Some(map_id),
        args.zoom.unwrap_or(config.engine.initial_zoom),
        args.lat.unwrap_or(config.engine.initial_lat),
        args.lon.unwrap_or(config.engine.initial_lon),
    );
    if args.cache_only {
        engine_config = engine_config.with_cache_only(true);
    }
    let frame_period = if engine_config.animation_period.is_zero() {
        FALLBACK_FRAME_PERIOD
    } else {
        engine_config.animation_period
    };

    let redraws = Arc::new(RedrawCounter::default());
    let engine = Arc::new(TileEngine::start_default(
        engine_config,
        config.maps,
        Arc::clone(&redraws) as Arc<dyn RedrawSink>,
    )?);

    let handler_engine = Arc::clone(&engine);
    ctrlc::set_handler(move || {
        handler_engine.stop();
    })
    .map_err(|e| CliError::Signal(e.to_string()))?;

    let view = engine.view();
    println!(
        "Viewing map {} at {} zoom {:.2} ({}x{} px) for {:.1}s",
        view.map_id,
        format_point(view.center.lat, view.center.lon),
        view.zoom,
        args.width,
        args.height,
        args.seconds
    );

    let deadline = deadline_after(Instant::now(), run_for)?;
    let mut frames = 0u64;
    while !engine.is_stopped() && Instant::now() < deadline {
        engine.prepare_frame(args.width, args.height);
        for id in engine.visible_tiles(args.width, args.height) {
            engine.resolve(id);
        }
        frames += 1;
        std::thread::sleep(frame_period);
    }
    info!(frames, "View loop finished");

    // final pass over the settled store, before the engine shuts down
    let mut levels: BTreeMap<TileLevel, usize> = BTreeMap::new();
    let mut ready = 0usize;
    let visible = engine.visible_tiles(args.width, args.height);
    for id in &visible {
        if let Some(state) = engine.resolve(*id) {
            *levels.entry(state.level).or_default() += 1;
            if state.ready() {
                ready += 1;
            }
        }
    }
    let (local_pending, remote_pending) = engine.pending_loads();
    let clean = engine.stop();

    println!();
    println!("Frames rendered:   {}", frames);
    println!("Redraw requests:   {}", redraws.requests.load(Ordering::Relaxed));
    println!("Visible tiles:     {} ({} ready)", visible.len(), ready);
    for (level, count) in &levels {
        println!("  {:<16} {}", level.to_string(), count);
    }
    println!("Pending loads:     {} local, {} remote", local_pending, remote_pending);
    println!();
    println!("{}", engine.telemetry());

    let stats = engine.scheduler_stats();
    match (stats.ticks_per_second(), stats.speed) {
        (Some(rate), Some(speed)) => println!(
            "Scheduler:         {} ticks, {:.1}/s, {:.3} ms per redraw",
            stats.ticks,
            rate,
            speed.as_secs_f64() * 1000.0
        ),
        _ => println!("Scheduler:         {} ticks", stats.ticks),
    }
    if !clean {
        eprintln!("Warning: some engine threads did not exit within the shutdown timeout");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_duration_accepts_fractional_seconds() {
        assert_eq!(view_duration(2.5).unwrap(), Duration::from_millis(2500));
        assert_eq!(view_duration(0.0).unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_view_duration_rejects_bad_values() {
        for seconds in [-1.0, f64::NAN, f64::INFINITY, 1e20] {
            assert!(
                matches!(view_duration(seconds), Err(CliError::Config(_))),
                "{} should be rejected",
                seconds
            );
        }
    }

    #[test]
    fn test_deadline_overflow_is_an_error() {
        let now = Instant::now();
        assert!(deadline_after(now, Duration::from_secs(5)).is_ok());
        assert!(matches!(deadline_after(now, Duration::MAX), Err(CliError::Config(_))));
    }
}
