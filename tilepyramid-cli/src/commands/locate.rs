//! `locate` command: where a point lands in tile space.

use clap::Args;
use tilepyramid::loader::{storage_path, tile_url};
use tilepyramid::projection::{clamp_latitude, geo_to_world, tile_to_pixel, world_to_tile};
use tilepyramid::{ConfigFile, GeoPoint, MapId};

use super::common::{format_point, resolve_map};
use crate::error::CliError;

#[derive(Debug, Args)]
#[command(allow_negative_numbers = true)]
pub struct LocateArgs {
    /// Latitude in degrees
    #[arg(long)]
    pub lat: f64,
    /// Longitude in degrees
    #[arg(long)]
    pub lon: f64,
    /// Zoom level (1-30)
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=30))]
    pub zoom: u8,
    /// Map id (defaults to the configured initial map)
    #[arg(long)]
    pub map: Option<MapId>,
}

pub fn run(args: LocateArgs, config: &ConfigFile) -> Result<(), CliError> {
    let map = resolve_map(config, args.map)?;
    let lat = clamp_latitude(args.lat, map.projection);
    if lat != args.lat {
        println!("Latitude clamped to {:.6} for the {} projection", lat, map.projection);
    }
    let point = GeoPoint::new(lat, args.lon);

    let world = geo_to_world(point, map.projection);
    let tile_point = world_to_tile(world, args.zoom as f64);
    let id = tile_point.tile_id(map.id, args.zoom);
    let (px, py) = tile_to_pixel(tile_point, config.engine.tile_size);
    let tile_size = config.engine.tile_size as f64;

    println!("Map:          {} ({}, {})", map.name, map.stable_id, map.projection);
    println!("Point:        {}", format_point(point.lat, point.lon));
    println!("World:        ({:.9}, {:.9})", world.x, world.y);
    println!("Tile units:   ({:.4}, {:.4}) at z{}", tile_point.x, tile_point.y, args.zoom);
    println!("Tile:         {}", id);
    println!(
        "Pixel:        ({:.0}, {:.0}) within the tile",
        px - id.x as f64 * tile_size,
        py - id.y as f64 * tile_size
    );
    println!(
        "Storage path: {}",
        storage_path(&config.engine.cache_dir, map, &id).display()
    );
    println!("Tile URL:     {}", tile_url(&config.engine.server_url(), map, &id));
    Ok(())
}
