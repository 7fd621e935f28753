//! Helpers shared across CLI commands.

use std::path::Path;

use tilepyramid::{ConfigFile, MapDescriptor, MapId, MapRegistry, Projection, TileContentType};

use crate::error::CliError;

/// Map used when the configuration file defines none.
pub const FALLBACK_MAP_ID: MapId = 1;

/// Loads `path`, or the default config file (falling back to defaults).
pub fn load_config(path: Option<&Path>) -> Result<ConfigFile, CliError> {
    let mut config = match path {
        Some(path) => ConfigFile::load_from(path)?,
        None => ConfigFile::load()?,
    };
    if config.maps.is_empty() {
        config.maps = fallback_catalog()?;
    }
    Ok(config)
}

fn fallback_catalog() -> Result<MapRegistry, CliError> {
    let osm = MapDescriptor::new(
        FALLBACK_MAP_ID,
        "osm",
        "OpenStreetMap",
        TileContentType::Png,
        Projection::Spherical,
    );
    MapRegistry::new([osm]).map_err(|e| CliError::Config(e.to_string()))
}

/// The map picked on the command line, else the configured initial map,
/// else the first map of the catalog.
pub fn resolve_map(config: &ConfigFile, requested: Option<MapId>) -> Result<&MapDescriptor, CliError> {
    let id = requested
        .or(config.engine.initial_map)
        .or_else(|| config.maps.first_id())
        .unwrap_or(FALLBACK_MAP_ID);
    config.maps.get(id).ok_or(CliError::UnknownMap(id))
}

/// Formats a latitude/longitude pair for display.
pub fn format_point(lat: f64, lon: f64) -> String {
    let ns = if lat < 0.0 { 'S' } else { 'N' };
    let ew = if lon < 0.0 { 'W' } else { 'E' };
    format!("{:.6}°{} {:.6}°{}", lat.abs(), ns, lon.abs(), ew)
}
