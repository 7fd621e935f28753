//! `maps` command: list the configured catalog.

use tilepyramid::{ConfigFile, TileContentType};

use crate::error::CliError;

pub fn run(config: &ConfigFile) -> Result<(), CliError> {
    println!(
        "{:>4}  {:<16} {:<24} {:<5} {:<5} {:<12} layer",
        "id", "stable id", "name", "type", "ext", "projection"
    );
    for map in config.maps.iter() {
        let content_type = match map.content_type {
            TileContentType::Png => "png",
            TileContentType::Jpeg => "jpeg",
        };
        println!(
            "{:>4}  {:<16} {:<24} {:<5} {:<5} {:<12} {}",
            map.id,
            map.stable_id,
            map.name,
            content_type,
            map.file_extension,
            map.projection.to_string(),
            if map.is_layer { "yes" } else { "no" }
        );
    }
    Ok(())
}
