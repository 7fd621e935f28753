//! Map catalog types.
//!
//! The engine never parses a catalog itself; it consumes a finished
//! [`MapRegistry`] built by the caller (or by [`crate::config::ConfigFile`]).
//! Descriptors are immutable once registered.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::coord::MapId;
use crate::error::CatalogError;

/// Map projection model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Projection {
    /// Web Mercator on a sphere.
    #[default]
    Spherical,
    /// Mercator on the WGS84 ellipsoid.
    Ellipsoidal,
}

impl FromStr for Projection {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "spherical" | "sphere" | "web-mercator" => Ok(Projection::Spherical),
            "ellipsoidal" | "ellipsoid" | "wgs84" => Ok(Projection::Ellipsoidal),
            _ => Err(CatalogError::UnknownProjection(s.to_string())),
        }
    }
}

impl fmt::Display for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Projection::Spherical => write!(f, "spherical"),
            Projection::Ellipsoidal => write!(f, "ellipsoidal"),
        }
    }
}

/// Raster format served for a map's tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileContentType {
    Png,
    Jpeg,
}

impl TileContentType {
    /// File extension used when none is configured explicitly.
    pub fn default_extension(&self) -> &'static str {
        match self {
            TileContentType::Png => "png",
            TileContentType::Jpeg => "jpg",
        }
    }
}

impl FromStr for TileContentType {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "png" | "image/png" => Ok(TileContentType::Png),
            "jpg" | "jpeg" | "image/jpeg" => Ok(TileContentType::Jpeg),
            _ => Err(CatalogError::UnknownContentType(s.to_string())),
        }
    }
}

/// Everything the engine needs to know about one map.
#[derive(Debug, Clone, PartialEq)]
pub struct MapDescriptor {
    pub id: MapId,
    /// Identifier used in storage paths and tile server requests.
    pub stable_id: String,
    pub name: String,
    /// Overlay layer drawn on top of a base map.
    pub is_layer: bool,
    pub content_type: TileContentType,
    pub file_extension: String,
    pub projection: Projection,
}

impl MapDescriptor {
    /// Creates a descriptor using the content type's default file extension.
    pub fn new(
        id: MapId,
        stable_id: impl Into<String>,
        name: impl Into<String>,
        content_type: TileContentType,
        projection: Projection,
    ) -> Self {
        Self {
            id,
            stable_id: stable_id.into(),
            name: name.into(),
            is_layer: false,
            content_type,
            file_extension: content_type.default_extension().to_string(),
            projection,
        }
    }

    pub fn with_layer(mut self, is_layer: bool) -> Self {
        self.is_layer = is_layer;
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.file_extension = extension.into();
        self
    }
}

/// Validated, instance-owned mapping from map id to descriptor.
#[derive(Debug, Clone, Default)]
pub struct MapRegistry {
    maps: BTreeMap<MapId, MapDescriptor>,
}

impl MapRegistry {
    /// Builds a registry, rejecting duplicate ids and names that are unsafe
    /// in cache paths and tile URLs.
    ///
    /// Stable ids are limited to ASCII letters, digits, `-`, `_` and `.`
    /// (not leading `.`); extensions to ASCII letters and digits.
    pub fn new(descriptors: impl IntoIterator<Item = MapDescriptor>) -> Result<Self, CatalogError> {
        let mut maps = BTreeMap::new();
        for descriptor in descriptors {
            validate_names(&descriptor)?;
            let id = descriptor.id;
            if maps.insert(id, descriptor).is_some() {
                return Err(CatalogError::DuplicateMap(id));
            }
        }
        Ok(Self { maps })
    }

    pub fn get(&self, id: MapId) -> Option<&MapDescriptor> {
        self.maps.get(&id)
    }

    pub fn contains(&self, id: MapId) -> bool {
        self.maps.contains_key(&id)
    }

    /// Lowest map id, used when the configured initial map is absent.
    pub fn first_id(&self) -> Option<MapId> {
        self.maps.keys().next().copied()
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    /// Descriptors ordered by map id.
    pub fn iter(&self) -> impl Iterator<Item = &MapDescriptor> {
        self.maps.values()
    }
}

fn validate_names(descriptor: &MapDescriptor) -> Result<(), CatalogError> {
    let stable_id = &descriptor.stable_id;
    if stable_id.trim().is_empty() {
        return Err(CatalogError::EmptyStableId(descriptor.id));
    }
    let safe_stable_id = !stable_id.starts_with('.')
        && stable_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'));
    if !safe_stable_id {
        return Err(CatalogError::InvalidStableId {
            id: descriptor.id,
            stable_id: stable_id.clone(),
        });
    }

    let extension = &descriptor.file_extension;
    if extension.is_empty() || !extension.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(CatalogError::InvalidExtension {
            id: descriptor.id,
            extension: extension.clone(),
        });
    }
    Ok(())
}
