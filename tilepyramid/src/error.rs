//! Engine error types.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::coord::MapId;
use crate::loader::FetchError;

/// Problems with the map catalog handed to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// Projection name is neither spherical nor ellipsoidal.
    #[error("unknown projection '{0}'")]
    UnknownProjection(String),

    /// Tile content type is not a supported raster format.
    #[error("unknown tile content type '{0}'")]
    UnknownContentType(String),

    /// Two descriptors share one map id.
    #[error("duplicate map id {0}")]
    DuplicateMap(MapId),

    /// A descriptor has no stable id, so its tiles cannot be addressed.
    #[error("map {0} has an empty stable id")]
    EmptyStableId(MapId),

    /// A stable id that cannot be used as one path segment and query value.
    #[error("map {id} has stable id '{stable_id}'; use letters, digits, '-', '_' or '.'")]
    InvalidStableId { id: MapId, stable_id: String },

    /// A file extension that is not plain letters and digits.
    #[error("map {id} has file extension '{extension}'; use letters and digits only")]
    InvalidExtension { id: MapId, extension: String },

    /// The catalog contains no maps at all.
    #[error("map catalog is empty")]
    Empty,
}

/// Errors that prevent the engine from starting or switching state.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Map catalog is invalid.
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Configuration is invalid.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A map id that is not in the catalog was requested.
    #[error("unknown map id {0}")]
    UnknownMap(MapId),

    /// The HTTP client could not be created.
    #[error("HTTP client error: {0}")]
    Http(#[from] FetchError),

    /// The cache root could not be created.
    #[error("failed to create cache directory {path}: {source}")]
    CacheDirectory { path: PathBuf, source: io::Error },

    /// A worker thread could not be spawned.
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        source: io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_error_display() {
        let err = CatalogError::UnknownProjection("conic".to_string());
        assert_eq!(err.to_string(), "unknown projection 'conic'");
    }

    #[test]
    fn test_engine_error_from_catalog() {
        let err: EngineError = CatalogError::DuplicateMap(4).into();
        assert!(matches!(err, EngineError::Catalog(_)));
        assert!(err.to_string().contains("duplicate map id 4"));
    }
}
