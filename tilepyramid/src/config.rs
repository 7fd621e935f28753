//! Engine configuration.
//!
//! [`EngineConfig`] carries every setting the engine consumes and can be
//! built in code. [`ConfigFile`] loads the same settings, the map catalog and
//! logging options from an INI file:
//!
//! ```ini
//! [server]
//! host = tiles.example.com
//! port = 8080
//! cache_only = false
//! timeout = 30
//!
//! [cache]
//! directory = ~/.cache/tilepyramid
//! capacity = 1024
//!
//! [view]
//! map = 1
//! zoom = 3
//! lat = 0
//! lon = 0
//!
//! [animation]
//! period_ms = 40
//! samples = 10
//!
//! [logging]
//! level = info
//! file = /tmp/tilepyramid.log
//!
//! [map.1]
//! stable_id = osm
//! name = OpenStreetMap
//! content_type = png
//! projection = spherical
//! ```

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::{Ini, Properties};
use thiserror::Error;

use crate::coord::{MapId, MAX_ZOOM, MIN_ZOOM};
use crate::error::CatalogError;
use crate::map::{MapDescriptor, MapRegistry, Projection, TileContentType};

/// Default tile server host.
pub const DEFAULT_HOST: &str = "localhost";
/// Default tile server port.
pub const DEFAULT_PORT: u16 = 8080;
/// Default number of tiles kept in memory.
pub const DEFAULT_CACHE_CAPACITY: usize = 1024;
/// Default animation tick period.
pub const DEFAULT_ANIMATION_PERIOD: Duration = Duration::from_millis(40);
/// Default rolling-average window.
pub const DEFAULT_ROLLING_SAMPLES: usize = 10;
/// Default HTTP request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Default tile edge length in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 256;
/// Default bound on waiting for worker threads at shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);
/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

const MAP_SECTION_PREFIX: &str = "map.";

/// Errors from loading or validating configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// The file could not be read or is not valid INI.
    #[error("failed to read config file {path}: {message}")]
    Read { path: PathBuf, message: String },

    /// The INI text could not be parsed.
    #[error("failed to parse config: {0}")]
    Parse(String),

    /// A value has the wrong type or is out of range.
    #[error("invalid value '{value}' for [{section}] {key}: {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    /// A required key is absent.
    #[error("missing key '{key}' in [{section}]")]
    MissingKey { section: String, key: String },

    /// The map catalog is invalid.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl ConfigError {
    fn invalid(section: &str, key: &str, value: impl Into<String>, reason: impl Display) -> Self {
        ConfigError::InvalidValue {
            section: section.to_string(),
            key: key.to_string(),
            value: value.into(),
            reason: reason.to_string(),
        }
    }
}

/// Settings consumed by [`crate::engine::TileEngine`].
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub server_host: String,
    pub server_port: u16,
    /// Never contact the tile server; local misses are final.
    pub cache_only: bool,
    /// Root of the on-disk tile cache.
    pub cache_dir: PathBuf,
    /// Tiles kept in memory.
    pub cache_capacity: usize,
    /// Map shown first; the lowest catalog id when unset.
    pub initial_map: Option<MapId>,
    pub initial_zoom: f64,
    pub initial_lat: f64,
    pub initial_lon: f64,
    /// Animation tick period; zero disables the scheduler.
    pub animation_period: Duration,
    pub rolling_samples: usize,
    pub request_timeout: Duration,
    pub tile_size: u32,
    pub shutdown_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            server_host: DEFAULT_HOST.to_string(),
            server_port: DEFAULT_PORT,
            cache_only: false,
            cache_dir: default_cache_dir(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            initial_map: None,
            initial_zoom: 3.0,
            initial_lat: 0.0,
            initial_lon: 0.0,
            animation_period: DEFAULT_ANIMATION_PERIOD,
            rolling_samples: DEFAULT_ROLLING_SAMPLES,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            tile_size: DEFAULT_TILE_SIZE,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl EngineConfig {
    pub fn with_server(mut self, host: impl Into<String>, port: u16) -> Self {
        self.server_host = host.into();
        self.server_port = port;
        self
    }

    pub fn with_cache_only(mut self, cache_only: bool) -> Self {
        self.cache_only = cache_only;
        self
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn with_initial_view(mut self, map: Option<MapId>, zoom: f64, lat: f64, lon: f64) -> Self {
        self.initial_map = map;
        self.initial_zoom = zoom;
        self.initial_lat = lat;
        self.initial_lon = lon;
        self
    }

    pub fn with_animation(mut self, period: Duration, samples: usize) -> Self {
        self.animation_period = period;
        self.rolling_samples = samples;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = tile_size;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Tile server root, e.g. `http://localhost:8080`.
    pub fn server_url(&self) -> String {
        format!("http://{}:{}", self.server_host, self.server_port)
    }

    /// Rejects values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server_host.trim().is_empty() {
            return Err(ConfigError::invalid("server", "host", "", "must not be empty"));
        }
        if self.cache_capacity == 0 {
            return Err(ConfigError::invalid("cache", "capacity", "0", "must be at least 1"));
        }
        if self.rolling_samples == 0 {
            return Err(ConfigError::invalid("animation", "samples", "0", "must be at least 1"));
        }
        if self.tile_size == 0 {
            return Err(ConfigError::invalid("view", "tile_size", "0", "must be at least 1"));
        }
        let zoom = self.initial_zoom;
        if !zoom.is_finite() || zoom < MIN_ZOOM as f64 || zoom > MAX_ZOOM as f64 {
            return Err(ConfigError::invalid(
                "view",
                "zoom",
                zoom.to_string(),
                format!("must be between {} and {}", MIN_ZOOM, MAX_ZOOM),
            ));
        }
        if !self.initial_lat.is_finite() || self.initial_lat.abs() >= 90.0 {
            return Err(ConfigError::invalid(
                "view",
                "lat",
                self.initial_lat.to_string(),
                "must be strictly between -90 and 90",
            ));
        }
        if !self.initial_lon.is_finite() || self.initial_lon.abs() > 180.0 {
            return Err(ConfigError::invalid(
                "view",
                "lon",
                self.initial_lon.to_string(),
                "must be between -180 and 180",
            ));
        }
        Ok(())
    }
}

/// Logging options from the `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            file: None,
        }
    }
}

/// Contents of a configuration file.
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    pub engine: EngineConfig,
    pub logging: LoggingConfig,
    pub maps: MapRegistry,
}

impl ConfigFile {
    /// Loads the file at [`config_file_path`], falling back to defaults when
    /// it does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_file_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_file(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_ini(&ini)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut engine = EngineConfig::default();
        let mut logging = LoggingConfig::default();
        let mut maps = Vec::new();

        for (name, props) in ini.iter() {
            let Some(name) = name else {
                continue;
            };
            match name {
                "server" => {
                    if let Some(host) = props.get("host") {
                        engine.server_host = host.trim().to_string();
                    }
                    set(props, name, "port", &mut engine.server_port)?;
                    if let Some(value) = props.get("cache_only") {
                        engine.cache_only = parse_bool(name, "cache_only", value)?;
                    }
                    if let Some(secs) = get::<u64>(props, name, "timeout")? {
                        engine.request_timeout = Duration::from_secs(secs);
                    }
                }
                "cache" => {
                    if let Some(dir) = props.get("directory") {
                        engine.cache_dir = expand_tilde(dir.trim());
                    }
                    set(props, name, "capacity", &mut engine.cache_capacity)?;
                }
                "view" => {
                    engine.initial_map = get::<MapId>(props, name, "map")?.or(engine.initial_map);
                    set(props, name, "zoom", &mut engine.initial_zoom)?;
                    set(props, name, "lat", &mut engine.initial_lat)?;
                    set(props, name, "lon", &mut engine.initial_lon)?;
                    set(props, name, "tile_size", &mut engine.tile_size)?;
                }
                "animation" => {
                    if let Some(ms) = get::<u64>(props, name, "period_ms")? {
                        engine.animation_period = Duration::from_millis(ms);
                    }
                    set(props, name, "samples", &mut engine.rolling_samples)?;
                }
                "logging" => {
                    if let Some(level) = props.get("level") {
                        logging.level = level.trim().to_string();
                    }
                    if let Some(file) = props.get("file").map(str::trim).filter(|f| !f.is_empty()) {
                        logging.file = Some(expand_tilde(file));
                    }
                }
                _ => {
                    if let Some(id) = name.strip_prefix(MAP_SECTION_PREFIX) {
                        maps.push(parse_map(name, id, props)?);
                    } else {
                        tracing::warn!(section = name, "Ignoring unknown config section");
                    }
                }
            }
        }

        engine.validate()?;
        Ok(Self {
            engine,
            logging,
            maps: MapRegistry::new(maps)?,
        })
    }
}

fn parse_map(section: &str, id: &str, props: &Properties) -> Result<MapDescriptor, ConfigError> {
    let id: MapId = id
        .trim()
        .parse()
        .map_err(|e| ConfigError::invalid(section, "id", id, e))?;
    let stable_id = props
        .get("stable_id")
        .map(str::trim)
        .ok_or_else(|| ConfigError::MissingKey {
            section: section.to_string(),
            key: "stable_id".to_string(),
        })?;
    let name = props.get("name").map(str::trim).unwrap_or(stable_id);
    let content_type = match props.get("content_type") {
        Some(value) => TileContentType::from_str(value)?,
        None => TileContentType::Png,
    };
    let projection = match props.get("projection") {
        Some(value) => Projection::from_str(value)?,
        None => Projection::default(),
    };

    let mut descriptor = MapDescriptor::new(id, stable_id, name, content_type, projection);
    if let Some(value) = props.get("layer") {
        descriptor = descriptor.with_layer(parse_bool(section, "layer", value)?);
    }
    if let Some(extension) = props.get("extension") {
        descriptor = descriptor.with_extension(extension.trim().trim_start_matches('.'));
    }
    Ok(descriptor)
}

fn get<T>(props: &Properties, section: &str, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    props
        .get(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|e| ConfigError::invalid(section, key, value, e))
        })
        .transpose()
}

fn set<T>(props: &Properties, section: &str, key: &str, target: &mut T) -> Result<(), ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    if let Some(value) = get(props, section, key)? {
        *target = value;
    }
    Ok(())
}

fn parse_bool(section: &str, key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(ConfigError::invalid(section, key, value, "expected true or false")),
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}

/// Per-user tile cache root, `./tile-cache` when the platform has none.
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|dir| dir.join("tilepyramid"))
        .unwrap_or_else(|| PathBuf::from("tile-cache"))
}

/// Default configuration file location.
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("tilepyramid"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("config.ini")
}
