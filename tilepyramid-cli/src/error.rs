//! CLI error type.

use std::fmt;

use tilepyramid::logging::LoggingError;
use tilepyramid::{ConfigError, EngineError};

/// Errors surfaced to the user by CLI commands.
#[derive(Debug)]
pub enum CliError {
    /// Configuration file or arguments are invalid.
    Config(String),
    /// The engine failed to start or switch state.
    Engine(EngineError),
    /// Logging could not be initialized.
    Logging(String),
    /// A requested map is not in the catalog.
    UnknownMap(u32),
    /// Ctrl+C handler could not be installed.
    Signal(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Engine(e) => write!(f, "Engine error: {}", e),
            CliError::Logging(msg) => write!(f, "Logging error: {}", msg),
            CliError::UnknownMap(id) => write!(f, "Map {} is not configured (see `tilepyramid maps`)", id),
            CliError::Signal(msg) => write!(f, "Failed to set signal handler: {}", msg),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Engine(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<EngineError> for CliError {
    fn from(e: EngineError) -> Self {
        CliError::Engine(e)
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        CliError::Logging(e.to_string())
    }
}
