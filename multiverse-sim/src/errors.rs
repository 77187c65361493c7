// src/errors.rs

//! Error types for the simulation harness.

use std::fmt;
use std::io;

/// Main error type for simulation setup and execution
#[derive(Debug)]
pub enum SimError {
    /// Configuration file could not be read or parsed
    ConfigError(String),

    /// I/O error
    IoError(io::Error),

    /// Network assembly failed
    NetworkError(multiverse_network::NetworkError),
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            SimError::IoError(err) => write!(f, "I/O error: {}", err),
            SimError::NetworkError(err) => write!(f, "Network error: {}", err),
        }
    }
}

impl std::error::Error for SimError {}

impl From<io::Error> for SimError {
    fn from(err: io::Error) -> Self {
        SimError::IoError(err)
    }
}

impl From<serde_json::Error> for SimError {
    fn from(err: serde_json::Error) -> Self {
        SimError::ConfigError(format!("JSON error: {}", err))
    }
}

impl From<multiverse_network::NetworkError> for SimError {
    fn from(err: multiverse_network::NetworkError) -> Self {
        SimError::NetworkError(err)
    }
}

/// Result type alias for simulation operations
pub type Result<T> = std::result::Result<T, SimError>;
