// src/errors.rs

//! Error types for the simulated network.

use std::fmt;

/// Main error type for network assembly and delivery
#[derive(Debug)]
pub enum NetworkError {
    /// A peer id outside the network was referenced
    UnknownPeer(String),

    /// Network construction was given inconsistent parameters
    InvalidConfiguration(String),

    /// A shared lock was poisoned by a panicking thread
    LockPoisoned(String),
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkError::UnknownPeer(msg) => write!(f, "Unknown peer: {}", msg),
            NetworkError::InvalidConfiguration(msg) => {
                write!(f, "Invalid configuration: {}", msg)
            }
            NetworkError::LockPoisoned(msg) => write!(f, "Lock poisoned: {}", msg),
        }
    }
}

impl std::error::Error for NetworkError {}

impl From<multiverse_core::TangleError> for NetworkError {
    fn from(err: multiverse_core::TangleError) -> Self {
        NetworkError::InvalidConfiguration(format!("{}", err))
    }
}

/// Result type alias for network operations
pub type Result<T> = std::result::Result<T, NetworkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = NetworkError::UnknownPeer("peer 42".to_string());
        assert_eq!(format!("{}", err), "Unknown peer: peer 42");
    }
}
