//! Error definitions for the mapping module

use thiserror::Error;

/// Errors raised while turning reports into key presses
#[derive(Debug, Error)]
pub enum MappingError {
    /// Report too short for the bytes the edge detector inspects
    #[error("Malformed report: expected at least {expected} bytes, got {actual}")]
    MalformedReport { expected: usize, actual: usize },

    /// Key symbol without a known key code
    #[error("Unknown key symbol: {0:?}")]
    UnknownKey(String),

    /// The OS rejected a synthetic key event
    #[error("Key injection failed: {0}")]
    Injection(String),

    /// The injection backend could not be set up
    #[error("Initialization error: {0}")]
    InitializationError(String),
}
