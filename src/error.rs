//! Error types for the ingress guard.

use thiserror::Error;

/// Main error type for ingress guard operations.
///
/// The rate limiter itself never fails; these errors come from loading
/// configuration and from running the HTTP surface.
#[derive(Error, Debug)]
pub enum GuardError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors raised while layering configuration sources
    #[error("Configuration source error: {0}")]
    ConfigSource(#[from] ::config::ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for ingress guard operations.
pub type Result<T> = std::result::Result<T, GuardError>;
