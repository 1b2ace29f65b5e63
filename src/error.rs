//! Error types for the floodwall rate limiter.

use thiserror::Error;

/// Main error type for floodwall operations.
#[derive(Error, Debug)]
pub enum FloodwallError {
    /// Invalid or incomplete configuration, detected at load time.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A call-site error, such as a tracked resource field missing from the
    /// request data. Evaluation aborts before any write.
    #[error("Usage error: {0}")]
    Usage(String),

    /// A read or write against the log store failed. Never mapped to an
    /// allow or block decision.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Response serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for floodwall operations.
pub type Result<T> = std::result::Result<T, FloodwallError>;
