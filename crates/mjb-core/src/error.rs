//! Error types for the multijet balance engine

use thiserror::Error;

/// Multijet balance error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Missing or contradictory configuration. Fatal before any event is processed.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An external jet tool failed to initialize.
    #[error("Tool initialization error ({tool}): {detail}")]
    ToolInitialization {
        /// Tool name.
        tool: String,
        /// Failure description.
        detail: String,
    },

    /// A recoverable numeric failure reported by an external tool mid-event.
    #[error("Correction failure: {0}")]
    Correction(String),

    /// Malformed histogram or histogram store.
    #[error("Histogram error: {0}")]
    Histogram(String),
}

impl Error {
    /// Shorthand for [`Error::Configuration`].
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
