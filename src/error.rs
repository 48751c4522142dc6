//! Error types for channel-archiver
//!
//! The taxonomy follows how failures are recovered:
//! - transient network failures ([`Error::Network`], [`Error::Timeout`], and
//!   [`Error::Client`] messages tagged as network/connection/timeout) are retried
//! - resolution failures ([`Error::NotFound`]) skip a single batch entry
//! - exhausted retries ([`Error::RetriesExhausted`]) abandon one channel
//! - authentication failures ([`Error::Auth`]) terminate the process

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for channel-archiver operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for channel-archiver
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "download.max_parallel")
        key: Option<String>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// I/O error tied to a specific file
    #[error("I/O error on {path}: {source}")]
    File {
        /// The file that was being read or written
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Network error reported by the protocol client
    #[error("network error: {0}")]
    Network(String),

    /// Operation exceeded its deadline
    #[error("operation timed out")]
    Timeout,

    /// Opaque protocol client failure, classified by its message
    #[error("client error: {0}")]
    Client(String),

    /// Channel identifier could not be resolved
    #[error("channel not found: {0}")]
    NotFound(String),

    /// Authenticated session could not be established
    #[error("authentication failed: {0}")]
    Auth(String),

    /// All retry attempts were used without success
    #[error("{scope}: giving up after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// What was being retried (e.g., "channel 12345")
        scope: String,
        /// Number of attempts made, including the first
        attempts: u32,
        /// The error returned by the final attempt
        last_error: Box<Error>,
    },

    /// Shutdown was requested before the work finished
    #[error("archiving cancelled")]
    Cancelled,

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build a [`Error::Config`] for the given key
    pub fn config(message: impl Into<String>, key: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Wrap an I/O error with the path it occurred on
    pub fn file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::File {
            path: path.into(),
            source,
        }
    }

    /// Returns true for errors that must reach the process boundary
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Auth(_))
    }
}

/// Markers that tag a collaborator message as a transient network failure.
const TRANSIENT_MARKERS: [&str; 3] = ["TIMEOUT", "NETWORK", "CONNECTION"];

/// Check whether an error message carries one of the transient markers
pub(crate) fn is_transient_message(message: &str) -> bool {
    let upper = message.to_ascii_uppercase();
    TRANSIENT_MARKERS.iter().any(|m| upper.contains(m))
}
