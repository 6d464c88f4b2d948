//! Error types for the phishing domain mirror
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for mirror operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the phishing domain mirror
#[derive(Error, Debug)]
pub enum Error {
    /// The bulk snapshot endpoint answered with a non-success status
    #[error("{method} {url} returned {status}")]
    Fetch {
        /// The URL that was requested
        url: String,
        /// The HTTP method used
        method: String,
        /// The status code returned by the remote server
        status: u16,
    },

    /// HTTP client errors (connection refused, timeout, unreadable body)
    #[error("HTTP error: {0}")]
    Http(String),

    /// Streaming transport errors (connect, read, close)
    #[error("Transport error: {0}")]
    Transport(String),

    /// A delta frame could not be decoded
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network-related errors
    #[error("Network error: {0}")]
    Network(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The engine is already streaming
    #[error("Engine is already running")]
    AlreadyRunning,

    /// stop() was called while start() was still fetching the snapshot
    #[error("Engine was stopped before start completed")]
    Stopped,

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a snapshot fetch error for a non-success response
    pub fn fetch(url: impl Into<String>, method: impl Into<String>, status: u16) -> Self {
        Self::Fetch {
            url: url.into(),
            method: method.into(),
            status,
        }
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a malformed frame error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedFrame(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Status code carried by a [`Error::Fetch`], if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Fetch { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
