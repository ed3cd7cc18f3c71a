//! Error types for shelf-meta
//!
//! Ordinary lookup failures (network, HTTP status, malformed payloads) never
//! reach callers as errors: adapters convert them into notes. What does
//! propagate is operational trouble the caller must see, such as a cache
//! directory that cannot be read or written.

use thiserror::Error;

/// Engine-level error
#[derive(Debug, Error)]
pub enum MetaError {
    /// Cache read/write failed for a reason other than a missing entry
    #[error("Cache error ({path}): {source}")]
    Cache {
        path: String,
        #[source]
        source: shelf_common::Error,
    },

    /// Review queue file could not be read or written
    #[error("Review queue error ({path}): {source}")]
    ReviewQueue {
        path: String,
        #[source]
        source: shelf_common::Error,
    },

    /// Static data file (mappings, taxonomy) could not be loaded
    #[error("Data file error ({path}): {message}")]
    DataFile { path: String, message: String },

    /// Configuration problem detected at startup
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP client could not be constructed
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] FetchError),

    /// shelf-common error
    #[error("Common error: {0}")]
    Common(#[from] shelf_common::Error),
}

/// Result type for engine operations
pub type MetaResult<T> = Result<T, MetaError>;

/// Outbound HTTP failure for a single request
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Transport failure (DNS, connect, timeout)
    #[error("Network error: {0}")]
    Network(String),

    /// Non-success HTTP status
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Body could not be decoded as JSON
    #[error("Parse error: {0}")]
    Parse(String),

    /// Request aborted by the caller's cancellation token
    #[error("Request cancelled")]
    Cancelled,
}

impl FetchError {
    /// Whether retrying the same request may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Network(_) => true,
            FetchError::Http { status, .. } => *status == 429 || *status >= 500,
            FetchError::Parse(_) | FetchError::Cancelled => false,
        }
    }
}
