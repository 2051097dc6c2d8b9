//! Error types for cache-link
//!
//! None of these escape `ConnectionManager::acquire`; they travel between
//! the backend and the manager and end up in the log.

/// Main error type for cache connection operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connect error: {0}")]
    Connect(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Connection closed")]
    Closed,
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<url::ParseError> for CacheError {
    fn from(err: url::ParseError) -> Self {
        Self::Config(format!("Invalid cache URI: {}", err))
    }
}

/// Result type alias for cache connection operations
pub type Result<T> = std::result::Result<T, CacheError>;
