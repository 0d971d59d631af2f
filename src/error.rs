//! Error type shared by the connection layer, the dispatcher and the store.

use thiserror::Error;

/// Every failure the engine reports, tagged by where it came from.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PagerError {
    /// The database could not be reached, or a connection failed its validity check.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The server rejected or aborted a statement. Statement timeouts land here.
    #[error("Query error: {0}")]
    Query(String),

    /// Bad connection string, unreadable config file, or an engine setting out of range.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Dispatcher not started, event listener already gone, or a table used out of order.
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// Failures outside the database: unwritable output, a request that never finished.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PagerError {
    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a query error with the given message.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an illegal state error with the given message.
    pub fn illegal_state(msg: impl Into<String>) -> Self {
        Self::IllegalState(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Short heading for the CLI's error output.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection(_) => "Connection Error",
            Self::Query(_) => "Query Error",
            Self::Config(_) => "Configuration Error",
            Self::IllegalState(_) => "Illegal State",
            Self::Internal(_) => "Internal Error",
        }
    }
}

/// Shorthand used across the crate.
pub type Result<T> = std::result::Result<T, PagerError>;
