//! Error types for sqlgate.
//!
//! Defines the main error enum used throughout the gateway.

use thiserror::Error;

/// Main error type for sqlgate operations.
#[derive(Error, Debug)]
pub enum SqlGateError {
    /// Database connection errors (host unreachable, listener down, connection dropped, etc.)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Statement execution errors (syntax errors, constraint violations, etc.)
    #[error("Query error: {0}")]
    Query(String),

    /// Configuration errors (invalid config file, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The confirmation collaborator failed (dialog crashed, no terminal, etc.)
    #[error("Confirmation error: {0}")]
    Confirmation(String),

    /// Audit file could not be opened or written.
    #[error("Audit error: {0}")]
    Audit(String),

    /// Malformed protocol input.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The requested connection name is not configured.
    #[error("unknown connection \"{name}\"; use list_connections to see configured names")]
    UnknownConnection { name: String },

    /// No connection name given while several connections are configured.
    #[error(
        "connection name is required when multiple databases are configured; use list_connections to see names"
    )]
    ConnectionRequired,

    /// The connection is configured but currently in the failed state.
    #[error(
        "connection \"{name}\" is currently unavailable (connection failed); call list_connections to retry"
    )]
    ConnectionUnavailable { name: String },

    /// Internal errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SqlGateError {
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

    /// Creates a confirmation error with the given message.
    pub fn confirmation(msg: impl Into<String>) -> Self {
        Self::Confirmation(msg.into())
    }

    /// Creates an audit error with the given message.
    pub fn audit(msg: impl Into<String>) -> Self {
        Self::Audit(msg.into())
    }

    /// Creates a protocol error with the given message.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection(_) => "Connection Error",
            Self::Query(_) => "Query Error",
            Self::Config(_) => "Configuration Error",
            Self::Confirmation(_) => "Confirmation Error",
            Self::Audit(_) => "Audit Error",
            Self::Protocol(_) => "Protocol Error",
            Self::UnknownConnection { .. } | Self::ConnectionRequired => "Connection Selection Error",
            Self::ConnectionUnavailable { .. } => "Connection Unavailable",
            Self::Internal(_) => "Internal Error",
        }
    }
}

impl From<std::io::Error> for SqlGateError {
    fn from(err: std::io::Error) -> Self {
        Self::Audit(err.to_string())
    }
}

/// Result type alias using SqlGateError.
pub type Result<T> = std::result::Result<T, SqlGateError>;
