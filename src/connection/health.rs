//! Connection-class error detection.
//!
//! Only errors that indicate the session itself is gone demote a connection;
//! syntax errors, constraint violations and permission errors leave it healthy.

use crate::error::SqlGateError;

/// Lower-case substrings that identify a lost or unreachable database session.
pub const CONNECTION_ERROR_SIGNATURES: &[&str] = &[
    // Oracle listener / TNS / session loss
    "ora-12541",
    "ora-12514",
    "ora-12154",
    "ora-12170",
    "ora-03113",
    "ora-03114",
    "ora-01012",
    "ora-12560",
    "tns:",
    // generic transport
    "no listener",
    "connection closed",
    "connection reset",
    "connection refused",
    "broken pipe",
    "i/o timeout",
    "bad connection",
    "server closed the connection",
    "terminating connection",
    "lost connection",
    "server has gone away",
    "pool timed out",
    "pool closed",
];

/// Reports whether an error message carries a connection-class signature.
pub fn is_connection_error_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    CONNECTION_ERROR_SIGNATURES
        .iter()
        .any(|signature| lower.contains(signature))
}

/// Reports whether an execution error should demote its connection.
pub fn is_connection_error(error: &SqlGateError) -> bool {
    match error {
        SqlGateError::Connection(_) => true,
        other => is_connection_error_message(&other.to_string()),
    }
}
