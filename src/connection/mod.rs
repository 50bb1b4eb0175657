//! Connection management for sqlgate.
//!
//! Routes requests to named connections and tracks their health.

pub mod health;
pub mod router;

pub use health::is_connection_error;
pub use router::{ConnectionRouter, ConnectionStatus};
