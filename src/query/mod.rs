//! Statement execution for sqlgate.
//!
//! Isolates running a prepared script against one database client from
//! the gateway's routing and confirmation logic.

pub mod executor;

pub use executor::{ScriptExecutor, DDL_WARNING};
