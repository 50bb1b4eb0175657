//! Integration tests for sqlgate.

pub mod audit_test;
pub mod config_test;
pub mod gateway_test;
pub mod router_test;
pub mod server_test;
