//! sqlgate - A human-in-the-loop safety gateway for agent-issued SQL.
//!
//! This library exposes the core modules for use in integration tests.

pub mod audit;
pub mod cli;
pub mod config;
pub mod confirm;
pub mod connection;
pub mod db;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod query;
pub mod safety;
pub mod server;
