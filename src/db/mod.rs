//! Database access layer.
//!
//! This module provides:
//! - Dialect translation of canonical queries and results
//! - The driver boundary and its sqlx implementation
//! - Connection lifecycle management with keep-alive and single-flight reconnect
//! - The query façade used by application code
//! - Type mappings and dispatch macros

pub mod dialect;
pub mod driver;
pub mod facade;
pub mod keepalive;
#[macro_use]
pub mod macros;
pub mod manager;
pub mod params;
pub mod pool;
pub mod types;

pub use dialect::{CanonicalQuery, Statement, StatementKind};
pub use driver::{Driver, DriverHandle, RawMutation, RawResult};
pub use facade::Database;
pub use keepalive::{KeepAliveOutcome, KeepAliveTask};
pub use manager::{ActivityClock, AdapterStatus, ConnectionManager};
pub use pool::{DbPool, SqlxDriver};
