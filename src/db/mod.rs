//! Database module for PostgreSQL connection and operations
//!
//! Provides the pool plus the catalog and execution access the pipeline needs.

pub mod connection;
pub mod postgres;

pub use connection::init_pool;
pub use postgres::PgDatabase;
