//! Core database infrastructure
//!
//! This module provides the foundational database components the store backends use:
//! - `DatabaseConn`: Core SQLite connection wrapper with configuration
//! - `TableSchema`: Compiled model table definition
//! - `SchemaManager`: Bookkeeping tables and per-model schema sync
//! - `SchemaStatus`: Model table state enumeration

mod connection;
mod schema;

pub use connection::DatabaseConn;
pub use schema::{
    is_sql_identifier, MigrationRecord, SchemaAction, SchemaDefinitions, SchemaManager,
    SchemaStatus, TableSchema, SCHEMA_VERSION,
};
