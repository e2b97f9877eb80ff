//! Database module
//!
//! SQLite plumbing shared by every store backend:
//!
//! ```text
//! database/
//! └── core/           # Foundation
//!     ├── connection  # SQLite DatabaseConn wrapper
//!     └── schema      # Table schemas, bookkeeping tables, schema sync
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use storespool::database::{DatabaseConn, SchemaManager, TableSchema};
//! use storespool::config::{ColumnDefinition, ColumnType, MigrationStrategy};
//!
//! let db = DatabaseConn::open_in_memory()?;
//! let schema = SchemaManager::new(&db.conn);
//! schema.initialize()?;
//!
//! let table = TableSchema::new(
//!     "users",
//!     vec![ColumnDefinition::new("id", ColumnType::Integer).primary_key()],
//! )?;
//! schema.sync("user", &table, MigrationStrategy::Alter)?;
//! ```

pub mod core;

pub use core::{
    is_sql_identifier, DatabaseConn, MigrationRecord, SchemaAction, SchemaDefinitions,
    SchemaManager, SchemaStatus, TableSchema, SCHEMA_VERSION,
};

/// Expand a leading `~/` to the home directory
pub fn expand_home(path: &str) -> String {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => format!("{}/{}", home.to_string_lossy(), rest),
        _ => path.to_string(),
    }
}

/// Ensure the directory holding a database file exists
pub fn ensure_parent_dir(path: &str) -> anyhow::Result<()> {
    match std::path::Path::new(path).parent() {
        Some(dir) if !dir.as_os_str().is_empty() => std::fs::create_dir_all(dir).map_err(|e| {
            anyhow::anyhow!("Failed to create directory '{}': {}", dir.display(), e)
        }),
        _ => Ok(()),
    }
}
