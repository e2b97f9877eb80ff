//! Database connection management
//!
//! This module provides the SQLite connection wrapper every store backend is built on.

use anyhow::{anyhow, Result};
use rusqlite::Connection;
use std::time::Duration;

/// Core database connection wrapper
///
/// `DatabaseConn` provides a thin wrapper around SQLite connections,
/// handling both file-based and in-memory databases with consistent
/// configuration and error handling.
pub struct DatabaseConn {
    pub conn: Connection,
}

impl DatabaseConn {
    /// Open a database at the specified path
    ///
    /// If the path is `None`, an in-memory database is created.
    pub fn open(path: Option<&str>) -> Result<Self> {
        let conn = match path {
            Some(p) => Connection::open(p)
                .map_err(|e| anyhow!("Failed to open database at '{}': {}", p, e))?,
            None => Connection::open_in_memory()
                .map_err(|e| anyhow!("Failed to create in-memory database: {}", e))?,
        };

        let db = DatabaseConn { conn };
        db.configure()?;
        Ok(db)
    }

    /// Open a database at the specified path (convenience method)
    pub fn open_path(path: &str) -> Result<Self> {
        Self::open(Some(path))
    }

    /// Create an in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Self::open(None)
    }

    fn configure(&self) -> Result<()> {
        // WAL for concurrent readers; in-memory databases report "memory" instead
        let _: String = self
            .conn
            .query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))
            .map_err(|e| anyhow!("Failed to set journal mode: {}", e))?;

        self.conn
            .execute("PRAGMA synchronous=NORMAL", [])
            .map_err(|e| anyhow!("Failed to set synchronous mode: {}", e))?;

        self.conn
            .execute("PRAGMA temp_store=MEMORY", [])
            .map_err(|e| anyhow!("Failed to set temp store: {}", e))?;

        self.conn
            .execute("PRAGMA foreign_keys=ON", [])
            .map_err(|e| anyhow!("Failed to enable foreign keys: {}", e))?;

        Ok(())
    }

    /// Wait up to `timeout` for locks held by other connections
    pub fn set_busy_timeout(&self, timeout: Duration) -> Result<()> {
        self.conn
            .busy_timeout(timeout)
            .map_err(|e| anyhow!("Failed to set busy timeout: {}", e))
    }

    /// Execute a SQL statement
    pub fn execute(&self, sql: &str) -> Result<usize> {
        self.conn
            .execute(sql, [])
            .map_err(|e| anyhow!("Failed to execute SQL: {}", e))
    }

    /// Execute a SQL statement with parameters
    pub fn execute_with_params<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<usize> {
        self.conn
            .execute(sql, params)
            .map_err(|e| anyhow!("Failed to execute SQL with params: {}", e))
    }

    /// Begin an unchecked transaction
    ///
    /// Used to apply a whole store migration atomically.
    pub fn transaction(&self) -> Result<rusqlite::Transaction<'_>> {
        self.conn
            .unchecked_transaction()
            .map_err(|e| anyhow!("Failed to begin transaction: {}", e))
    }

    /// Compile a statement without running it
    pub fn check_sql(&self, sql: &str) -> Result<()> {
        self.conn
            .prepare(sql)
            .map(|_| ())
            .map_err(|e| anyhow!("Failed to compile SQL: {}", e))
    }

    /// Check if a table exists in the database
    pub fn table_exists(&self, table_name: &str) -> Result<bool> {
        let count: i32 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                [table_name],
                |row| row.get(0),
            )
            .map_err(|e| anyhow!("Failed to check table existence: {}", e))?;
        Ok(count > 0)
    }

    /// Get the row count for a table
    pub fn table_count(&self, table_name: &str) -> Result<u64> {
        let query = format!("SELECT COUNT(*) FROM \"{}\"", table_name);
        let count: u64 = self
            .conn
            .query_row(&query, [], |row| row.get(0))
            .map_err(|e| anyhow!("Failed to get table count: {}", e))?;
        Ok(count)
    }

    /// Column names of a table, in declaration order
    pub fn table_columns(&self, table_name: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM pragma_table_info(?1)")
            .map_err(|e| anyhow!("Failed to read table info: {}", e))?;
        let columns = stmt
            .query_map([table_name], |row| row.get::<_, String>(0))
            .map_err(|e| anyhow!("Failed to read table info: {}", e))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| anyhow!("Failed to read table info: {}", e))?;
        Ok(columns)
    }

    /// Close the connection, reporting errors instead of swallowing them on drop
    pub fn close(self) -> Result<()> {
        self.conn
            .close()
            .map_err(|(_, e)| anyhow!("Failed to close database: {}", e))
    }
}
