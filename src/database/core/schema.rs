//! Database schema management
//!
//! This module compiles model column lists into table schemas and keeps model
//! tables in sync with them. Every store carries two bookkeeping tables:
//! `spool_meta` (bookkeeping version and free-form metadata) and
//! `spool_migrations` (the column fingerprint last applied for each model).

use crate::config::{ColumnDefinition, MigrationStrategy};
use anyhow::{anyhow, Result};
use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, warn};

/// Current bookkeeping schema version
/// Increment this when making breaking changes to the bookkeeping tables
pub const SCHEMA_VERSION: u32 = 1;

/// Schema definitions for the bookkeeping tables
pub struct SchemaDefinitions;

impl SchemaDefinitions {
    /// SQL for creating the meta table (tracks bookkeeping version and global metadata)
    pub const META_TABLE: &'static str = r#"
        CREATE TABLE IF NOT EXISTS spool_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );
    "#;

    /// SQL for creating the per-model migration ledger
    pub const MIGRATIONS_TABLE: &'static str = r#"
        CREATE TABLE IF NOT EXISTS spool_migrations (
            model TEXT PRIMARY KEY,
            table_name TEXT NOT NULL,
            fingerprint TEXT NOT NULL,
            strategy TEXT NOT NULL,
            applied_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );
    "#;

    /// Table name prefixes models may not use
    pub const RESERVED_PREFIXES: &'static [&'static str] = &["sqlite_", "spool_"];
}

/// Whether `name` is a plain ASCII SQL identifier
pub fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A compiled table: validated name and columns plus their fingerprint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    name: String,
    columns: Vec<ColumnDefinition>,
    fingerprint: String,
}

impl TableSchema {
    /// Validate a table definition
    pub fn new(name: &str, columns: Vec<ColumnDefinition>) -> Result<Self> {
        if !is_sql_identifier(name) {
            return Err(anyhow!("'{}' is not a valid table name", name));
        }
        let lowered = name.to_lowercase();
        if let Some(prefix) = SchemaDefinitions::RESERVED_PREFIXES
            .iter()
            .find(|p| lowered.starts_with(*p))
        {
            return Err(anyhow!(
                "table '{}' uses the reserved prefix '{}'",
                name,
                prefix
            ));
        }
        if columns.is_empty() {
            return Err(anyhow!("table '{}' has no columns", name));
        }

        let mut seen: Vec<String> = Vec::with_capacity(columns.len());
        for column in &columns {
            if !is_sql_identifier(&column.name) {
                return Err(anyhow!("'{}' is not a valid column name", column.name));
            }
            let key = column.name.to_lowercase();
            if seen.contains(&key) {
                return Err(anyhow!("column '{}' is declared twice", column.name));
            }
            seen.push(key);
        }

        let fingerprint = serde_json::to_string(&columns)
            .map_err(|e| anyhow!("Failed to fingerprint columns: {}", e))?;

        Ok(Self {
            name: name.to_string(),
            columns,
            fingerprint,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnDefinition] {
        &self.columns
    }

    /// Canonical serialization of the column list
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    fn primary_keys(&self) -> Vec<&ColumnDefinition> {
        self.columns.iter().filter(|c| c.primary_key).collect()
    }

    fn column_sql(&self, column: &ColumnDefinition) -> String {
        let mut sql = format!("\"{}\" {}", column.name, column.kind.sql_type());
        if column.primary_key && self.primary_keys().len() == 1 {
            sql.push_str(" PRIMARY KEY");
        }
        if !column.nullable {
            sql.push_str(" NOT NULL");
        }
        if column.unique {
            sql.push_str(" UNIQUE");
        }
        if let Some(value) = &column.default {
            sql.push_str(&format!(" DEFAULT '{}'", value.replace('\'', "''")));
        }
        sql
    }

    /// `CREATE TABLE IF NOT EXISTS` statement for this table
    pub fn create_sql(&self) -> String {
        let mut parts: Vec<String> = self.columns.iter().map(|c| self.column_sql(c)).collect();
        let keys = self.primary_keys();
        if keys.len() > 1 {
            let names = keys
                .iter()
                .map(|c| format!("\"{}\"", c.name))
                .collect::<Vec<_>>()
                .join(", ");
            parts.push(format!("PRIMARY KEY ({})", names));
        }
        format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" ({})",
            self.name,
            parts.join(", ")
        )
    }

    pub fn drop_sql(&self) -> String {
        format!("DROP TABLE IF EXISTS \"{}\"", self.name)
    }

    fn add_column_sql(&self, column: &ColumnDefinition) -> String {
        format!(
            "ALTER TABLE \"{}\" ADD COLUMN {}",
            self.name,
            self.column_sql(column)
        )
    }
}

/// What a sync did to one model table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SchemaAction {
    Created,
    Altered { added_columns: Vec<String> },
    Recreated,
    Unchanged,
    Skipped,
}

impl std::fmt::Display for SchemaAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemaAction::Created => write!(f, "created"),
            SchemaAction::Altered { added_columns } => {
                write!(f, "altered (+{})", added_columns.join(", +"))
            }
            SchemaAction::Recreated => write!(f, "recreated"),
            SchemaAction::Unchanged => write!(f, "unchanged"),
            SchemaAction::Skipped => write!(f, "skipped"),
        }
    }
}

/// Ledger entry for one model
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationRecord {
    pub model: String,
    pub table_name: String,
    pub fingerprint: String,
    pub strategy: String,
    pub applied_at: i64,
}

/// Schema manager for one store connection
pub struct SchemaManager<'a> {
    conn: &'a Connection,
}

impl<'a> SchemaManager<'a> {
    /// Create a new schema manager for the given connection
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Create the bookkeeping tables and stamp the bookkeeping version
    ///
    /// Fails if the store was stamped by a newer version.
    pub fn initialize(&self) -> Result<()> {
        if let Some(version) = self.bookkeeping_version()? {
            if version > SCHEMA_VERSION {
                return Err(anyhow!(
                    "store bookkeeping is v{}, this build supports up to v{}",
                    version,
                    SCHEMA_VERSION
                ));
            }
        }

        self.conn
            .execute(SchemaDefinitions::META_TABLE, [])
            .map_err(|e| anyhow!("Failed to create meta table: {}", e))?;

        self.conn
            .execute(SchemaDefinitions::MIGRATIONS_TABLE, [])
            .map_err(|e| anyhow!("Failed to create migrations table: {}", e))?;

        self.set_meta("schema_version", &SCHEMA_VERSION.to_string())
    }

    /// Bookkeeping version stamped in the store, `None` for a fresh store
    pub fn bookkeeping_version(&self) -> Result<Option<u32>> {
        if !self.table_exists("spool_meta")? {
            return Ok(None);
        }
        match self.get_meta("schema_version")? {
            Some(version) => version
                .parse()
                .map(Some)
                .map_err(|e| anyhow!("Invalid schema version: {}", e)),
            None => Ok(None),
        }
    }

    fn table_exists(&self, table_name: &str) -> Result<bool> {
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

    fn existing_columns(&self, table_name: &str) -> Result<Vec<String>> {
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

    fn missing_columns<'t>(
        &self,
        table: &'t TableSchema,
        existing: &[String],
    ) -> Vec<&'t ColumnDefinition> {
        table
            .columns()
            .iter()
            .filter(|c| !existing.iter().any(|e| e.eq_ignore_ascii_case(&c.name)))
            .collect()
    }

    /// Check how a model table compares to its compiled schema
    pub fn check_status(&self, model: &str, table: &TableSchema) -> Result<SchemaStatus> {
        if !self.table_exists(table.name())? {
            return Ok(SchemaStatus::NotInitialized);
        }

        let existing = self.existing_columns(table.name())?;
        let missing: Vec<String> = self
            .missing_columns(table, &existing)
            .into_iter()
            .map(|c| c.name.clone())
            .collect();
        if !missing.is_empty() {
            return Ok(SchemaStatus::NeedsMigration {
                missing_columns: missing,
            });
        }

        let extra: Vec<String> = existing
            .into_iter()
            .filter(|e| {
                !table
                    .columns()
                    .iter()
                    .any(|c| c.name.eq_ignore_ascii_case(e))
            })
            .collect();
        let recorded = self.migration_record(model)?.map(|r| r.fingerprint);
        let fingerprint_changed = matches!(&recorded, Some(fp) if fp != table.fingerprint());

        if !extra.is_empty() || fingerprint_changed {
            Ok(SchemaStatus::Drifted {
                extra_columns: extra,
            })
        } else {
            Ok(SchemaStatus::Current)
        }
    }

    /// Bring a model table in line with its schema using `strategy`
    ///
    /// Expects `initialize` to have run on this connection.
    pub fn sync(
        &self,
        model: &str,
        table: &TableSchema,
        strategy: MigrationStrategy,
    ) -> Result<SchemaAction> {
        let exists = self.table_exists(table.name())?;

        let action = match strategy {
            MigrationStrategy::None => return Ok(SchemaAction::Skipped),
            MigrationStrategy::Safe => {
                if exists {
                    return Ok(SchemaAction::Unchanged);
                }
                self.create(table)?;
                SchemaAction::Created
            }
            MigrationStrategy::Alter => {
                if !exists {
                    self.create(table)?;
                    SchemaAction::Created
                } else {
                    let existing = self.existing_columns(table.name())?;
                    let missing = self.missing_columns(table, &existing);
                    if existing.len() > table.columns().len() - missing.len() {
                        warn!(
                            "table '{}' has columns model '{}' does not declare, leaving them in place",
                            table.name(),
                            model
                        );
                    }
                    if missing.is_empty() {
                        SchemaAction::Unchanged
                    } else {
                        let mut added = Vec::with_capacity(missing.len());
                        for column in missing {
                            self.conn
                                .execute(&table.add_column_sql(column), [])
                                .map_err(|e| {
                                    anyhow!(
                                        "Failed to add column '{}' to '{}': {}",
                                        column.name,
                                        table.name(),
                                        e
                                    )
                                })?;
                            added.push(column.name.clone());
                        }
                        SchemaAction::Altered {
                            added_columns: added,
                        }
                    }
                }
            }
            MigrationStrategy::Drop => {
                if exists && self.is_recorded(model, table)? {
                    return Ok(SchemaAction::Unchanged);
                }
                self.conn
                    .execute(&table.drop_sql(), [])
                    .map_err(|e| anyhow!("Failed to drop table '{}': {}", table.name(), e))?;
                self.create(table)?;
                if exists {
                    SchemaAction::Recreated
                } else {
                    SchemaAction::Created
                }
            }
        };

        self.record(model, table, strategy)?;
        debug!("model '{}' table '{}': {}", model, table.name(), action);
        Ok(action)
    }

    /// Whether the ledger already holds this exact table for `model`
    fn is_recorded(&self, model: &str, table: &TableSchema) -> Result<bool> {
        Ok(self
            .migration_record(model)?
            .is_some_and(|r| r.table_name == table.name() && r.fingerprint == table.fingerprint()))
    }

    fn create(&self, table: &TableSchema) -> Result<()> {
        self.conn
            .execute(&table.create_sql(), [])
            .map_err(|e| anyhow!("Failed to create table '{}': {}", table.name(), e))?;
        Ok(())
    }

    fn record(&self, model: &str, table: &TableSchema, strategy: MigrationStrategy) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO spool_migrations (model, table_name, fingerprint, strategy, applied_at) VALUES (?1, ?2, ?3, ?4, strftime('%s', 'now'))",
                [model, table.name(), table.fingerprint(), strategy.as_str()],
            )
            .map_err(|e| anyhow!("Failed to record migration: {}", e))?;
        Ok(())
    }

    /// Ledger entry for a model, if it was ever migrated
    pub fn migration_record(&self, model: &str) -> Result<Option<MigrationRecord>> {
        if !self.table_exists("spool_migrations")? {
            return Ok(None);
        }
        let result = self.conn.query_row(
            "SELECT model, table_name, fingerprint, strategy, applied_at FROM spool_migrations WHERE model = ?1",
            [model],
            |row| {
                Ok(MigrationRecord {
                    model: row.get(0)?,
                    table_name: row.get(1)?,
                    fingerprint: row.get(2)?,
                    strategy: row.get(3)?,
                    applied_at: row.get(4)?,
                })
            },
        );

        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(anyhow!("Failed to read migration record: {}", e)),
        }
    }

    /// Set a metadata value
    pub fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO spool_meta (key, value, updated_at) VALUES (?1, ?2, strftime('%s', 'now'))",
                [key, value],
            )
            .map_err(|e| anyhow!("Failed to set meta value: {}", e))?;
        Ok(())
    }

    /// Get a metadata value
    pub fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let result: Result<String, _> = self.conn.query_row(
            "SELECT value FROM spool_meta WHERE key = ?1",
            [key],
            |row| row.get(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(anyhow!("Failed to get meta value: {}", e)),
        }
    }
}

/// Status of a model table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SchemaStatus {
    /// Table does not exist yet
    NotInitialized,

    /// Table matches the compiled schema
    Current,

    /// Table lacks declared columns
    NeedsMigration { missing_columns: Vec<String> },

    /// Table has undeclared columns, or the last applied fingerprint differs
    Drifted { extra_columns: Vec<String> },
}

impl std::fmt::Display for SchemaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemaStatus::NotInitialized => write!(f, "not initialized"),
            SchemaStatus::Current => write!(f, "current"),
            SchemaStatus::NeedsMigration { missing_columns } => {
                write!(f, "needs migration (missing {})", missing_columns.join(", "))
            }
            SchemaStatus::Drifted { extra_columns } if extra_columns.is_empty() => {
                write!(f, "drifted")
            }
            SchemaStatus::Drifted { extra_columns } => {
                write!(f, "drifted (extra {})", extra_columns.join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ColumnType;
    use rusqlite::Connection;

    fn create_test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("PRAGMA foreign_keys=ON", []).unwrap();
        conn
    }

    fn users_table() -> TableSchema {
        TableSchema::new(
            "users",
            vec![
                ColumnDefinition::new("id", ColumnType::Integer).primary_key(),
                ColumnDefinition::new("email", ColumnType::Text)
                    .not_null()
                    .unique(),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_sql_identifier() {
        assert!(is_sql_identifier("users"));
        assert!(is_sql_identifier("_private2"));
        assert!(!is_sql_identifier("2fast"));
        assert!(!is_sql_identifier("drop table"));
        assert!(!is_sql_identifier("users\""));
        assert!(!is_sql_identifier(""));
    }

    #[test]
    fn test_table_schema_validation() {
        let id = ColumnDefinition::new("id", ColumnType::Integer);
        assert!(TableSchema::new("spool_migrations", vec![id.clone()]).is_err());
        assert!(TableSchema::new("SQLITE_stat", vec![id.clone()]).is_err());
        assert!(TableSchema::new("empty", vec![]).is_err());
        assert!(TableSchema::new("dupes", vec![id.clone(), id.clone()]).is_err());
        assert!(TableSchema::new("ok", vec![id]).is_ok());
    }

    #[test]
    fn test_create_sql() {
        assert_eq!(
            users_table().create_sql(),
            "CREATE TABLE IF NOT EXISTS \"users\" (\"id\" INTEGER PRIMARY KEY NOT NULL, \"email\" TEXT NOT NULL UNIQUE)"
        );

        let composite = TableSchema::new(
            "memberships",
            vec![
                ColumnDefinition::new("user_id", ColumnType::Integer).primary_key(),
                ColumnDefinition::new("group_id", ColumnType::Integer).primary_key(),
            ],
        )
        .unwrap();
        assert_eq!(
            composite.create_sql(),
            "CREATE TABLE IF NOT EXISTS \"memberships\" (\"user_id\" INTEGER NOT NULL, \"group_id\" INTEGER NOT NULL, PRIMARY KEY (\"user_id\", \"group_id\"))"
        );
    }

    #[test]
    fn test_initialize_stamps_version() {
        let conn = create_test_db();
        let manager = SchemaManager::new(&conn);

        assert_eq!(manager.bookkeeping_version().unwrap(), None);
        manager.initialize().unwrap();
        assert_eq!(manager.bookkeeping_version().unwrap(), Some(SCHEMA_VERSION));

        // idempotent
        manager.initialize().unwrap();
    }

    #[test]
    fn test_initialize_rejects_newer_bookkeeping() {
        let conn = create_test_db();
        let manager = SchemaManager::new(&conn);
        manager.initialize().unwrap();
        manager
            .set_meta("schema_version", &(SCHEMA_VERSION + 1).to_string())
            .unwrap();

        assert!(manager.initialize().is_err());
    }

    #[test]
    fn test_sync_safe() {
        let conn = create_test_db();
        let manager = SchemaManager::new(&conn);
        manager.initialize().unwrap();
        let table = users_table();

        assert_eq!(
            manager.check_status("user", &table).unwrap(),
            SchemaStatus::NotInitialized
        );
        assert_eq!(
            manager.sync("user", &table, MigrationStrategy::Safe).unwrap(),
            SchemaAction::Created
        );
        assert_eq!(
            manager.check_status("user", &table).unwrap(),
            SchemaStatus::Current
        );
        assert_eq!(
            manager.sync("user", &table, MigrationStrategy::Safe).unwrap(),
            SchemaAction::Unchanged
        );
    }

    #[test]
    fn test_sync_alter_adds_columns() {
        let conn = create_test_db();
        let manager = SchemaManager::new(&conn);
        manager.initialize().unwrap();

        let v1 = TableSchema::new(
            "posts",
            vec![ColumnDefinition::new("id", ColumnType::Integer).primary_key()],
        )
        .unwrap();
        manager.sync("post", &v1, MigrationStrategy::Alter).unwrap();

        let v2 = TableSchema::new(
            "posts",
            vec![
                ColumnDefinition::new("id", ColumnType::Integer).primary_key(),
                ColumnDefinition::new("title", ColumnType::Text),
                ColumnDefinition::new("score", ColumnType::Real),
            ],
        )
        .unwrap();
        assert_eq!(
            manager.check_status("post", &v2).unwrap(),
            SchemaStatus::NeedsMigration {
                missing_columns: vec!["title".to_string(), "score".to_string()]
            }
        );
        assert_eq!(
            manager.sync("post", &v2, MigrationStrategy::Alter).unwrap(),
            SchemaAction::Altered {
                added_columns: vec!["title".to_string(), "score".to_string()]
            }
        );
        assert_eq!(
            manager.check_status("post", &v2).unwrap(),
            SchemaStatus::Current
        );
    }

    #[test]
    fn test_sync_alter_rejects_not_null_column() {
        let conn = create_test_db();
        let manager = SchemaManager::new(&conn);
        manager.initialize().unwrap();

        let v1 = TableSchema::new(
            "posts",
            vec![ColumnDefinition::new("id", ColumnType::Integer).primary_key()],
        )
        .unwrap();
        manager.sync("post", &v1, MigrationStrategy::Alter).unwrap();
        conn.execute("INSERT INTO posts (id) VALUES (1)", []).unwrap();

        let v2 = TableSchema::new(
            "posts",
            vec![
                ColumnDefinition::new("id", ColumnType::Integer).primary_key(),
                ColumnDefinition::new("title", ColumnType::Text).not_null(),
            ],
        )
        .unwrap();
        assert!(manager.sync("post", &v2, MigrationStrategy::Alter).is_err());
    }

    #[test]
    fn test_sync_alter_adds_not_null_column_with_default() {
        let conn = create_test_db();
        let manager = SchemaManager::new(&conn);
        manager.initialize().unwrap();

        let v1 = TableSchema::new(
            "posts",
            vec![ColumnDefinition::new("id", ColumnType::Integer).primary_key()],
        )
        .unwrap();
        manager.sync("post", &v1, MigrationStrategy::Alter).unwrap();
        conn.execute("INSERT INTO posts (id) VALUES (1)", []).unwrap();

        let v2 = TableSchema::new(
            "posts",
            vec![
                ColumnDefinition::new("id", ColumnType::Integer).primary_key(),
                ColumnDefinition::new("state", ColumnType::Text)
                    .not_null()
                    .default_value("it's new"),
            ],
        )
        .unwrap();
        assert_eq!(
            manager.sync("post", &v2, MigrationStrategy::Alter).unwrap(),
            SchemaAction::Altered {
                added_columns: vec!["state".to_string()]
            }
        );

        let state: String = conn
            .query_row("SELECT state FROM posts WHERE id = 1", [], |row| row.get(0))
            .unwrap();
        assert_eq!(state, "it's new");
    }

    #[test]
    fn test_sync_drop_recreates() {
        let conn = create_test_db();
        let manager = SchemaManager::new(&conn);
        manager.initialize().unwrap();
        let table = users_table();

        assert_eq!(
            manager.sync("user", &table, MigrationStrategy::Drop).unwrap(),
            SchemaAction::Created
        );
        conn.execute("INSERT INTO users (id, email) VALUES (1, 'a@example.com')", [])
            .unwrap();

        // same columns: the table and its rows are kept
        assert_eq!(
            manager.sync("user", &table, MigrationStrategy::Drop).unwrap(),
            SchemaAction::Unchanged
        );
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);

        let changed = TableSchema::new(
            "users",
            vec![
                ColumnDefinition::new("id", ColumnType::Integer).primary_key(),
                ColumnDefinition::new("name", ColumnType::Text),
            ],
        )
        .unwrap();
        assert_eq!(
            manager.sync("user", &changed, MigrationStrategy::Drop).unwrap(),
            SchemaAction::Recreated
        );
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_sync_drop_recreates_unrecorded_table() {
        let conn = create_test_db();
        let manager = SchemaManager::new(&conn);
        manager.initialize().unwrap();
        conn.execute("CREATE TABLE users (id INTEGER PRIMARY KEY)", [])
            .unwrap();

        assert_eq!(
            manager
                .sync("user", &users_table(), MigrationStrategy::Drop)
                .unwrap(),
            SchemaAction::Recreated
        );
        assert_eq!(
            manager.check_status("user", &users_table()).unwrap(),
            SchemaStatus::Current
        );
    }

    #[test]
    fn test_sync_none_skips() {
        let conn = create_test_db();
        let manager = SchemaManager::new(&conn);
        manager.initialize().unwrap();
        let table = users_table();

        assert_eq!(
            manager.sync("user", &table, MigrationStrategy::None).unwrap(),
            SchemaAction::Skipped
        );
        assert_eq!(
            manager.check_status("user", &table).unwrap(),
            SchemaStatus::NotInitialized
        );
        assert!(manager.migration_record("user").unwrap().is_none());
    }

    #[test]
    fn test_drift_detection() {
        let conn = create_test_db();
        let manager = SchemaManager::new(&conn);
        manager.initialize().unwrap();

        conn.execute(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT, legacy TEXT)",
            [],
        )
        .unwrap();

        assert_eq!(
            manager.check_status("user", &users_table()).unwrap(),
            SchemaStatus::Drifted {
                extra_columns: vec!["legacy".to_string()]
            }
        );
    }

    #[test]
    fn test_migration_record() {
        let conn = create_test_db();
        let manager = SchemaManager::new(&conn);
        manager.initialize().unwrap();
        let table = users_table();

        manager.sync("user", &table, MigrationStrategy::Alter).unwrap();

        let record = manager.migration_record("user").unwrap().unwrap();
        assert_eq!(record.table_name, "users");
        assert_eq!(record.fingerprint, table.fingerprint());
        assert_eq!(record.strategy, "alter");
        assert!(record.applied_at > 0);
    }

    #[test]
    fn test_meta_operations() {
        let conn = create_test_db();
        let manager = SchemaManager::new(&conn);

        manager.initialize().unwrap();

        manager.set_meta("test_key", "test_value").unwrap();
        let value = manager.get_meta("test_key").unwrap();
        assert_eq!(value, Some("test_value".to_string()));

        let missing = manager.get_meta("nonexistent").unwrap();
        assert_eq!(missing, None);
    }
}
