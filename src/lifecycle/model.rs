//! Compiled models and their connection bindings

use crate::config::{MigrationStrategy, ModelDefinition};
use crate::database::{DatabaseConn, SchemaManager, SchemaStatus, TableSchema};
use crate::lifecycle::connection::StoreConnection;
use crate::lifecycle::registry::{ModelName, StoreName};
use anyhow::Result;
use std::sync::Arc;

/// A model definition compiled into a table schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSchema {
    model: ModelName,
    table: TableSchema,
    migrate: Option<MigrationStrategy>,
}

impl ModelSchema {
    /// Compile a raw definition; the table name falls back to the model name
    pub fn compile(model: ModelName, definition: &ModelDefinition) -> Result<Self> {
        let table_name = definition
            .table
            .clone()
            .unwrap_or_else(|| model.as_str().to_string());
        let table = TableSchema::new(&table_name, definition.columns.clone())?;

        Ok(Self {
            model,
            table,
            migrate: definition.migrate,
        })
    }

    pub fn model(&self) -> &ModelName {
        &self.model
    }

    pub fn table(&self) -> &TableSchema {
        &self.table
    }

    /// Strategy declared on the model itself, if any
    pub fn migrate_override(&self) -> Option<MigrationStrategy> {
        self.migrate
    }

    /// Strategy to apply given the strategy of the store the model lives in
    pub fn effective_strategy(&self, store_strategy: MigrationStrategy) -> MigrationStrategy {
        self.migrate.unwrap_or(store_strategy)
    }
}

/// A compiled model bound to the connection of its store
pub struct ModelBinding {
    connection: Arc<StoreConnection>,
    schema: Arc<ModelSchema>,
}

impl ModelBinding {
    pub fn new(connection: Arc<StoreConnection>, schema: Arc<ModelSchema>) -> Self {
        Self { connection, schema }
    }

    pub fn name(&self) -> &ModelName {
        self.schema.model()
    }

    pub fn store(&self) -> &StoreName {
        self.connection.store()
    }

    pub fn connection(&self) -> &Arc<StoreConnection> {
        &self.connection
    }

    pub fn schema(&self) -> &Arc<ModelSchema> {
        &self.schema
    }

    pub fn table_name(&self) -> &str {
        self.schema.table().name()
    }

    /// Run `f` against the database of the bound store
    pub fn with_db<T>(&self, f: impl FnOnce(&DatabaseConn) -> Result<T>) -> Result<T> {
        self.connection.with_db(f)
    }

    /// Number of rows in the model table
    pub fn count(&self) -> Result<u64> {
        let table = self.table_name();
        self.with_db(|db| db.table_count(table))
    }

    /// Compare the live table with the compiled schema
    pub fn status(&self) -> Result<SchemaStatus> {
        self.with_db(|db| {
            SchemaManager::new(&db.conn).check_status(self.name().as_str(), self.schema.table())
        })
    }
}

impl std::fmt::Debug for ModelBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelBinding")
            .field("model", self.name())
            .field("store", self.store())
            .field("table", &self.table_name())
            .finish()
    }
}
