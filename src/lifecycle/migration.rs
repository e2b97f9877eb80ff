//! Migration engine: applies each store's migration strategy

use crate::config::MigrationStrategy;
use crate::database::{SchemaAction, SchemaManager};
use crate::error::{LifecycleError, StoreFailure};
use crate::lifecycle::connection::StoreConnection;
use crate::lifecycle::registry::ConnectionRegistry;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// What migration did to one model table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableMigration {
    pub model: String,
    pub table: String,
    #[serde(flatten)]
    pub action: SchemaAction,
}

/// Outcome for one store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StoreMigration {
    /// The store is configured with `none` and no model overrides it
    Skipped,
    Migrated { tables: Vec<TableMigration> },
}

/// Aggregate outcome of a successful migration run
///
/// Skipped stores are listed as `StoreMigration::Skipped`, never omitted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MigrationReport {
    pub stores: BTreeMap<String, StoreMigration>,
    pub completed_at: DateTime<Utc>,
}

impl MigrationReport {
    pub fn new(stores: BTreeMap<String, StoreMigration>) -> Self {
        Self {
            stores,
            completed_at: Utc::now(),
        }
    }

    pub fn store(&self, name: &str) -> Option<&StoreMigration> {
        self.stores.get(name)
    }

    pub fn skipped_stores(&self) -> Vec<&str> {
        self.stores
            .iter()
            .filter(|(_, outcome)| matches!(outcome, StoreMigration::Skipped))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Table migrations that changed something
    pub fn changes(&self) -> Vec<(&str, &TableMigration)> {
        self.stores
            .iter()
            .flat_map(|(store, outcome)| match outcome {
                StoreMigration::Migrated { tables } => tables
                    .iter()
                    .filter(|t| !matches!(t.action, SchemaAction::Unchanged | SchemaAction::Skipped))
                    .map(|t| (store.as_str(), t))
                    .collect::<Vec<_>>(),
                StoreMigration::Skipped => Vec::new(),
            })
            .collect()
    }
}

/// Runs migrations for every connection and reports the conjunction
///
/// Implementations must attempt every connection even when some fail, and
/// must be safe to call again after a partial failure.
#[async_trait]
pub trait MigrationEngine: Send + Sync {
    async fn migrate(
        &self,
        connections: &ConnectionRegistry,
    ) -> Result<MigrationReport, LifecycleError>;
}

/// Syncs model tables per strategy, all stores concurrently
#[derive(Debug, Default, Clone, Copy)]
pub struct SchemaMigrationEngine;

/// Migrate one store inside a single transaction
pub fn migrate_store(connection: &StoreConnection) -> Result<StoreMigration> {
    let strategy = connection.migration_strategy();
    let schemas = connection.schemas();

    if strategy == MigrationStrategy::None
        && schemas.iter().all(|s| s.migrate_override().is_none())
    {
        debug!("store '{}' is configured to skip migration", connection.store());
        return Ok(StoreMigration::Skipped);
    }

    connection.with_db(|db| {
        let tx = db.transaction()?;
        let tables = {
            let manager = SchemaManager::new(&tx);
            manager.initialize()?;

            let mut tables = Vec::with_capacity(schemas.len());
            for schema in &schemas {
                let action = manager.sync(
                    schema.model().as_str(),
                    schema.table(),
                    schema.effective_strategy(strategy),
                )?;
                tables.push(TableMigration {
                    model: schema.model().to_string(),
                    table: schema.table().name().to_string(),
                    action,
                });
            }
            tables
        };
        tx.commit()
            .map_err(|e| anyhow!("Failed to commit migration: {}", e))?;
        Ok(StoreMigration::Migrated { tables })
    })
}

#[async_trait]
impl MigrationEngine for SchemaMigrationEngine {
    async fn migrate(
        &self,
        connections: &ConnectionRegistry,
    ) -> Result<MigrationReport, LifecycleError> {
        let runs = connections.iter().map(|(name, connection)| {
            let store = name.to_string();
            let connection = Arc::clone(connection);
            async move {
                let outcome =
                    match tokio::task::spawn_blocking(move || migrate_store(&connection)).await {
                        Ok(Ok(migration)) => Ok(migration),
                        Ok(Err(e)) => Err(format!("{:#}", e)),
                        Err(e) => Err(format!("migration task failed: {}", e)),
                    };
                (store, outcome)
            }
        });

        let mut stores = BTreeMap::new();
        let mut failures = Vec::new();
        for (store, outcome) in join_all(runs).await {
            match outcome {
                Ok(migration) => {
                    stores.insert(store, migration);
                }
                Err(cause) => failures.push(StoreFailure::new(store, cause)),
            }
        }

        if !failures.is_empty() {
            return Err(LifecycleError::Migration(failures));
        }

        let report = MigrationReport::new(stores);
        info!(
            "migrated {} store(s), {} table change(s), {} skipped",
            report.stores.len(),
            report.changes().len(),
            report.skipped_stores().len()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ColumnDefinition, ColumnType, ModelDefinition};
    use crate::lifecycle::model::ModelSchema;
    use crate::lifecycle::registry::{ModelName, StoreName};

    fn connection(store: &str, strategy: MigrationStrategy) -> Arc<StoreConnection> {
        Arc::new(StoreConnection::in_memory(StoreName::new(store).unwrap(), strategy).unwrap())
    }

    fn attach(connection: &StoreConnection, model: &str, columns: Vec<ColumnDefinition>) {
        let definition = ModelDefinition {
            columns,
            ..Default::default()
        };
        let schema = ModelSchema::compile(ModelName::new(model).unwrap(), &definition).unwrap();
        connection.attach(Arc::new(schema));
    }

    /// A populated `post(id)` table, so adding a NOT NULL column without default fails
    fn seed_legacy_posts(connection: &StoreConnection) {
        connection
            .with_db(|db| {
                db.execute("CREATE TABLE post (id INTEGER PRIMARY KEY)")?;
                db.execute("INSERT INTO post (id) VALUES (1)")
            })
            .unwrap();
    }

    fn id() -> ColumnDefinition {
        ColumnDefinition::new("id", ColumnType::Integer).primary_key()
    }

    #[test]
    fn test_migrate_store_creates_tables() {
        let conn = connection("main", MigrationStrategy::Alter);
        attach(&conn, "user", vec![id()]);
        attach(&conn, "post", vec![id()]);

        let outcome = migrate_store(&conn).unwrap();
        match outcome {
            StoreMigration::Migrated { tables } => {
                assert_eq!(tables.len(), 2);
                assert!(tables.iter().all(|t| t.action == SchemaAction::Created));
            }
            StoreMigration::Skipped => panic!("store should have been migrated"),
        }
        assert!(conn.with_db(|db| db.table_exists("user")).unwrap());
    }

    #[test]
    fn test_migrate_store_skips_none() {
        let conn = connection("main", MigrationStrategy::None);
        attach(&conn, "user", vec![id()]);

        assert_eq!(migrate_store(&conn).unwrap(), StoreMigration::Skipped);
        assert!(!conn.with_db(|db| db.table_exists("spool_meta")).unwrap());
    }

    #[test]
    fn test_model_override_on_skipped_store() {
        let conn = connection("main", MigrationStrategy::None);
        attach(&conn, "user", vec![id()]);
        let definition = ModelDefinition {
            migrate: Some(MigrationStrategy::Safe),
            columns: vec![id()],
            ..Default::default()
        };
        conn.attach(Arc::new(
            ModelSchema::compile(ModelName::new("post").unwrap(), &definition).unwrap(),
        ));

        match migrate_store(&conn).unwrap() {
            StoreMigration::Migrated { tables } => {
                let actions: Vec<&SchemaAction> = tables.iter().map(|t| &t.action).collect();
                assert_eq!(actions, vec![&SchemaAction::Skipped, &SchemaAction::Created]);
            }
            StoreMigration::Skipped => panic!("post overrides the store strategy"),
        }
    }

    #[test]
    fn test_failed_store_rolls_back() {
        let conn = connection("main", MigrationStrategy::Alter);
        seed_legacy_posts(&conn);
        attach(&conn, "user", vec![id()]);
        attach(
            &conn,
            "post",
            vec![id(), ColumnDefinition::new("title", ColumnType::Text).not_null()],
        );

        assert!(migrate_store(&conn).is_err());
        // the user table created earlier in the same run was rolled back
        assert!(!conn.with_db(|db| db.table_exists("user")).unwrap());
    }

    #[tokio::test]
    async fn test_engine_attempts_every_store() {
        let good = connection("alpha", MigrationStrategy::Alter);
        attach(&good, "user", vec![id()]);

        let bad = connection("beta", MigrationStrategy::Alter);
        seed_legacy_posts(&bad);
        attach(
            &bad,
            "post",
            vec![id(), ColumnDefinition::new("title", ColumnType::Text).not_null()],
        );

        let skipped = connection("gamma", MigrationStrategy::None);

        let registry: ConnectionRegistry = vec![good.clone(), bad, skipped].into_iter().collect();
        let err = SchemaMigrationEngine.migrate(&registry).await.unwrap_err();

        assert_eq!(err.failed_stores(), vec!["beta"]);
        assert!(good.with_db(|db| db.table_exists("user")).unwrap());
    }

    #[tokio::test]
    async fn test_report_lists_skipped_stores() {
        let main = connection("main", MigrationStrategy::Safe);
        attach(&main, "user", vec![id()]);
        let cache = connection("cache", MigrationStrategy::None);

        let registry: ConnectionRegistry = vec![main, cache].into_iter().collect();
        let report = SchemaMigrationEngine.migrate(&registry).await.unwrap();

        assert_eq!(report.stores.len(), 2);
        assert_eq!(report.skipped_stores(), vec!["cache"]);
        assert_eq!(report.changes().len(), 1);

        // second run changes nothing
        let again = SchemaMigrationEngine.migrate(&registry).await.unwrap();
        assert!(again.changes().is_empty());
    }
}
