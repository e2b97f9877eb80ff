//! Model compiler: binds model definitions to their store connections

use crate::config::{AppConfig, ModelDefinition};
use crate::error::{LifecycleError, ModelFailure};
use crate::lifecycle::connection::StoreConnection;
use crate::lifecycle::model::{ModelBinding, ModelSchema};
use crate::lifecycle::registry::{ConnectionRegistry, ModelName, ModelRegistry};
use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Compiles model definitions against the connection registry
///
/// Every returned binding must reference a connection from `connections`; a
/// model whose store is not connected is rejected, never dropped.
pub trait ModelCompiler: Send + Sync {
    fn compile_models(
        &self,
        config: &AppConfig,
        connections: &ConnectionRegistry,
    ) -> Result<ModelRegistry, LifecycleError>;
}

/// Compiles models into SQLite table schemas
#[derive(Debug, Default, Clone, Copy)]
pub struct SchemaCompiler;

type Compiled = (Arc<StoreConnection>, Arc<ModelSchema>);

impl SchemaCompiler {
    fn compile_one(
        &self,
        name: &str,
        definition: &ModelDefinition,
        config: &AppConfig,
        connections: &ConnectionRegistry,
        tables: &mut BTreeMap<(String, String), String>,
    ) -> Result<Compiled> {
        let model = ModelName::new(name)?;

        let store = definition
            .store
            .as_deref()
            .or(config.defaults.store.as_deref())
            .ok_or_else(|| anyhow!("no store named and no default store configured"))?;
        let connection = connections
            .get(store)
            .ok_or_else(|| anyhow!("store '{}' is not connected", store))?;

        let schema = ModelSchema::compile(model, definition)?;

        let key = (
            connection.store().to_string(),
            schema.table().name().to_lowercase(),
        );
        if let Some(owner) = tables.get(&key) {
            return Err(anyhow!(
                "table '{}' on store '{}' is already used by model '{}'",
                schema.table().name(),
                store,
                owner
            ));
        }
        tables.insert(key, name.to_string());

        let create_sql = schema.table().create_sql();
        connection.with_db(|db| db.check_sql(&create_sql))?;

        Ok((connection.clone(), Arc::new(schema)))
    }
}

impl ModelCompiler for SchemaCompiler {
    fn compile_models(
        &self,
        config: &AppConfig,
        connections: &ConnectionRegistry,
    ) -> Result<ModelRegistry, LifecycleError> {
        // only an absent or empty store block ignores models; disabled stores still reject them
        if config.stores.as_ref().map_or(true, |stores| stores.is_empty()) {
            if !config.models.is_empty() {
                warn!(
                    "no stores configured, ignoring {} model definition(s)",
                    config.models.len()
                );
            }
            return Ok(ModelRegistry::new());
        }

        let mut tables = BTreeMap::new();
        let mut compiled = Vec::with_capacity(config.models.len());
        let mut failures = Vec::new();

        for (name, definition) in &config.models {
            match self.compile_one(name, definition, config, connections, &mut tables) {
                Ok(pair) => compiled.push(pair),
                Err(e) => failures.push(ModelFailure::new(name, format!("{:#}", e))),
            }
        }

        if !failures.is_empty() {
            return Err(LifecycleError::ModelCompilation(failures));
        }

        // attach only once every model compiled, so a failure leaves connections untouched
        let registry: ModelRegistry = compiled
            .into_iter()
            .map(|(connection, schema)| {
                connection.attach(schema.clone());
                Arc::new(ModelBinding::new(connection, schema))
            })
            .collect();

        debug!("compiled {} model(s)", registry.len());
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ColumnDefinition, ColumnType, MigrationStrategy, StoreConfig};
    use crate::lifecycle::registry::StoreName;

    fn connections(names: &[&str]) -> ConnectionRegistry {
        names
            .iter()
            .map(|name| {
                Arc::new(
                    StoreConnection::in_memory(
                        StoreName::new(*name).unwrap(),
                        MigrationStrategy::Alter,
                    )
                    .unwrap(),
                )
            })
            .collect()
    }

    fn model(store: Option<&str>, table: Option<&str>) -> ModelDefinition {
        ModelDefinition {
            store: store.map(str::to_string),
            table: table.map(str::to_string),
            migrate: None,
            columns: vec![
                ColumnDefinition::new("id", ColumnType::Integer).primary_key(),
                ColumnDefinition::new("body", ColumnType::Text),
            ],
        }
    }

    fn config(models: Vec<(&str, ModelDefinition)>) -> AppConfig {
        AppConfig {
            models: models
                .into_iter()
                .map(|(name, def)| (name.to_string(), def))
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_compiles_and_attaches() {
        let conns = connections(&["main", "cache"]);
        let config = config(vec![
            ("user", model(Some("main"), Some("users"))),
            ("session", model(Some("cache"), None)),
        ]);

        let models = SchemaCompiler.compile_models(&config, &conns).unwrap();

        assert_eq!(models.len(), 2);
        let user = models.get("user").unwrap();
        assert_eq!(user.store().as_str(), "main");
        assert_eq!(user.table_name(), "users");
        assert!(Arc::ptr_eq(user.connection(), conns.get("main").unwrap()));
        assert_eq!(models.get("session").unwrap().table_name(), "session");

        assert_eq!(conns.get("main").unwrap().schemas().len(), 1);
        assert_eq!(conns.get("cache").unwrap().schemas().len(), 1);
    }

    #[test]
    fn test_default_store() {
        let conns = connections(&["main"]);
        let mut config = config(vec![("user", model(None, None))]);
        config.defaults.store = Some("main".to_string());

        let models = SchemaCompiler.compile_models(&config, &conns).unwrap();
        assert_eq!(models.get("user").unwrap().store().as_str(), "main");
    }

    #[test]
    fn test_rejects_unknown_store() {
        let conns = connections(&["main"]);
        let config = config(vec![
            ("user", model(Some("main"), None)),
            ("audit", model(Some("archive"), None)),
            ("orphan", model(None, None)),
        ]);

        let err = SchemaCompiler.compile_models(&config, &conns).unwrap_err();
        assert_eq!(err.failed_models(), vec!["audit", "orphan"]);

        // nothing attached on failure
        assert!(conns.get("main").unwrap().schemas().is_empty());
    }

    #[test]
    fn test_rejects_malformed_and_duplicate_tables() {
        let conns = connections(&["main"]);
        let mut empty = model(Some("main"), None);
        empty.columns.clear();

        let config = config(vec![
            ("a_post", model(Some("main"), Some("posts"))),
            ("b_post", model(Some("main"), Some("POSTS"))),
            ("broken", empty),
            ("internal", model(Some("main"), Some("spool_meta"))),
        ]);

        let err = SchemaCompiler.compile_models(&config, &conns).unwrap_err();
        assert_eq!(err.failed_models(), vec!["b_post", "broken", "internal"]);
    }

    #[test]
    fn test_no_stores_ignores_models() {
        let mut config = config(vec![("user", model(Some("main"), None))]);
        let models = SchemaCompiler
            .compile_models(&config, &ConnectionRegistry::new())
            .unwrap();
        assert!(models.is_empty());

        config.stores = Some(BTreeMap::new());
        let models = SchemaCompiler
            .compile_models(&config, &ConnectionRegistry::new())
            .unwrap();
        assert!(models.is_empty());
    }

    #[test]
    fn test_disabled_stores_reject_models() {
        let mut archive = StoreConfig::memory();
        archive.enabled = false;
        let mut config = config(vec![("audit", model(Some("archive"), None))]);
        config.stores = Some(BTreeMap::from([("archive".to_string(), archive)]));

        let err = SchemaCompiler
            .compile_models(&config, &ConnectionRegistry::new())
            .unwrap_err();
        assert_eq!(err.failed_models(), vec!["audit"]);
    }
}
