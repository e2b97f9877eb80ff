//! Store connections
//!
//! A `StoreConnection` owns the live backend of one store from `initialize`
//! until `unload`. Model bindings share it through an `Arc`, so closing takes
//! the backend out of the connection instead of consuming the connection
//! itself; later queries through any binding then fail with a "closed" error.

use crate::config::{Dialect, MigrationStrategy, StoreConfig};
use crate::database::{ensure_parent_dir, expand_home, DatabaseConn};
use crate::error::StoreFailure;
use crate::lifecycle::model::ModelSchema;
use crate::lifecycle::registry::StoreName;
use anyhow::{anyhow, Result};
use futures::future::join_all;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use tracing::debug;

/// Concrete backend of an open store
pub enum Backend {
    /// SQLite database file
    Sqlite { path: String, db: DatabaseConn },
    /// Private in-memory SQLite database
    Memory { db: DatabaseConn },
}

impl Backend {
    /// Open the backend described by a store entry
    pub fn open(store: &StoreConfig) -> Result<Self> {
        let backend = match store.dialect {
            Dialect::Sqlite => {
                let path = store
                    .path
                    .as_deref()
                    .filter(|p| !p.is_empty())
                    .map(expand_home)
                    .ok_or_else(|| anyhow!("sqlite store has no path"))?;
                ensure_parent_dir(&path)?;
                let db = DatabaseConn::open_path(&path)?;
                Backend::Sqlite { path, db }
            }
            Dialect::Memory => Backend::Memory {
                db: DatabaseConn::open_in_memory()?,
            },
        };

        if let Some(ms) = store.busy_timeout_ms {
            backend.db().set_busy_timeout(Duration::from_millis(ms))?;
        }
        Ok(backend)
    }

    pub fn dialect(&self) -> Dialect {
        match self {
            Backend::Sqlite { .. } => Dialect::Sqlite,
            Backend::Memory { .. } => Dialect::Memory,
        }
    }

    pub fn db(&self) -> &DatabaseConn {
        match self {
            Backend::Sqlite { db, .. } | Backend::Memory { db } => db,
        }
    }

    pub fn close(self) -> Result<()> {
        match self {
            Backend::Sqlite { db, .. } | Backend::Memory { db } => db.close(),
        }
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Sqlite { path, .. } => f.debug_struct("Sqlite").field("path", path).finish(),
            Backend::Memory { .. } => f.write_str("Memory"),
        }
    }
}

/// Live connection to one store
pub struct StoreConnection {
    store: StoreName,
    dialect: Dialect,
    strategy: MigrationStrategy,
    backend: Mutex<Option<Backend>>,
    schemas: RwLock<Vec<Arc<ModelSchema>>>,
}

impl StoreConnection {
    pub fn new(store: StoreName, strategy: MigrationStrategy, backend: Backend) -> Self {
        Self {
            store,
            dialect: backend.dialect(),
            strategy,
            backend: Mutex::new(Some(backend)),
            schemas: RwLock::new(Vec::new()),
        }
    }

    /// Open a store entry; `default_strategy` applies when the entry names none
    pub fn open(
        store: StoreName,
        config: &StoreConfig,
        default_strategy: MigrationStrategy,
    ) -> Result<Self> {
        let backend =
            Backend::open(config).map_err(|e| anyhow!("store '{}': {:#}", store.as_str(), e))?;
        debug!("opened {} store '{}'", backend.dialect(), store);
        Ok(Self::new(
            store,
            config.migrate.unwrap_or(default_strategy),
            backend,
        ))
    }

    /// Open a private in-memory store
    pub fn in_memory(store: StoreName, strategy: MigrationStrategy) -> Result<Self> {
        let db = DatabaseConn::open_in_memory()?;
        Ok(Self::new(store, strategy, Backend::Memory { db }))
    }

    pub fn store(&self) -> &StoreName {
        &self.store
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn migration_strategy(&self) -> MigrationStrategy {
        self.strategy
    }

    fn lock_backend(&self) -> MutexGuard<'_, Option<Backend>> {
        self.backend.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_open(&self) -> bool {
        self.lock_backend().is_some()
    }

    /// Run `f` against the open database
    ///
    /// Calls on the same store are serialized.
    pub fn with_db<T>(&self, f: impl FnOnce(&DatabaseConn) -> Result<T>) -> Result<T> {
        let guard = self.lock_backend();
        match guard.as_ref() {
            Some(backend) => f(backend.db()),
            None => Err(anyhow!("store '{}' is closed", self.store)),
        }
    }

    /// Close the backend
    ///
    /// Returns `false` when the connection was already closed.
    pub fn close(&self) -> Result<bool> {
        let backend = self.lock_backend().take();
        match backend {
            Some(backend) => {
                backend.close()?;
                debug!("closed store '{}'", self.store);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub(crate) fn attach(&self, schema: Arc<ModelSchema>) {
        self.schemas
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(schema);
    }

    /// Schemas of the models bound to this store
    pub fn schemas(&self) -> Vec<Arc<ModelSchema>> {
        self.schemas
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl std::fmt::Debug for StoreConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConnection")
            .field("store", &self.store)
            .field("dialect", &self.dialect)
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}

/// Close every connection concurrently and wait for all of them
///
/// Returns the stores whose close failed; a failure never stops the others.
/// A real SQLite close cannot be made to fail in tests, so the failure path
/// is covered through `close_failure` by `test_close_failures_are_collected`.
pub async fn close_connections<I>(connections: I) -> Vec<StoreFailure>
where
    I: IntoIterator<Item = Arc<StoreConnection>>,
{
    let closes = connections.into_iter().map(|connection| async move {
        let store = connection.store().to_string();
        let outcome = tokio::task::spawn_blocking(move || connection.close())
            .await
            .map_err(|e| anyhow!("close task failed: {}", e))
            .and_then(|closed| closed);
        close_failure(store, outcome)
    });

    join_all(closes).await.into_iter().flatten().collect()
}

fn close_failure(store: String, outcome: Result<bool>) -> Option<StoreFailure> {
    match outcome {
        Ok(_) => None,
        Err(e) => Some(StoreFailure::new(store, format!("{:#}", e))),
    }
}
