//! Connection factory: turns enabled store entries into live connections

use crate::config::{AppConfig, MigrationStrategy, StoreConfig};
use crate::error::{LifecycleError, StoreFailure};
use crate::lifecycle::connection::{close_connections, StoreConnection};
use crate::lifecycle::registry::{ConnectionRegistry, StoreName};
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Produces one connection per enabled store
///
/// Disabled stores are omitted from the registry. Implementations own their
/// timeout policy; anything that does not complete is reported as a
/// connection failure.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn build_connections(
        &self,
        config: &AppConfig,
    ) -> Result<ConnectionRegistry, LifecycleError>;
}

/// Opens SQLite stores, all of them concurrently
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteConnectionFactory;

async fn open_store(
    name: String,
    store: StoreConfig,
    default_strategy: MigrationStrategy,
    timeout: Duration,
) -> Result<StoreConnection, String> {
    let store_name = StoreName::new(name).map_err(|e| e.to_string())?;
    let task = tokio::task::spawn_blocking(move || {
        StoreConnection::open(store_name, &store, default_strategy)
    });

    match tokio::time::timeout(timeout, task).await {
        Err(_) => Err(format!("timed out after {}s", timeout.as_secs())),
        Ok(Err(e)) => Err(format!("connect task failed: {}", e)),
        Ok(Ok(Err(e))) => Err(format!("{:#}", e)),
        Ok(Ok(Ok(connection))) => Ok(connection),
    }
}

#[async_trait]
impl ConnectionFactory for SqliteConnectionFactory {
    async fn build_connections(
        &self,
        config: &AppConfig,
    ) -> Result<ConnectionRegistry, LifecycleError> {
        let timeout = config.connect_timeout();
        let default_strategy = config.defaults.migrate;

        let opens = config.enabled_stores().map(|(name, store)| {
            let name = name.clone();
            let store = store.clone();
            async move {
                let outcome = open_store(name.clone(), store, default_strategy, timeout).await;
                (name, outcome)
            }
        });

        let mut registry = ConnectionRegistry::new();
        let mut failures = Vec::new();
        for (name, outcome) in join_all(opens).await {
            match outcome {
                Ok(connection) => {
                    registry.insert(Arc::new(connection));
                }
                Err(cause) => failures.push(StoreFailure::new(name, cause)),
            }
        }

        if !failures.is_empty() {
            for failure in close_connections(registry.into_connections()).await {
                warn!(
                    "failed to close store '{}' after connect failure: {}",
                    failure.store, failure.cause
                );
            }
            return Err(LifecycleError::Connection(failures));
        }

        info!("opened {} store connection(s)", registry.len());
        Ok(registry)
    }
}
