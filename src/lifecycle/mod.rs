//! Store lifecycle controller
//!
//! `StoreLifecycle` drives the five phases of the datastore spool:
//!
//! 1. `validate`: required spools are enabled and the store block is well-formed
//! 2. `configure`: defaults are merged into stores and models
//! 3. `initialize`: connections are opened, models compiled and published
//! 4. `migrate`: every connection is migrated (also run at the end of `initialize`)
//! 5. `unload`: every connection is closed
//!
//! The four collaborators are traits so each can be swapped out; the
//! defaults are backed by SQLite.
//!
//! ```rust,ignore
//! use storespool::{AppConfig, ModelNamespace, StoreLifecycle};
//!
//! let namespace = ModelNamespace::new();
//! let mut lifecycle = StoreLifecycle::new(AppConfig::new(&None)?, namespace.clone());
//! let report = lifecycle.boot().await?;
//!
//! let users = namespace.get("user").unwrap();
//! println!("{} users", users.count()?);
//!
//! lifecycle.unload().await?;
//! ```

pub mod compiler;
pub mod connection;
pub mod factory;
pub mod migration;
pub mod model;
pub mod registry;
pub mod validator;


pub use compiler::{ModelCompiler, SchemaCompiler};
pub use connection::{close_connections, Backend, StoreConnection};
pub use factory::{ConnectionFactory, SqliteConnectionFactory};
pub use migration::{
    migrate_store, MigrationEngine, MigrationReport, SchemaMigrationEngine, StoreMigration,
    TableMigration,
};
pub use model::{ModelBinding, ModelSchema};
pub use registry::{ConnectionRegistry, ModelName, ModelNamespace, ModelRegistry, StoreName};
pub use validator::{StoreConfigRules, StoreConfigValidator, MAX_BUSY_TIMEOUT_MS};

use crate::config::AppConfig;
use crate::error::{LifecycleError, ModelFailure};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Spools that must be enabled for stores to be usable
pub const REQUIRED_SPOOLS: &[&str] = &["router"];

/// Lifecycle phases, in the order they run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Validate,
    Configure,
    Initialize,
    Migrate,
    Unload,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Validate => "validate",
            Phase::Configure => "configure",
            Phase::Initialize => "initialize",
            Phase::Migrate => "migrate",
            Phase::Unload => "unload",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum LifecycleState {
    Unvalidated,
    Validated,
    Configured,
    Initialized,
    Migrated,
    Unloaded,
    /// A phase failed; only the phase itself (or `unload`) may run next
    Failed { phase: Phase },
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleState::Unvalidated => write!(f, "unvalidated"),
            LifecycleState::Validated => write!(f, "validated"),
            LifecycleState::Configured => write!(f, "configured"),
            LifecycleState::Initialized => write!(f, "initialized"),
            LifecycleState::Migrated => write!(f, "migrated"),
            LifecycleState::Unloaded => write!(f, "unloaded"),
            LifecycleState::Failed { phase } => write!(f, "failed during {}", phase),
        }
    }
}

/// Owns the connection and model registries of one application
pub struct StoreLifecycle {
    config: AppConfig,
    namespace: ModelNamespace,
    validator: Box<dyn StoreConfigValidator>,
    factory: Box<dyn ConnectionFactory>,
    compiler: Box<dyn ModelCompiler>,
    engine: Box<dyn MigrationEngine>,
    state: LifecycleState,
    connections: ConnectionRegistry,
    models: ModelRegistry,
}

impl StoreLifecycle {
    /// Create a lifecycle with the SQLite-backed collaborators
    pub fn new(config: AppConfig, namespace: ModelNamespace) -> Self {
        Self {
            config,
            namespace,
            validator: Box::new(StoreConfigRules),
            factory: Box::new(SqliteConnectionFactory),
            compiler: Box::new(SchemaCompiler),
            engine: Box::new(SchemaMigrationEngine),
            state: LifecycleState::Unvalidated,
            connections: ConnectionRegistry::new(),
            models: ModelRegistry::new(),
        }
    }

    pub fn with_validator(mut self, validator: impl StoreConfigValidator + 'static) -> Self {
        self.validator = Box::new(validator);
        self
    }

    pub fn with_connection_factory(mut self, factory: impl ConnectionFactory + 'static) -> Self {
        self.factory = Box::new(factory);
        self
    }

    pub fn with_model_compiler(mut self, compiler: impl ModelCompiler + 'static) -> Self {
        self.compiler = Box::new(compiler);
        self
    }

    pub fn with_migration_engine(mut self, engine: impl MigrationEngine + 'static) -> Self {
        self.engine = Box::new(engine);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn namespace(&self) -> &ModelNamespace {
        &self.namespace
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Live connections; empty before `initialize` and after `unload`
    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    /// Compiled models; empty before `initialize` and after `unload`
    pub fn models(&self) -> &ModelRegistry {
        &self.models
    }

    fn enter(&self, phase: Phase) -> Result<(), LifecycleError> {
        use LifecycleState::*;

        let allowed = match phase {
            Phase::Validate => matches!(
                self.state,
                Unvalidated | Validated | Failed { phase: Phase::Validate }
            ),
            Phase::Configure => matches!(self.state, Validated | Configured),
            Phase::Initialize => matches!(
                self.state,
                Configured | Failed { phase: Phase::Initialize }
            ),
            Phase::Migrate => matches!(
                self.state,
                Initialized | Migrated | Failed { phase: Phase::Migrate }
            ),
            Phase::Unload => true,
        };

        if allowed {
            debug!("entering {} phase from state {}", phase, self.state);
            Ok(())
        } else {
            Err(LifecycleError::PhaseOrder {
                phase,
                state: self.state,
            })
        }
    }

    fn settle<T>(
        &mut self,
        phase: Phase,
        next: LifecycleState,
        result: Result<T, LifecycleError>,
    ) -> Result<T, LifecycleError> {
        match &result {
            Ok(_) => self.state = next,
            Err(e) => {
                warn!("{} phase failed: {}", phase, e);
                self.state = LifecycleState::Failed { phase };
            }
        }
        result
    }

    /// Check required spools and the structure of every store entry
    pub fn validate(&mut self) -> Result<(), LifecycleError> {
        self.enter(Phase::Validate)?;
        let result = self.check_config();
        self.settle(Phase::Validate, LifecycleState::Validated, result)
    }

    fn check_config(&self) -> Result<(), LifecycleError> {
        let missing: Vec<String> = REQUIRED_SPOOLS
            .iter()
            .filter(|spool| !self.config.has_spool(spool))
            .map(|spool| spool.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(LifecycleError::MissingDependency { spools: missing });
        }

        let Some(stores) = &self.config.stores else {
            debug!("no store block configured");
            return Ok(());
        };
        if stores.is_empty() {
            warn!("no stores configured, models will be ignored");
            return Ok(());
        }

        let violations = self.validator.validate_stores(stores);
        if !violations.is_empty() {
            return Err(LifecycleError::InvalidStoreConfig(violations));
        }
        Ok(())
    }

    /// Merge defaults into stores and models
    pub fn configure(&mut self) -> Result<(), LifecycleError> {
        self.enter(Phase::Configure)?;
        self.config = self.config.with_defaults_applied();
        self.state = LifecycleState::Configured;
        Ok(())
    }

    /// Open connections, compile and publish models, then migrate
    ///
    /// Nothing is published when connecting or compiling fails, and
    /// connections opened before a compile failure are closed again.
    pub async fn initialize(&mut self) -> Result<MigrationReport, LifecycleError> {
        self.enter(Phase::Initialize)?;

        match self.connect_and_compile().await {
            Ok((connections, models)) => {
                let replaced = self.namespace.publish(&models);
                if replaced > 0 {
                    debug!("replaced {} existing namespace entries", replaced);
                }
                info!(
                    "initialized {} store(s) and {} model(s)",
                    connections.len(),
                    models.len()
                );
                self.connections = connections;
                self.models = models;
                self.state = LifecycleState::Initialized;
            }
            Err(e) => return self.settle(Phase::Initialize, LifecycleState::Initialized, Err(e)),
        }

        self.migrate().await
    }

    async fn connect_and_compile(
        &self,
    ) -> Result<(ConnectionRegistry, ModelRegistry), LifecycleError> {
        let connections = self.factory.build_connections(&self.config).await?;

        let compiled = self
            .compiler
            .compile_models(&self.config, &connections)
            .and_then(|models| check_bindings(&models, &connections).map(|_| models));

        match compiled {
            Ok(models) => Ok((connections, models)),
            Err(e) => {
                for failure in close_connections(connections.into_connections()).await {
                    warn!(
                        "failed to close store '{}' after compile failure: {}",
                        failure.store, failure.cause
                    );
                }
                Err(e)
            }
        }
    }

    /// Migrate every connection
    ///
    /// Safe to call again after a failed or a successful run.
    pub async fn migrate(&mut self) -> Result<MigrationReport, LifecycleError> {
        self.enter(Phase::Migrate)?;
        let result = self.engine.migrate(&self.connections).await;
        self.settle(Phase::Migrate, LifecycleState::Migrated, result)
    }

    /// Close every connection
    ///
    /// Runs from any state and may be called repeatedly. The lifecycle ends in
    /// `Unloaded` even when some connections fail to close.
    pub async fn unload(&mut self) -> Result<(), LifecycleError> {
        self.enter(Phase::Unload)?;

        let connections = std::mem::take(&mut self.connections);
        self.models = ModelRegistry::new();
        self.state = LifecycleState::Unloaded;

        if connections.is_empty() {
            debug!("no store connections to close");
            return Ok(());
        }

        let count = connections.len();
        let failures = close_connections(connections.into_connections()).await;
        if !failures.is_empty() {
            return Err(LifecycleError::Shutdown(failures));
        }
        info!("closed {} store connection(s)", count);
        Ok(())
    }

    /// Run validate, configure and initialize in order
    pub async fn boot(&mut self) -> Result<MigrationReport, LifecycleError> {
        self.validate()?;
        self.configure()?;
        self.initialize().await
    }
}

impl std::fmt::Debug for StoreLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreLifecycle")
            .field("state", &self.state)
            .field("connections", &self.connections)
            .field("models", &self.models)
            .finish_non_exhaustive()
    }
}

/// Every binding must share the registry's connection for its store
fn check_bindings(
    models: &ModelRegistry,
    connections: &ConnectionRegistry,
) -> Result<(), LifecycleError> {
    let failures: Vec<ModelFailure> = models
        .iter()
        .filter(|(_, binding)| {
            !connections
                .get(binding.store().as_str())
                .is_some_and(|connection| Arc::ptr_eq(connection, binding.connection()))
        })
        .map(|(name, binding)| {
            ModelFailure::new(
                name.as_str(),
                format!("bound to a connection of store '{}' outside the registry", binding.store()),
            )
        })
        .collect();

    if failures.is_empty() {
        Ok(())
    } else {
        Err(LifecycleError::ModelCompilation(failures))
    }
}
