#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

//! storespool - datastore lifecycle for applications
//!
//! storespool binds named database configurations ("stores") to live
//! connections, compiles model definitions into connection-bound model
//! bindings, migrates every store before the application serves traffic, and
//! closes everything again on shutdown.
//!
//! # Feature Flags
//!
//! | Feature | Description | Key Dependencies |
//! |---------|-------------|------------------|
//! | `cli` | `storespool` command-line binary (default) | `clap`, `tabled`, `tracing-subscriber`, `dotenvy` |
//!
//! The library itself always builds with the SQLite backends:
//!
//! ```toml
//! storespool = { version = "0.1", default-features = false }
//! ```
//!
//! # Architecture
//!
//! - **[`config`]**: `AppConfig` loading (TOML file and `STORESPOOL_*` environment)
//! - **[`database`]**: SQLite connection wrapper, table schemas and the migration ledger
//! - **[`lifecycle`]**: the `StoreLifecycle` controller, its registries and the
//!   collaborator traits with their default implementations
//!   - `validator`: structural checks of store entries
//!   - `factory`: opens one connection per enabled store
//!   - `compiler`: compiles model definitions against the connections
//!   - `migration`: applies migration strategies to every store
//! - **[`error`]**: `LifecycleError` and its per-store/per-model details
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use storespool::{AppConfig, ModelNamespace, StoreLifecycle};
//!
//! let config = AppConfig::from_toml(r#"
//!     spools = ["router"]
//!
//!     [stores.main]
//!     dialect = "memory"
//!
//!     [models.user]
//!     store = "main"
//!     columns = [{ name = "id", type = "integer", primary_key = true }]
//! "#)?;
//!
//! let namespace = ModelNamespace::new();
//! let mut lifecycle = StoreLifecycle::new(config, namespace.clone());
//! let report = lifecycle.boot().await?;
//!
//! let user = namespace.get("user").unwrap();
//! println!("{} rows in {}", user.count()?, user.table_name());
//!
//! lifecycle.unload().await?;
//! ```

pub mod config;
pub mod database;
pub mod error;
pub mod lifecycle;

pub use crate::config::{
    AppConfig, ColumnDefinition, ColumnType, Dialect, MigrationStrategy, ModelDefaults,
    ModelDefinition, StoreConfig,
};
pub use crate::error::{LifecycleError, ModelFailure, StoreFailure, StoreViolation};
pub use crate::lifecycle::{
    ConnectionFactory, ConnectionRegistry, LifecycleState, MigrationEngine, MigrationReport,
    ModelBinding, ModelCompiler, ModelName, ModelNamespace, ModelRegistry, Phase,
    StoreConfigValidator, StoreConnection, StoreLifecycle, StoreMigration, StoreName,
    TableMigration,
};
