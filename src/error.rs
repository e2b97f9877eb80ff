//! Lifecycle error taxonomy
//!
//! Every phase either fully succeeds or fails the boot with one of these
//! errors. Failures that concern several stores or models are aggregated
//! instead of stopping at the first one.

use crate::lifecycle::{LifecycleState, Phase};

/// A single malformed store entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreViolation {
    pub store: String,
    pub message: String,
}

impl StoreViolation {
    pub fn new(store: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            store: store.into(),
            message: message.into(),
        }
    }
}

/// A store that failed to connect, migrate or close
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreFailure {
    pub store: String,
    pub cause: String,
}

impl StoreFailure {
    pub fn new(store: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            store: store.into(),
            cause: cause.into(),
        }
    }
}

/// A model that failed to compile against its connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelFailure {
    pub model: String,
    pub cause: String,
}

impl ModelFailure {
    pub fn new(model: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            cause: cause.into(),
        }
    }
}

/// Errors raised by the store lifecycle and its collaborators
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// Required capabilities are not enabled
    MissingDependency { spools: Vec<String> },
    /// One or more store entries are malformed
    InvalidStoreConfig(Vec<StoreViolation>),
    /// One or more stores could not be connected
    Connection(Vec<StoreFailure>),
    /// One or more models did not compile
    ModelCompilation(Vec<ModelFailure>),
    /// One or more stores failed to migrate
    Migration(Vec<StoreFailure>),
    /// One or more connections failed to close
    Shutdown(Vec<StoreFailure>),
    /// A phase was invoked out of order
    PhaseOrder { phase: Phase, state: LifecycleState },
}

impl LifecycleError {
    /// Names of the stores a store-level failure refers to
    pub fn failed_stores(&self) -> Vec<&str> {
        match self {
            LifecycleError::InvalidStoreConfig(violations) => {
                let mut stores: Vec<&str> = violations.iter().map(|v| v.store.as_str()).collect();
                stores.dedup();
                stores
            }
            LifecycleError::Connection(failures)
            | LifecycleError::Migration(failures)
            | LifecycleError::Shutdown(failures) => {
                failures.iter().map(|f| f.store.as_str()).collect()
            }
            _ => Vec::new(),
        }
    }

    /// Names of the models a compilation failure refers to
    pub fn failed_models(&self) -> Vec<&str> {
        match self {
            LifecycleError::ModelCompilation(failures) => {
                failures.iter().map(|f| f.model.as_str()).collect()
            }
            _ => Vec::new(),
        }
    }
}

fn join_store_failures(failures: &[StoreFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.store, f.cause))
        .collect::<Vec<_>>()
        .join(", ")
}

impl std::fmt::Display for LifecycleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleError::MissingDependency { spools } => {
                write!(f, "store lifecycle requires spools: {}", spools.join(", "))
            }
            LifecycleError::InvalidStoreConfig(violations) => {
                let details = violations
                    .iter()
                    .map(|v| format!("{}: {}", v.store, v.message))
                    .collect::<Vec<_>>()
                    .join("; ");
                write!(f, "Invalid store configuration: {}", details)
            }
            LifecycleError::Connection(failures) => {
                write!(
                    f,
                    "Failed to connect stores: {}",
                    join_store_failures(failures)
                )
            }
            LifecycleError::ModelCompilation(failures) => {
                let details = failures
                    .iter()
                    .map(|m| format!("{} ({})", m.model, m.cause))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "Failed to compile models: {}", details)
            }
            LifecycleError::Migration(failures) => {
                write!(
                    f,
                    "Failed to migrate stores: {}",
                    join_store_failures(failures)
                )
            }
            LifecycleError::Shutdown(failures) => {
                write!(
                    f,
                    "Failed to close stores: {}",
                    join_store_failures(failures)
                )
            }
            LifecycleError::PhaseOrder { phase, state } => {
                write!(f, "Cannot run {} while lifecycle is {}", phase, state)
            }
        }
    }
}

impl std::error::Error for LifecycleError {}
