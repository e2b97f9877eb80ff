//! Typed identifiers, the connection and model registries, and the shared model namespace

use crate::lifecycle::connection::StoreConnection;
use crate::lifecycle::model::ModelBinding;
use anyhow::{anyhow, Result};
use serde::Serialize;
use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

fn check_identifier(kind: &str, name: &str) -> Result<()> {
    let mut chars = name.chars();
    match chars.next() {
        None => return Err(anyhow!("{} name must not be empty", kind)),
        Some(c) if !(c.is_ascii_alphabetic() || c == '_') => {
            return Err(anyhow!(
                "{} name '{}' must start with a letter or underscore",
                kind,
                name
            ))
        }
        _ => {}
    }
    if let Some(c) = chars.find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-')) {
        return Err(anyhow!(
            "{} name '{}' contains invalid character '{}'",
            kind,
            name,
            c
        ));
    }
    Ok(())
}

macro_rules! identifier {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(name: impl Into<String>) -> Result<Self> {
                let name = name.into();
                check_identifier($kind, &name)?;
                Ok(Self(name))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

identifier!(
    /// Validated store name
    StoreName,
    "store"
);

identifier!(
    /// Validated model name
    ModelName,
    "model"
);

/// Live connections keyed by store name
///
/// Written once during `initialize`, read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    connections: BTreeMap<StoreName, Arc<StoreConnection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection under its own store name
    pub fn insert(&mut self, connection: Arc<StoreConnection>) -> Option<Arc<StoreConnection>> {
        self.connections
            .insert(connection.store().clone(), connection)
    }

    pub fn get(&self, store: &str) -> Option<&Arc<StoreConnection>> {
        self.connections.get(store)
    }

    pub fn contains(&self, store: &str) -> bool {
        self.connections.contains_key(store)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StoreName, &Arc<StoreConnection>)> {
        self.connections.iter()
    }

    pub fn store_names(&self) -> Vec<&StoreName> {
        self.connections.keys().collect()
    }

    pub fn into_connections(self) -> impl Iterator<Item = Arc<StoreConnection>> {
        self.connections.into_values()
    }
}

impl FromIterator<Arc<StoreConnection>> for ConnectionRegistry {
    fn from_iter<T: IntoIterator<Item = Arc<StoreConnection>>>(iter: T) -> Self {
        let mut registry = ConnectionRegistry::new();
        for connection in iter {
            registry.insert(connection);
        }
        registry
    }
}

/// Compiled model bindings keyed by model name
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: BTreeMap<ModelName, Arc<ModelBinding>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, binding: Arc<ModelBinding>) -> Option<Arc<ModelBinding>> {
        self.models.insert(binding.name().clone(), binding)
    }

    pub fn get(&self, model: &str) -> Option<&Arc<ModelBinding>> {
        self.models.get(model)
    }

    pub fn contains(&self, model: &str) -> bool {
        self.models.contains_key(model)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ModelName, &Arc<ModelBinding>)> {
        self.models.iter()
    }

    pub fn bindings(&self) -> impl Iterator<Item = &Arc<ModelBinding>> {
        self.models.values()
    }

    pub fn model_names(&self) -> Vec<&ModelName> {
        self.models.keys().collect()
    }
}

impl FromIterator<Arc<ModelBinding>> for ModelRegistry {
    fn from_iter<T: IntoIterator<Item = Arc<ModelBinding>>>(iter: T) -> Self {
        let mut registry = ModelRegistry::new();
        for binding in iter {
            registry.insert(binding);
        }
        registry
    }
}

/// Application-wide model namespace
///
/// A cheap handle: clones share the same entries, so a consumer holding a
/// clone sees everything the lifecycle publishes later.
#[derive(Debug, Clone, Default)]
pub struct ModelNamespace {
    entries: Arc<RwLock<BTreeMap<ModelName, Arc<ModelBinding>>>>,
}

impl ModelNamespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish every binding, replacing entries of the same name
    ///
    /// Returns the number of entries that were replaced.
    pub fn publish(&self, models: &ModelRegistry) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        models
            .iter()
            .filter_map(|(name, binding)| entries.insert(name.clone(), binding.clone()))
            .count()
    }

    pub fn get(&self, model: &str) -> Option<Arc<ModelBinding>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(model).cloned()
    }

    pub fn contains(&self, model: &str) -> bool {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.contains_key(model)
    }

    pub fn len(&self) -> usize {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn names(&self) -> Vec<ModelName> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.keys().cloned().collect()
    }
}
