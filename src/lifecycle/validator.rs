//! Structural validation of store entries

use crate::config::{Dialect, StoreConfig};
use crate::error::StoreViolation;
use crate::lifecycle::registry::StoreName;
use std::collections::BTreeMap;

/// Upper bound accepted for `busy_timeout_ms`
pub const MAX_BUSY_TIMEOUT_MS: u64 = 10 * 60 * 1000;

/// Reports malformed store entries
///
/// Implementations return every violation they find; an empty list means
/// the block is well-formed.
pub trait StoreConfigValidator: Send + Sync {
    fn validate_stores(&self, stores: &BTreeMap<String, StoreConfig>) -> Vec<StoreViolation>;
}

/// Default rules for SQLite-backed stores
#[derive(Debug, Default, Clone, Copy)]
pub struct StoreConfigRules;

impl StoreConfigRules {
    fn check(&self, name: &str, store: &StoreConfig, violations: &mut Vec<StoreViolation>) {
        if let Err(e) = StoreName::new(name) {
            violations.push(StoreViolation::new(name, e.to_string()));
        }

        match (store.dialect, store.path.as_deref()) {
            (Dialect::Sqlite, None) | (Dialect::Sqlite, Some("")) => {
                violations.push(StoreViolation::new(name, "sqlite store requires a path"));
            }
            (Dialect::Sqlite, Some(":memory:")) => {
                violations.push(StoreViolation::new(
                    name,
                    "use the memory dialect instead of path ':memory:'",
                ));
            }
            (Dialect::Memory, Some(_)) => {
                violations.push(StoreViolation::new(name, "memory store must not set a path"));
            }
            _ => {}
        }

        if let Some(ms) = store.busy_timeout_ms {
            if ms > MAX_BUSY_TIMEOUT_MS {
                violations.push(StoreViolation::new(
                    name,
                    format!(
                        "busy_timeout_ms {} exceeds the maximum of {}",
                        ms, MAX_BUSY_TIMEOUT_MS
                    ),
                ));
            }
        }
    }
}

impl StoreConfigValidator for StoreConfigRules {
    fn validate_stores(&self, stores: &BTreeMap<String, StoreConfig>) -> Vec<StoreViolation> {
        let mut violations = Vec::new();
        for (name, store) in stores {
            self.check(name, store, &mut violations);
        }
        violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_stores() {
        let mut stores = BTreeMap::new();
        stores.insert("main".to_string(), StoreConfig::sqlite("/tmp/main.sqlite3"));
        stores.insert("cache".to_string(), StoreConfig::memory());

        assert!(StoreConfigRules.validate_stores(&stores).is_empty());
    }

    #[test]
    fn test_aggregates_all_violations() {
        let mut stores = BTreeMap::new();

        let mut no_path = StoreConfig::sqlite("");
        no_path.path = None;
        stores.insert("main".to_string(), no_path);

        let mut memory_with_path = StoreConfig::memory();
        memory_with_path.path = Some("/tmp/cache.sqlite3".to_string());
        stores.insert("cache".to_string(), memory_with_path);

        stores.insert("9lives".to_string(), StoreConfig::memory());

        let mut slow = StoreConfig::sqlite("/tmp/slow.sqlite3");
        slow.busy_timeout_ms = Some(MAX_BUSY_TIMEOUT_MS + 1);
        stores.insert("slow".to_string(), slow);

        stores.insert("mem".to_string(), StoreConfig::sqlite(":memory:"));

        let violations = StoreConfigRules.validate_stores(&stores);
        let names: Vec<&str> = violations.iter().map(|v| v.store.as_str()).collect();
        assert_eq!(names, vec!["9lives", "cache", "main", "mem", "slow"]);
    }

    #[test]
    fn test_disabled_stores_are_still_checked() {
        let mut stores = BTreeMap::new();
        let mut disabled = StoreConfig::sqlite("");
        disabled.enabled = false;
        stores.insert("archive".to_string(), disabled);

        assert_eq!(StoreConfigRules.validate_stores(&stores).len(), 1);
    }
}
