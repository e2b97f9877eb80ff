use anyhow::{anyhow, Result};
use config::Config;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Application configuration consumed by the store lifecycle
///
/// Holds the enabled capabilities ("spools"), the store block keyed by store
/// name, the raw model definitions keyed by model name and the defaults that
/// `configure` merges into them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Enabled collaborating capabilities, e.g. `router`
    #[serde(default)]
    pub spools: Vec<String>,

    /// Store definitions; `None` when the block is absent entirely
    #[serde(default)]
    pub stores: Option<BTreeMap<String, StoreConfig>>,

    /// Raw model definitions
    #[serde(default)]
    pub models: BTreeMap<String, ModelDefinition>,

    /// Defaults merged into stores and models during `configure`
    #[serde(default)]
    pub defaults: ModelDefaults,
}

/// One named store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub dialect: Dialect,

    /// Database file, required for `sqlite` stores
    #[serde(default)]
    pub path: Option<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub migrate: Option<MigrationStrategy>,

    /// SQLite busy timeout in milliseconds
    #[serde(default)]
    pub busy_timeout_ms: Option<u64>,
}

impl StoreConfig {
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self {
            dialect: Dialect::Sqlite,
            path: Some(path.into()),
            enabled: true,
            migrate: None,
            busy_timeout_ms: None,
        }
    }

    pub fn memory() -> Self {
        Self {
            dialect: Dialect::Memory,
            path: None,
            enabled: true,
            migrate: None,
            busy_timeout_ms: None,
        }
    }

    pub fn with_migrate(mut self, strategy: MigrationStrategy) -> Self {
        self.migrate = Some(strategy);
        self
    }
}

/// Supported store backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// SQLite database file
    Sqlite,
    /// Private in-memory SQLite database
    Memory,
}

impl Dialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "sqlite",
            Dialect::Memory => "memory",
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a store (or a single model) is migrated at startup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationStrategy {
    /// Never touch the schema
    None,
    /// Create missing tables only
    Safe,
    /// Create missing tables and add missing columns
    #[default]
    Alter,
    /// Drop and recreate every model table
    Drop,
}

impl MigrationStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationStrategy::None => "none",
            MigrationStrategy::Safe => "safe",
            MigrationStrategy::Alter => "alter",
            MigrationStrategy::Drop => "drop",
        }
    }

    pub fn from_str(s: &str) -> Option<MigrationStrategy> {
        match s.to_lowercase().as_str() {
            "none" => Some(MigrationStrategy::None),
            "safe" => Some(MigrationStrategy::Safe),
            "alter" => Some(MigrationStrategy::Alter),
            "drop" => Some(MigrationStrategy::Drop),
            _ => None,
        }
    }
}

impl std::fmt::Display for MigrationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Raw application model definition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelDefinition {
    /// Store the model lives in; falls back to `defaults.store`
    #[serde(default)]
    pub store: Option<String>,

    /// Table name; falls back to the model name
    #[serde(default)]
    pub table: Option<String>,

    /// Overrides the store's migration strategy for this model only
    #[serde(default)]
    pub migrate: Option<MigrationStrategy>,

    #[serde(default)]
    pub columns: Vec<ColumnDefinition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,

    #[serde(rename = "type")]
    pub kind: ColumnType,

    #[serde(default)]
    pub primary_key: bool,

    #[serde(default = "default_true")]
    pub nullable: bool,

    #[serde(default)]
    pub unique: bool,

    /// Default value, emitted as a SQL string literal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, kind: ColumnType) -> Self {
        Self {
            name: name.into(),
            kind,
            primary_key: false,
            nullable: true,
            unique: false,
            default: None,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.default = Some(value.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Real,
    Text,
    Blob,
    Boolean,
    Timestamp,
}

impl ColumnType {
    /// SQLite type name used in DDL
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnType::Integer | ColumnType::Boolean | ColumnType::Timestamp => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
            ColumnType::Blob => "BLOB",
        }
    }
}

/// Defaults merged into configuration by `configure`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDefaults {
    /// Store used by models that do not name one
    #[serde(default)]
    pub store: Option<String>,

    /// Strategy used by stores that do not name one
    #[serde(default)]
    pub migrate: MigrationStrategy,

    /// Upper bound for opening a single store connection
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for ModelDefaults {
    fn default() -> Self {
        Self {
            store: None,
            migrate: MigrationStrategy::default(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_connect_timeout_secs() -> u64 {
    30
}

const EMPTY_CONFIG: &str = r#"### storespool configuration file

### capabilities enabled in the application; the store lifecycle needs `router`
# spools = ["router"]

### defaults merged into stores and models
# [defaults]
# store = "main"
# migrate = "alter"            # none | safe | alter | drop
# connect_timeout_secs = 30

### stores
# [stores.main]
# dialect = "sqlite"           # sqlite | memory
# path = "~/.storespool/main.sqlite3"
# busy_timeout_ms = 5000

### models
# [models.user]
# store = "main"
# table = "users"
# columns = [
#   { name = "id", type = "integer", primary_key = true },
#   { name = "email", type = "text", nullable = false, unique = true },
# ]
"#;

impl AppConfig {
    /// Load configuration from a TOML file and `STORESPOOL_*` environment variables
    ///
    /// By default `$HOME/.storespool/storespool.toml` is used. A commented
    /// template is written when the file does not exist yet.
    pub fn new(path: &Option<String>) -> Result<AppConfig> {
        let mut builder = Config::builder();

        match path {
            Some(p) => {
                let path = Path::new(p.as_str());
                if path.exists() {
                    let path_str = path
                        .to_str()
                        .ok_or_else(|| anyhow!("Could not convert path to string"))?;
                    builder = builder.add_source(config::File::with_name(path_str));
                } else {
                    std::fs::write(p.as_str(), EMPTY_CONFIG)
                        .map_err(|e| anyhow!("Unable to create config file: {}", e))?;
                }
            }
            None => {
                let spool_dir = Self::config_dir()?;
                std::fs::create_dir_all(spool_dir.as_str())
                    .map_err(|e| anyhow!("Unable to create storespool directory: {}", e))?;
                let p = format!("{}/storespool.toml", spool_dir.as_str());
                if Path::new(p.as_str()).exists() {
                    builder = builder.add_source(config::File::with_name(p.as_str()));
                } else {
                    std::fs::write(p.as_str(), EMPTY_CONFIG).map_err(|e| {
                        anyhow!("Unable to create config file {}: {}", p.as_str(), e)
                    })?;
                }
            }
        }

        // E.g. `STORESPOOL_STORES__MAIN__PATH=/tmp/main.sqlite3` overrides a store path
        builder = builder.add_source(
            config::Environment::with_prefix("STORESPOOL")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("spools"),
        );

        let settings = builder
            .build()
            .map_err(|e| anyhow!("Failed to build configuration: {}", e))?;

        settings
            .try_deserialize::<AppConfig>()
            .map_err(|e| anyhow!("Failed to deserialize configuration: {}", e))
    }

    /// Commented configuration template
    pub fn template() -> &'static str {
        EMPTY_CONFIG
    }

    /// Parse configuration from TOML text, without file or environment sources
    pub fn from_toml(content: &str) -> Result<AppConfig> {
        let settings = Config::builder()
            .add_source(config::File::from_str(content, config::FileFormat::Toml))
            .build()
            .map_err(|e| anyhow!("Failed to build configuration: {}", e))?;

        settings
            .try_deserialize::<AppConfig>()
            .map_err(|e| anyhow!("Failed to deserialize configuration: {}", e))
    }

    /// Directory holding the default configuration file
    pub fn config_dir() -> Result<String> {
        let home = dirs::home_dir().ok_or_else(|| anyhow!("Could not find home directory"))?;
        let home_str = home
            .to_str()
            .ok_or_else(|| anyhow!("Could not convert home directory path to string"))?;
        Ok(format!("{}/.storespool", home_str))
    }

    /// Get the config file path
    pub fn config_file_path() -> String {
        let home_dir = dirs::home_dir()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|| "~".to_string());
        format!("{}/.storespool/storespool.toml", home_dir)
    }

    /// Whether a capability is enabled
    pub fn has_spool(&self, name: &str) -> bool {
        self.spools.iter().any(|s| s == name)
    }

    /// Stores that should get a connection
    pub fn enabled_stores(&self) -> impl Iterator<Item = (&String, &StoreConfig)> {
        self.stores
            .iter()
            .flat_map(|stores| stores.iter())
            .filter(|(_, store)| store.enabled)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.defaults.connect_timeout_secs)
    }

    /// Merge computed defaults into stores and models
    ///
    /// Pure: no I/O, and the receiver is left untouched.
    pub fn with_defaults_applied(&self) -> AppConfig {
        let mut merged = self.clone();

        if let Some(stores) = merged.stores.as_mut() {
            for store in stores.values_mut() {
                if store.migrate.is_none() {
                    store.migrate = Some(self.defaults.migrate);
                }
            }
        }

        for (name, model) in merged.models.iter_mut() {
            if model.store.is_none() {
                model.store = self.defaults.store.clone();
            }
            if model.table.is_none() {
                model.table = Some(name.clone());
            }
        }

        merged
    }

    /// Display configuration summary
    pub fn summary(&self) -> String {
        let mut lines = vec![
            format!("Spools:             {}", self.spools.join(", ")),
            format!(
                "Default Store:      {}",
                self.defaults.store.as_deref().unwrap_or("-")
            ),
            format!("Default Migrate:    {}", self.defaults.migrate),
            format!(
                "Connect Timeout:    {} seconds",
                self.defaults.connect_timeout_secs
            ),
        ];

        match &self.stores {
            None => lines.push("Stores:             not configured".to_string()),
            Some(stores) => {
                lines.push(format!("Stores:             {}", stores.len()));
                for (name, store) in stores {
                    let state = if store.enabled { "" } else { " (disabled)" };
                    lines.push(format!(
                        "  {:<18}{} {}{}",
                        name,
                        store.dialect,
                        store.path.as_deref().unwrap_or(":memory:"),
                        state
                    ));
                }
            }
        }

        lines.push(format!("Models:             {}", self.models.len()));
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
spools = ["router", "cache"]

[defaults]
store = "main"
migrate = "safe"

[stores.main]
dialect = "sqlite"
path = "/tmp/main.sqlite3"
busy_timeout_ms = 2000

[stores.scratch]
dialect = "memory"
enabled = false

[models.user]
columns = [
  { name = "id", type = "integer", primary_key = true },
  { name = "email", type = "text", nullable = false, unique = true },
]

[models.audit]
store = "scratch"
table = "audit_log"
migrate = "drop"
columns = [{ name = "entry", type = "text" }]
"#;

    #[test]
    fn test_from_toml() {
        let config = AppConfig::from_toml(SAMPLE).unwrap();

        assert!(config.has_spool("router"));
        assert!(!config.has_spool("sessions"));

        let stores = config.stores.as_ref().unwrap();
        assert_eq!(stores.len(), 2);
        assert_eq!(stores["main"].dialect, Dialect::Sqlite);
        assert_eq!(stores["main"].busy_timeout_ms, Some(2000));
        assert!(!stores["scratch"].enabled);

        let user = &config.models["user"];
        assert_eq!(user.columns.len(), 2);
        assert!(user.columns[0].primary_key);
        assert!(!user.columns[1].nullable);
        assert!(user.columns[1].unique);

        assert_eq!(config.models["audit"].migrate, Some(MigrationStrategy::Drop));
        assert_eq!(config.defaults.migrate, MigrationStrategy::Safe);
        assert_eq!(config.defaults.connect_timeout_secs, 30);
    }

    #[test]
    fn test_column_default() {
        let config = AppConfig::from_toml(
            r#"
            [models.post]
            columns = [
              { name = "id", type = "integer", primary_key = true },
              { name = "state", type = "text", nullable = false, default = "draft" },
            ]
            "#,
        )
        .unwrap();

        let columns = &config.models["post"].columns;
        assert_eq!(columns[0].default, None);
        assert_eq!(columns[1].default.as_deref(), Some("draft"));
        assert_eq!(
            columns[1],
            ColumnDefinition::new("state", ColumnType::Text)
                .not_null()
                .default_value("draft")
        );
    }

    #[test]
    fn test_enabled_stores() {
        let config = AppConfig::from_toml(SAMPLE).unwrap();
        let names: Vec<&String> = config.enabled_stores().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["main"]);

        let empty = AppConfig::default();
        assert_eq!(empty.enabled_stores().count(), 0);
    }

    #[test]
    fn test_with_defaults_applied() {
        let config = AppConfig::from_toml(SAMPLE).unwrap();
        let merged = config.with_defaults_applied();

        let user = &merged.models["user"];
        assert_eq!(user.store.as_deref(), Some("main"));
        assert_eq!(user.table.as_deref(), Some("user"));

        let audit = &merged.models["audit"];
        assert_eq!(audit.store.as_deref(), Some("scratch"));
        assert_eq!(audit.table.as_deref(), Some("audit_log"));

        let stores = merged.stores.as_ref().unwrap();
        assert_eq!(stores["main"].migrate, Some(MigrationStrategy::Safe));

        // the source configuration is untouched
        assert!(config.models["user"].store.is_none());
    }

    #[test]
    fn test_unknown_dialect_rejected() {
        let result = AppConfig::from_toml(
            r#"
[stores.main]
dialect = "oracle"
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_template_parses() {
        let config = AppConfig::from_toml(EMPTY_CONFIG).unwrap();
        assert!(config.spools.is_empty());
        assert!(config.stores.is_none());
        assert!(config.models.is_empty());
    }

    #[test]
    fn test_migration_strategy_from_str() {
        assert_eq!(
            MigrationStrategy::from_str("ALTER"),
            Some(MigrationStrategy::Alter)
        );
        assert_eq!(MigrationStrategy::from_str("sync"), None);
        assert_eq!(MigrationStrategy::default(), MigrationStrategy::Alter);
    }
}
