use anyhow::Result;
use clap::Args;
use serde::Serialize;
use storespool::{AppConfig, ModelNamespace, StoreLifecycle};
use tabled::settings::Style;
use tabled::{Table, Tabled};

use super::print_json;

/// Arguments for the Check command
#[derive(Args)]
pub struct CheckArgs {
    /// Output as JSON
    #[clap(long)]
    pub json: bool,

    /// Pretty-print JSON output
    #[clap(long)]
    pub pretty: bool,
}

#[derive(Debug, Serialize, Tabled)]
struct StoreRow {
    #[tabled(rename = "Store")]
    store: String,
    #[tabled(rename = "Dialect")]
    dialect: String,
    #[tabled(rename = "Path")]
    path: String,
    #[tabled(rename = "Enabled")]
    enabled: bool,
    #[tabled(rename = "Migrate")]
    migrate: String,
}

#[derive(Debug, Serialize, Tabled)]
struct ModelRow {
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "Store")]
    store: String,
    #[tabled(rename = "Table")]
    table: String,
    #[tabled(rename = "Columns")]
    columns: usize,
    #[tabled(rename = "Migrate")]
    migrate: String,
}

#[derive(Debug, Serialize)]
struct CheckResult {
    stores: Vec<StoreRow>,
    models: Vec<ModelRow>,
}

/// Validate and configure, then show the merged configuration
pub fn run(config: AppConfig, args: CheckArgs) -> Result<()> {
    let CheckArgs { json, pretty } = args;

    let mut lifecycle = StoreLifecycle::new(config, ModelNamespace::new());
    lifecycle.validate()?;
    lifecycle.configure()?;
    let config = lifecycle.config();

    let stores: Vec<StoreRow> = config
        .stores
        .iter()
        .flat_map(|stores| stores.iter())
        .map(|(name, store)| StoreRow {
            store: name.clone(),
            dialect: store.dialect.to_string(),
            path: store.path.clone().unwrap_or_else(|| "-".to_string()),
            enabled: store.enabled,
            migrate: store
                .migrate
                .map(|m| m.to_string())
                .unwrap_or_else(|| "-".to_string()),
        })
        .collect();

    let models: Vec<ModelRow> = config
        .models
        .iter()
        .map(|(name, model)| ModelRow {
            model: name.clone(),
            store: model.store.clone().unwrap_or_else(|| "-".to_string()),
            table: model.table.clone().unwrap_or_else(|| name.clone()),
            columns: model.columns.len(),
            migrate: model
                .migrate
                .map(|m| m.to_string())
                .unwrap_or_else(|| "store".to_string()),
        })
        .collect();

    if json {
        return print_json(&CheckResult { stores, models }, pretty);
    }

    println!("Configuration is valid.\n");
    if stores.is_empty() {
        println!("No stores configured.");
    } else {
        println!("{}", Table::new(&stores).with(Style::rounded()));
    }
    if !models.is_empty() {
        println!("{}", Table::new(&models).with(Style::rounded()));
    }
    Ok(())
}
