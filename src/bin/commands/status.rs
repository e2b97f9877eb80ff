use anyhow::Result;
use clap::Args;
use serde::Serialize;
use storespool::database::SchemaStatus;
use storespool::lifecycle::{
    close_connections, ConnectionFactory, ModelCompiler, SchemaCompiler, SqliteConnectionFactory,
};
use storespool::{AppConfig, ModelNamespace, StoreLifecycle};
use tabled::settings::Style;
use tabled::{Table, Tabled};
use tracing::warn;

use super::print_json;

/// Arguments for the Status command
#[derive(Args)]
pub struct StatusArgs {
    /// Output as JSON
    #[clap(long)]
    pub json: bool,

    /// Pretty-print JSON output
    #[clap(long)]
    pub pretty: bool,
}

#[derive(Debug, Serialize, Tabled)]
struct StatusRow {
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "Store")]
    store: String,
    #[tabled(rename = "Table")]
    table: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Rows")]
    rows: String,
}

/// Open every store and report the schema status of each model, without migrating
pub async fn run(config: AppConfig, args: StatusArgs) -> Result<()> {
    let StatusArgs { json, pretty } = args;

    let mut lifecycle = StoreLifecycle::new(config, ModelNamespace::new());
    lifecycle.validate()?;
    lifecycle.configure()?;
    let config = lifecycle.config();

    let connections = SqliteConnectionFactory.build_connections(config).await?;
    let compiled = SchemaCompiler.compile_models(config, &connections);

    let rows = compiled.as_ref().map(|models| {
        models
            .bindings()
            .map(|binding| {
                let (status, rows) = match binding.status() {
                    Ok(status @ SchemaStatus::NotInitialized) => (status.to_string(), None),
                    Ok(status) => (status.to_string(), binding.count().ok()),
                    Err(e) => (format!("error: {}", e), None),
                };
                StatusRow {
                    model: binding.name().to_string(),
                    store: binding.store().to_string(),
                    table: binding.table_name().to_string(),
                    status,
                    rows: rows
                        .map(|r| r.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                }
            })
            .collect::<Vec<_>>()
    });

    for failure in close_connections(connections.into_connections()).await {
        warn!("failed to close store '{}': {}", failure.store, failure.cause);
    }
    let rows = rows.map_err(|e| e.clone())?;

    if json {
        return print_json(&rows, pretty);
    }

    if rows.is_empty() {
        println!("No models configured.");
    } else {
        println!("{}", Table::new(&rows).with(Style::rounded()));
    }
    Ok(())
}
