use anyhow::Result;
use clap::Args;
use storespool::{AppConfig, MigrationReport, ModelNamespace, StoreLifecycle, StoreMigration};
use tabled::settings::Style;
use tabled::{Table, Tabled};

use super::print_json;

/// Arguments for the Migrate command
#[derive(Args)]
pub struct MigrateArgs {
    /// Output as JSON
    #[clap(long)]
    pub json: bool,

    /// Pretty-print JSON output
    #[clap(long)]
    pub pretty: bool,
}

#[derive(Tabled)]
struct MigrationRow {
    #[tabled(rename = "Store")]
    store: String,
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "Table")]
    table: String,
    #[tabled(rename = "Action")]
    action: String,
}

fn report_rows(report: &MigrationReport) -> Vec<MigrationRow> {
    let mut rows = Vec::new();
    for (store, outcome) in &report.stores {
        match outcome {
            StoreMigration::Skipped => rows.push(MigrationRow {
                store: store.clone(),
                model: "-".to_string(),
                table: "-".to_string(),
                action: "skipped".to_string(),
            }),
            StoreMigration::Migrated { tables } => {
                rows.extend(tables.iter().map(|t| MigrationRow {
                    store: store.clone(),
                    model: t.model.clone(),
                    table: t.table.clone(),
                    action: t.action.to_string(),
                }));
            }
        }
    }
    rows
}

/// Boot the full lifecycle, print the report and unload
pub async fn run(config: AppConfig, args: MigrateArgs) -> Result<()> {
    let MigrateArgs { json, pretty } = args;

    let mut lifecycle = StoreLifecycle::new(config, ModelNamespace::new());
    let booted = lifecycle.boot().await;
    let unloaded = lifecycle.unload().await;
    let report = booted?;
    unloaded?;

    if json {
        return print_json(&report, pretty);
    }

    let rows = report_rows(&report);
    if rows.is_empty() {
        println!("Nothing to migrate.");
    } else {
        println!("{}", Table::new(rows).with(Style::rounded()));
    }
    println!(
        "Completed at {} with {} change(s).",
        report.completed_at.format("%Y-%m-%d %H:%M:%S UTC"),
        report.changes().len()
    );
    Ok(())
}
