//! Store Lifecycle Example
//!
//! Boots two stores (a SQLite file and an in-memory cache), migrates them,
//! writes through a published model binding and unloads again.
//!
//! # Running
//!
//! ```bash
//! cargo run --example boot_sqlite
//! ```

use storespool::{AppConfig, ModelNamespace, StoreLifecycle, StoreMigration};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dir = std::env::temp_dir().join("storespool-demo");
    let path = dir.join("main.sqlite3");

    let config = AppConfig::from_toml(&format!(
        r#"
        spools = ["router"]

        [defaults]
        store = "main"
        migrate = "alter"

        [stores.main]
        dialect = "sqlite"
        path = "{}"

        [stores.cache]
        dialect = "memory"
        migrate = "none"

        [models.user]
        table = "users"
        columns = [
            {{ name = "id", type = "integer", primary_key = true }},
            {{ name = "email", type = "text", nullable = false, unique = true }},
        ]

        [models.session]
        store = "cache"
        columns = [{{ name = "token", type = "text", primary_key = true }}]
        "#,
        path.display()
    ))?;

    let namespace = ModelNamespace::new();
    let mut lifecycle = StoreLifecycle::new(config, namespace.clone());

    let report = lifecycle.boot().await?;
    for (store, outcome) in &report.stores {
        match outcome {
            StoreMigration::Skipped => println!("{}: skipped", store),
            StoreMigration::Migrated { tables } => {
                for t in tables {
                    println!("{}: {} ({}) {}", store, t.model, t.table, t.action);
                }
            }
        }
    }

    if let Some(user) = namespace.get("user") {
        user.with_db(|db| {
            db.execute_with_params(
                "INSERT OR IGNORE INTO users (id, email) VALUES (?1, ?2)",
                (1, "alice@example.com"),
            )
        })?;
        println!("{} row(s) in {}", user.count()?, user.table_name());
    }

    lifecycle.unload().await?;
    println!("state: {}", lifecycle.state());
    Ok(())
}
