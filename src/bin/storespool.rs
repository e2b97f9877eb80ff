use clap::{Parser, Subcommand};
use storespool::AppConfig;
use tracing::Level;

mod commands;

use commands::check::CheckArgs;
use commands::config::ConfigArgs;
use commands::migrate::MigrateArgs;
use commands::status::StatusArgs;

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
#[clap(propagate_version = true)]
struct Cli {
    /// configuration file path, by default $HOME/.storespool/storespool.toml is used
    #[clap(short, long)]
    config: Option<String>,

    /// Print debug information
    #[clap(long)]
    debug: bool,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the loaded configuration or print a template
    Config(ConfigArgs),

    /// Validate the configuration without opening any store
    Check(CheckArgs),

    /// Open every store and compare model tables with their definitions
    Status(StatusArgs),

    /// Boot the lifecycle, migrate every store and shut down again
    Migrate(MigrateArgs),
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if cli.debug {
        tracing_subscriber::fmt()
            .with_max_level(Level::DEBUG)
            .init();
    }

    let config = match AppConfig::new(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Config(args) => commands::config::run(&config, cli.config.as_deref(), args),
        Commands::Check(args) => commands::check::run(config, args),
        Commands::Status(args) => commands::status::run(config, args).await,
        Commands::Migrate(args) => commands::migrate::run(config, args).await,
    };

    if let Err(e) = result {
        eprintln!("ERROR: {}", e);
        std::process::exit(1);
    }
}
