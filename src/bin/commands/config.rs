use anyhow::Result;
use clap::Args;
use storespool::AppConfig;

use super::print_json;

/// Arguments for the Config command
#[derive(Args)]
pub struct ConfigArgs {
    /// Print a commented configuration template instead
    #[clap(long)]
    pub template: bool,

    /// Output as JSON
    #[clap(long)]
    pub json: bool,

    /// Pretty-print JSON output
    #[clap(long)]
    pub pretty: bool,
}

pub fn run(config: &AppConfig, config_path: Option<&str>, args: ConfigArgs) -> Result<()> {
    let ConfigArgs {
        template,
        json,
        pretty,
    } = args;

    if template {
        print!("{}", AppConfig::template());
        return Ok(());
    }

    if json {
        return print_json(config, pretty);
    }

    println!("storespool Configuration");
    println!("========================\n");
    let config_file = config_path
        .map(str::to_string)
        .unwrap_or_else(AppConfig::config_file_path);
    println!("Config file:        {}", config_file);
    println!("{}", config.summary());
    Ok(())
}
