// src/main.rs — TotalControl entry point

use std::path::Path;

use clap::Parser;

use totalcontrol::cli::{Cli, Commands};
use totalcontrol::infra::config::Config;
use totalcontrol::infra::logger;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load config (falls back to defaults if no config.toml)
    let config = if let Some(ref path) = cli.config {
        Config::load_from(Path::new(path))?
    } else {
        Config::load()?
    };

    // Flags win over the config file; RUST_LOG wins over both
    let level = cli.log_level.as_deref().unwrap_or(&config.logging.level);
    let log_file = cli
        .log_file
        .as_deref()
        .map(Path::new)
        .or(config.logging.file.as_deref());
    logger::init_logging(level, log_file)?;

    match &cli.command {
        Commands::List { dir } => totalcontrol::cli::list::run_list(&config, dir.as_deref()).await,
        Commands::Mods { plugin } => totalcontrol::cli::mods::run_mods(&config, plugin).await,
        Commands::Show { plugin, mod_id } => {
            totalcontrol::cli::mods::run_show(&config, plugin, mod_id).await
        }
        Commands::Run { script, timeout } => {
            totalcontrol::cli::run::run_script(&config, script, *timeout).await
        }
    }
}
