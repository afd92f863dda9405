// src/cli/mod.rs — CLI definition (clap derive)

pub mod list;
pub mod mods;
pub mod run;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "totalcontrol",
    about = "Mod manager with scriptable game plugins",
    version
)]
pub struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Log level or filter directive (overrides the config file)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    pub log_file: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the plugins found in the plugins directory
    List {
        /// Plugins directory (defaults to the configured one)
        #[arg(long)]
        dir: Option<String>,
    },
    /// Load a plugin and list the mods it provides
    Mods {
        /// Plugin id, plugin name, or path to a plugin directory / .tcplugin archive
        plugin: String,
    },
    /// Show one mod as JSON
    Show {
        /// Plugin id, plugin name, or path
        plugin: String,
        /// Mod id
        mod_id: String,
    },
    /// Evaluate a script in a fresh engine and print its result
    Run {
        /// Script file
        script: String,
        /// Seconds before the script is abandoned
        #[arg(long, default_value = "30")]
        timeout: u64,
    },
}
