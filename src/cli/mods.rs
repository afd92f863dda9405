// src/cli/mods.rs — `totalcontrol mods` and `totalcontrol show`

use std::path::{Path, PathBuf};

use crate::infra::config::Config;
use crate::infra::errors::TotalControlError;
use crate::mods::ModRecord;
use crate::plugins::{load_plugin, loader, ModProvider};

struct ModsReport {
    plugin: String,
    game_id: String,
    mod_directory: String,
    mods: Vec<ModRecord>,
}

/// Load one plugin and print its game, mod directory and mods.
pub async fn run_mods(config: &Config, plugin: &str) -> anyhow::Result<()> {
    let path = resolve_plugin(config, plugin)?;
    let options = config.load_options();

    let report = tokio::task::spawn_blocking(move || -> anyhow::Result<ModsReport> {
        let mut provider = load_plugin(&path, &options)?;
        let report = ModsReport {
            plugin: provider.manifest().name.clone(),
            game_id: provider.get_game_id()?,
            mod_directory: provider.get_game_mod_directory()?,
            mods: provider.get_mods()?,
        };
        provider.shutdown();
        Ok(report)
    })
    .await??;

    println!("{} ({})", report.plugin, report.game_id);
    println!("  Mod directory: {}", report.mod_directory);
    println!();
    if report.mods.is_empty() {
        println!("  (no mods)");
        return Ok(());
    }
    for line in render_mods(&report.mods) {
        println!("{line}");
    }
    Ok(())
}

/// Print one mod record as JSON.
pub async fn run_show(config: &Config, plugin: &str, mod_id: &str) -> anyhow::Result<()> {
    let path = resolve_plugin(config, plugin)?;
    let options = config.load_options();
    let id = mod_id.to_string();

    let record = tokio::task::spawn_blocking(move || -> anyhow::Result<ModRecord> {
        let mut provider = load_plugin(&path, &options)?;
        let record = provider.get_mod_by_id(&id)?;
        provider.shutdown();
        record.ok_or_else(|| TotalControlError::ModNotFound { id }.into())
    })
    .await??;

    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

/// A path to a plugin, or the id / name of a plugin in the plugins directory.
fn resolve_plugin(config: &Config, query: &str) -> Result<PathBuf, TotalControlError> {
    let candidate = Path::new(query);
    if candidate.exists() {
        return Ok(candidate.to_path_buf());
    }
    loader::find(&config.plugins_dir(), query)
        .map(|found| found.path)
        .ok_or_else(|| TotalControlError::PluginNotFound {
            id: query.to_string(),
        })
}

fn render_mods(mods: &[ModRecord]) -> Vec<String> {
    let id_width = mods.iter().map(|m| m.id.len()).max().unwrap_or(0).max(2);
    let name_width = mods.iter().map(|m| m.name.len()).max().unwrap_or(0).max(4);

    let mut lines = vec![format!(
        "  {:<id_width$}  {:<name_width$}  {:<10}  ENABLED",
        "ID", "NAME", "VERSION"
    )];
    for m in mods {
        lines.push(format!(
            "  {:<id_width$}  {:<name_width$}  {:<10}  {}",
            m.id,
            m.name,
            m.version,
            if m.enabled { "yes" } else { "no" }
        ));
    }
    lines
}
