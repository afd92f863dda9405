// src/cli/list.rs — `totalcontrol list`

use std::path::PathBuf;

use crate::infra::config::Config;
use crate::plugins::{discover, DiscoveredPlugin};

/// Print every plugin discovered in the plugins directory.
pub async fn run_list(config: &Config, dir: Option<&str>) -> anyhow::Result<()> {
    let dir = dir.map(PathBuf::from).unwrap_or_else(|| config.plugins_dir());
    let scan_dir = dir.clone();
    let found = tokio::task::spawn_blocking(move || discover(&scan_dir)).await?;

    if found.is_empty() {
        println!("No plugins found in {}", dir.display());
        return Ok(());
    }

    println!("Plugins in {}:", dir.display());
    println!();
    for line in render_table(&found) {
        println!("{line}");
    }
    Ok(())
}

fn render_table(found: &[DiscoveredPlugin]) -> Vec<String> {
    let name_width = found
        .iter()
        .map(|p| p.manifest.name.len())
        .max()
        .unwrap_or(0)
        .max("NAME".len());

    let mut lines = vec![format!(
        "  {:<36}  {:<name_width$}  {:<10}  KIND",
        "ID", "NAME", "VERSION"
    )];
    for plugin in found {
        lines.push(format!(
            "  {:<36}  {:<name_width$}  {:<10}  {}",
            plugin.manifest.id, plugin.manifest.name, plugin.manifest.version, plugin.kind
        ));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::{PluginKind, PluginManifest};
    use uuid::Uuid;

    #[test]
    fn test_render_table_aligns_columns() {
        let found = vec![DiscoveredPlugin {
            path: PathBuf::from("/plugins/factorio"),
            kind: PluginKind::Archive,
            manifest: PluginManifest {
                id: Uuid::nil(),
                name: "Factorio Mod Portal".into(),
                version: "2.1.0".into(),
                entry: "main.rhai".into(),
                author: None,
                description: None,
                capabilities: None,
            },
        }];
        let lines = render_table(&found);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("  ID"));
        assert!(lines[1].contains("Factorio Mod Portal"));
        assert!(lines[1].ends_with("archive"));
        assert_eq!(lines[0].find("VERSION"), lines[1].find("2.1.0"));
    }
}
