// src/plugins/manager.rs — Owns every loaded plugin of a plugins directory

use std::collections::HashSet;
use std::path::Path;

use uuid::Uuid;

use crate::plugins::contract::ScriptModProvider;
use crate::plugins::loader::{self, LoadOptions};

/// Manages all loaded script plugins.
pub struct PluginManager {
    plugins: Vec<ScriptModProvider>,
}

impl PluginManager {
    pub fn new() -> Self {
        Self {
            plugins: Vec::new(),
        }
    }

    /// Load every plugin directory and archive under `dir`.
    ///
    /// A plugin that fails to load is logged and skipped. When two plugins
    /// share an id only the first one (by path) that loads is kept, since the
    /// id keys the cache file.
    pub fn load_from_dir(dir: &Path, options: &LoadOptions) -> Self {
        let mut manager = Self::new();
        let mut seen = HashSet::new();

        for found in loader::discover(dir) {
            if seen.contains(&found.manifest.id) {
                tracing::warn!(
                    "Skipping plugin at {}: id {} is already loaded",
                    found.path.display(),
                    found.manifest.id
                );
                continue;
            }

            match loader::load_plugin(&found.path, options) {
                Ok(plugin) => {
                    seen.insert(found.manifest.id);
                    manager.plugins.push(plugin);
                }
                Err(e) => {
                    tracing::warn!("Failed to load plugin from {}: {}", found.path.display(), e);
                }
            }
        }

        tracing::debug!("{} plugin(s) loaded from {}", manager.plugin_count(), dir.display());
        manager
    }

    pub fn get(&self, id: &Uuid) -> Option<&ScriptModProvider> {
        self.plugins.iter().find(|p| &p.manifest().id == id)
    }

    pub fn get_mut(&mut self, id: &Uuid) -> Option<&mut ScriptModProvider> {
        self.plugins.iter_mut().find(|p| &p.manifest().id == id)
    }

    pub fn plugins(&self) -> &[ScriptModProvider] {
        &self.plugins
    }

    pub fn plugins_mut(&mut self) -> &mut [ScriptModProvider] {
        &mut self.plugins
    }

    /// Get the number of loaded plugins.
    pub fn plugin_count(&self) -> usize {
        self.plugins.len()
    }

    /// List loaded plugin names.
    pub fn plugin_names(&self) -> Vec<&str> {
        self.plugins
            .iter()
            .map(|p| p.manifest().name.as_str())
            .collect()
    }

    /// Shut down and drop every plugin, persisting their caches.
    pub fn shutdown_all(&mut self) {
        for plugin in &mut self.plugins {
            plugin.shutdown();
        }
        self.plugins.clear();
    }
}

impl Default for PluginManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PluginManager {
    fn drop(&mut self) {
        self.shutdown_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plugin_manager_empty() {
        let manager = PluginManager::new();
        assert_eq!(manager.plugin_count(), 0);
        assert!(manager.plugin_names().is_empty());
        assert!(manager.get(&Uuid::new_v4()).is_none());
    }

    #[test]
    fn test_plugin_manager_load_nonexistent() {
        let dir = tempfile::tempdir().unwrap();
        let manager = PluginManager::load_from_dir(&dir.path().join("missing"), &LoadOptions::default());
        assert_eq!(manager.plugin_count(), 0);
    }

    const PROVIDER: &str = r#"
        let plugin = #{
            GetGameID: || "g", GetGameModDirectory: || "d", GetMods: || [],
            GetModByID: |id| (), AddMod: |m| true, RemoveMod: |id| true,
            UpdateMod: |m| true,
        };
    "#;

    fn write_plugin(root: &Path, name: &str, id: &Uuid, script: &str) {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("info.json"),
            format!(r#"{{"id":"{id}","name":"{name}","version":"1","entry":"main.rhai"}}"#),
        )
        .unwrap();
        std::fs::write(dir.join("main.rhai"), script).unwrap();
    }

    #[test]
    fn test_duplicate_ids_keep_first() {
        let root = tempfile::tempdir().unwrap();
        let id = Uuid::new_v4();
        for name in ["a", "b"] {
            write_plugin(root.path(), name, &id, PROVIDER);
        }

        let mut manager = PluginManager::load_from_dir(root.path(), &LoadOptions::default());
        assert_eq!(manager.plugin_count(), 1);
        assert_eq!(manager.plugin_names(), vec!["a"]);
        assert!(manager.get(&id).is_some());

        manager.shutdown_all();
        assert_eq!(manager.plugin_count(), 0);
    }

    #[test]
    fn test_failed_plugin_does_not_claim_its_id() {
        let root = tempfile::tempdir().unwrap();
        let id = Uuid::new_v4();
        write_plugin(root.path(), "a", &id, "let plugin = #{};");
        write_plugin(root.path(), "b", &id, PROVIDER);

        let manager = PluginManager::load_from_dir(root.path(), &LoadOptions::default());
        assert_eq!(manager.plugin_names(), vec!["b"]);
    }
}
