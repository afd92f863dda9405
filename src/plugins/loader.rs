// src/plugins/loader.rs — Load plugins from directories and .tcplugin archives
//
// Both forms fail closed: anything wrong with the manifest, the entry script
// or the contract aborts the load and the partially built engine is dropped
// without touching its cache file.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::infra::files::{self, safe_join};
use crate::plugins::contract::{self, ScriptModProvider, PLUGIN_OBJECT};
use crate::plugins::manifest::{PluginManifest, MANIFEST_FILE};
use crate::plugins::PluginError;
use crate::scripting::{EngineOptions, PluginRoot, ScriptEngine};

/// File extension of packaged plugins.
pub const ARCHIVE_EXTENSION: &str = "tcplugin";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginKind {
    Directory,
    Archive,
}

impl std::fmt::Display for PluginKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PluginKind::Directory => f.write_str("directory"),
            PluginKind::Archive => f.write_str("archive"),
        }
    }
}

/// Settings shared by every plugin a caller loads.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Base engine options. The loader fills in the plugin root and the
    /// capabilities the manifest asks for.
    pub engine: EngineOptions,
    /// Deadline for each provider call. `None` runs calls unsupervised.
    pub call_timeout: Option<Duration>,
}

/// A plugin found on disk whose manifest parsed, not yet loaded.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveredPlugin {
    pub path: PathBuf,
    pub kind: PluginKind,
    pub manifest: PluginManifest,
}

/// Load a plugin directory or archive, depending on what `path` is.
pub fn load_plugin(path: &Path, options: &LoadOptions) -> Result<ScriptModProvider, PluginError> {
    if path.is_dir() {
        load_plugin_dir(path, options)
    } else {
        load_plugin_archive(path, options)
    }
}

/// Load a plugin from a directory containing `info.json` and the entry script.
pub fn load_plugin_dir(dir: &Path, options: &LoadOptions) -> Result<ScriptModProvider, PluginError> {
    let manifest = PluginManifest::load(dir)?;
    let entry_path = safe_join(dir, &manifest.entry).ok_or_else(|| PluginError::UnsafeEntryPath {
        entry: manifest.entry.clone(),
    })?;
    if !entry_path.is_file() {
        return Err(PluginError::EntryNotFound {
            entry: manifest.entry.clone(),
        });
    }
    let text = std::fs::read_to_string(&entry_path)?;

    let root = PluginRoot::Directory(dir.to_path_buf());
    build(manifest, PluginKind::Directory, dir, root, &text, options)
}

/// Load a plugin from a zip archive. Manifest and entry are read from the
/// archive's in-memory file table.
pub fn load_plugin_archive(
    path: &Path,
    options: &LoadOptions,
) -> Result<ScriptModProvider, PluginError> {
    let table = files::read_archive(path)?;
    let origin = format!("{}:{}", path.display(), MANIFEST_FILE);
    let bytes = table
        .get(MANIFEST_FILE)
        .ok_or_else(|| PluginError::ManifestMissing {
            origin: origin.clone(),
        })?;
    let manifest = PluginManifest::parse(bytes, &origin)?;

    let script = table
        .get(&manifest.entry)
        .ok_or_else(|| PluginError::EntryNotFound {
            entry: manifest.entry.clone(),
        })?;
    let text = String::from_utf8(script.clone()).map_err(|e| {
        PluginError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    })?;

    let root = PluginRoot::Archive(Arc::new(table));
    build(manifest, PluginKind::Archive, path, root, &text, options)
}

fn build(
    manifest: PluginManifest,
    kind: PluginKind,
    source: &Path,
    root: PluginRoot,
    text: &str,
    options: &LoadOptions,
) -> Result<ScriptModProvider, PluginError> {
    let mut engine_options = options.engine.clone();
    engine_options.root = Some(root);
    engine_options.capabilities = manifest.exposed_capabilities()?;

    let mut engine = ScriptEngine::new(manifest.id, engine_options)?;
    if let Err(e) = prepare(&mut engine, &manifest.entry, text, options.call_timeout) {
        engine.discard();
        tracing::debug!(plugin = %manifest.id, "Plugin load aborted: {}", e);
        return Err(e);
    }

    tracing::info!(
        "Loaded plugin: {} v{} ({}, {})",
        manifest.name,
        manifest.version,
        manifest.id,
        kind
    );
    Ok(ScriptModProvider::new(
        manifest,
        kind,
        source.to_path_buf(),
        engine,
        options.call_timeout,
    ))
}

/// Run the entry script, locate the provider object and validate it.
/// With a call timeout the entry script runs under the same deadline.
fn prepare(
    engine: &mut ScriptEngine,
    entry: &str,
    text: &str,
    timeout: Option<Duration>,
) -> Result<(), PluginError> {
    let value = match timeout {
        Some(timeout) => engine.load_source_with_timeout(entry, text, timeout)?,
        None => engine.load_source(entry, text)?,
    };
    if !engine.has_object(PLUGIN_OBJECT) && value.is_map() {
        engine.bind_object(PLUGIN_OBJECT, value)?;
    }
    contract::validate(engine, PLUGIN_OBJECT)
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// List the plugins under `dir` by reading their manifests only. Entries
/// whose manifest cannot be read are skipped with a warning. Hidden entries
/// (such as the `.cache` directory) are ignored.
pub fn discover(dir: &Path) -> Vec<DiscoveredPlugin> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!("No plugins directory at {}: {}", dir.display(), e);
            return Vec::new();
        }
    };

    let mut found: Vec<DiscoveredPlugin> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| !is_hidden(path))
        .filter_map(|path| {
            let kind = plugin_kind(&path)?;
            match read_manifest(&path, kind) {
                Ok(manifest) => Some(DiscoveredPlugin {
                    path,
                    kind,
                    manifest,
                }),
                Err(e) => {
                    tracing::warn!("Ignoring plugin at {}: {}", path.display(), e);
                    None
                }
            }
        })
        .collect();

    found.sort_by(|a, b| a.path.cmp(&b.path));
    found
}

/// Find a discovered plugin by id or by case-insensitive name.
pub fn find(dir: &Path, query: &str) -> Option<DiscoveredPlugin> {
    discover(dir).into_iter().find(|p| {
        p.manifest.id.to_string() == query || p.manifest.name.eq_ignore_ascii_case(query)
    })
}

fn plugin_kind(path: &Path) -> Option<PluginKind> {
    if path.is_dir() {
        Some(PluginKind::Directory)
    } else if path.extension().and_then(|e| e.to_str()) == Some(ARCHIVE_EXTENSION) {
        Some(PluginKind::Archive)
    } else {
        None
    }
}

fn read_manifest(path: &Path, kind: PluginKind) -> Result<PluginManifest, PluginError> {
    match kind {
        PluginKind::Directory => PluginManifest::load(path),
        PluginKind::Archive => {
            let origin = format!("{}:{}", path.display(), MANIFEST_FILE);
            match files::read_file_from_zip(path, MANIFEST_FILE, false)? {
                Some((_, bytes)) => PluginManifest::parse(&bytes, &origin),
                None => Err(PluginError::ManifestMissing { origin }),
            }
        }
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}
