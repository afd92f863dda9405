// src/plugins/mod.rs — Script mod-provider plugins: manifest, contract, loading, management
//
// A plugin is a directory (or a `.tcplugin` zip archive) holding an
// `info.json` manifest and a Rhai entry script. The entry script must leave a
// `plugin` object implementing the seven provider methods.

pub mod contract;
pub mod loader;
pub mod manager;
pub mod manifest;

use thiserror::Error;

use crate::infra::files::FilesError;
use crate::mods::record::RecordError;
use crate::scripting::ScriptError;

pub use contract::{ModProvider, ScriptModProvider, PLUGIN_OBJECT, REQUIRED_METHODS};
pub use loader::{discover, load_plugin, DiscoveredPlugin, LoadOptions, PluginKind};
pub use manager::PluginManager;
pub use manifest::{PluginManifest, MANIFEST_FILE};

#[derive(Error, Debug)]
pub enum PluginError {
    // Manifest
    #[error("Manifest not found: {origin}")]
    ManifestMissing { origin: String },

    #[error("Invalid manifest {origin}: {message}")]
    ManifestInvalid { origin: String, message: String },

    #[error("Plugin id is not set or is the nil UUID")]
    NilId,

    #[error("Manifest is missing required field '{field}'")]
    MissingField { field: &'static str },

    #[error("Entry path '{entry}' escapes the plugin root")]
    UnsafeEntryPath { entry: String },

    // Loading
    #[error("Entry script '{entry}' not found")]
    EntryNotFound { entry: String },

    #[error("Archive error: {0}")]
    Archive(#[from] FilesError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Script(#[from] ScriptError),

    // Contract
    #[error("Entry script did not define a '{name}' object")]
    ObjectMissing { name: String },

    #[error("Plugin does not implement required method '{method}'")]
    MissingMethod { method: String },

    #[error("{method} returned an invalid mod: {source}")]
    InvalidRecord {
        method: &'static str,
        source: RecordError,
    },

    #[error("{method} must return {expected}, got {found}")]
    UnexpectedResult {
        method: &'static str,
        expected: &'static str,
        found: String,
    },
}

impl PluginError {
    /// Whether the plugin's engine is gone and the plugin must be reloaded.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PluginError::Script(e) if e.is_fatal())
    }
}
