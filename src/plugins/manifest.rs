// src/plugins/manifest.rs — info.json plugin manifest

use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::infra::files::safe_join;
use crate::plugins::PluginError;
use crate::scripting::ExposedCapabilities;

/// Manifest file name, at the root of a plugin directory or archive.
pub const MANIFEST_FILE: &str = "info.json";

/// Validated plugin manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginManifest {
    pub id: Uuid,
    pub name: String,
    pub version: String,
    /// Entry script, relative to the plugin root.
    pub entry: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Capability modules the plugin may use. Absent means all of them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Vec<String>>,
}

/// On-disk shape; every field optional so that a missing one can be named.
#[derive(Debug, Deserialize)]
struct RawManifest {
    id: Option<String>,
    name: Option<String>,
    version: Option<String>,
    entry: Option<String>,
    author: Option<String>,
    description: Option<String>,
    capabilities: Option<Vec<String>>,
}

impl PluginManifest {
    /// Read `info.json` from a plugin directory.
    pub fn load(dir: &Path) -> Result<Self, PluginError> {
        let path = dir.join(MANIFEST_FILE);
        if !path.is_file() {
            return Err(PluginError::ManifestMissing {
                origin: path.display().to_string(),
            });
        }
        let bytes = std::fs::read(&path)?;
        Self::parse(&bytes, &path.display().to_string())
    }

    /// Parse and validate manifest bytes. `origin` names the source in errors.
    pub fn parse(bytes: &[u8], origin: &str) -> Result<Self, PluginError> {
        let raw: RawManifest =
            serde_json::from_slice(bytes).map_err(|e| PluginError::ManifestInvalid {
                origin: origin.to_string(),
                message: e.to_string(),
            })?;

        let id_text = required(raw.id, "id")?;
        let id = Uuid::parse_str(&id_text).map_err(|e| PluginError::ManifestInvalid {
            origin: origin.to_string(),
            message: format!("id '{id_text}' is not a UUID: {e}"),
        })?;
        if id.is_nil() {
            return Err(PluginError::NilId);
        }

        let entry = required(raw.entry, "entry")?;
        if safe_join(Path::new(""), &entry).is_none() {
            return Err(PluginError::UnsafeEntryPath { entry });
        }

        if let Some(names) = &raw.capabilities {
            ExposedCapabilities::from_names(names).map_err(|message| {
                PluginError::ManifestInvalid {
                    origin: origin.to_string(),
                    message,
                }
            })?;
        }

        Ok(PluginManifest {
            id,
            name: required(raw.name, "name")?,
            version: required(raw.version, "version")?,
            entry,
            author: raw.author.filter(|s| !s.is_empty()),
            description: raw.description.filter(|s| !s.is_empty()),
            capabilities: raw.capabilities,
        })
    }

    /// Capability modules exposed to this plugin's engine.
    pub fn exposed_capabilities(&self) -> Result<ExposedCapabilities, PluginError> {
        match &self.capabilities {
            None => Ok(ExposedCapabilities::default()),
            Some(names) => ExposedCapabilities::from_names(names).map_err(|message| {
                PluginError::ManifestInvalid {
                    origin: self.id.to_string(),
                    message,
                }
            }),
        }
    }
}

fn required(value: Option<String>, field: &'static str) -> Result<String, PluginError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(PluginError::MissingField { field }),
    }
}
