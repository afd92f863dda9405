// src/mods/record.rs — ModRecord and its validation from script values

use rhai::{Array, Blob, Dynamic, Map};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scripting::marshal::{as_string, classify, kind_of};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    #[error("expected a mod map, got {found}")]
    NotAMap { found: String },

    #[error("missing required field '{field}'")]
    MissingField { field: &'static str },

    #[error("field '{field}' must be {expected}, got {found}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
        found: String,
    },

    #[error("invalid game_versions: {reason}")]
    InvalidGameVersions { reason: String },
}

/// One (game version -> mod version) compatibility pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameVersion {
    pub version: String,
    pub mod_version: String,
}

/// A mod as reported by a provider plugin.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: String,
    pub version: String,
    pub enabled: bool,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub download_url: String,
    #[serde(default)]
    pub icon_url: String,
    #[serde(default)]
    pub header_image: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image: Vec<u8>,
    pub game_versions: Vec<GameVersion>,
    pub game_id: String,
}

impl ModRecord {
    /// Validate a script value and build a record from it.
    ///
    /// Required: `id`, `name`, `version`, `game_id` (non-empty strings),
    /// `enabled` (bool) and `game_versions`, either `#{ "<game>": "<mod>" }`
    /// or `[#{ version, mod_version }]`. Everything else defaults to empty.
    pub fn from_script(value: &Dynamic) -> Result<Self, RecordError> {
        let map = classify(value)
            .into_record()
            .map_err(|_| RecordError::NotAMap {
                found: kind_of(value),
            })?;

        Ok(ModRecord {
            id: required_string(&map, "id")?,
            name: required_string(&map, "name")?,
            description: optional_string(&map, "description")?,
            author: optional_string(&map, "author")?,
            version: required_string(&map, "version")?,
            enabled: required_bool(&map, "enabled")?,
            dependencies: string_list(&map, "dependencies")?,
            download_url: optional_string(&map, "download_url")?,
            icon_url: optional_string(&map, "icon_url")?,
            header_image: optional_string(&map, "header_image")?,
            image: image_bytes(&map)?,
            game_versions: game_versions(&map)?,
            game_id: required_string(&map, "game_id")?,
        })
    }

    /// Script representation handed to `AddMod` / `UpdateMod`.
    pub fn to_dynamic(&self) -> Dynamic {
        let mut versions = Map::new();
        for pair in &self.game_versions {
            versions.insert(
                pair.version.as_str().into(),
                Dynamic::from(pair.mod_version.clone()),
            );
        }
        let dependencies: Array = self
            .dependencies
            .iter()
            .map(|d| Dynamic::from(d.clone()))
            .collect();

        let mut map = Map::new();
        map.insert("id".into(), Dynamic::from(self.id.clone()));
        map.insert("name".into(), Dynamic::from(self.name.clone()));
        map.insert("description".into(), Dynamic::from(self.description.clone()));
        map.insert("author".into(), Dynamic::from(self.author.clone()));
        map.insert("version".into(), Dynamic::from(self.version.clone()));
        map.insert("enabled".into(), Dynamic::from(self.enabled));
        map.insert("dependencies".into(), Dynamic::from_array(dependencies));
        map.insert("download_url".into(), Dynamic::from(self.download_url.clone()));
        map.insert("icon_url".into(), Dynamic::from(self.icon_url.clone()));
        map.insert("header_image".into(), Dynamic::from(self.header_image.clone()));
        if !self.image.is_empty() {
            map.insert("image".into(), Dynamic::from_blob(self.image.clone()));
        }
        map.insert("game_versions".into(), Dynamic::from_map(versions));
        map.insert("game_id".into(), Dynamic::from(self.game_id.clone()));
        Dynamic::from_map(map)
    }

    /// Mod version declared for a given game version, if any.
    pub fn mod_version_for(&self, game_version: &str) -> Option<&str> {
        self.game_versions
            .iter()
            .find(|pair| pair.version == game_version)
            .map(|pair| pair.mod_version.as_str())
    }
}

// ---------------------------------------------------------------------------
// Field readers
// ---------------------------------------------------------------------------

fn present<'a>(map: &'a Map, field: &str) -> Option<&'a Dynamic> {
    map.get(field).filter(|v| !v.is_unit())
}

fn required_string(map: &Map, field: &'static str) -> Result<String, RecordError> {
    let value = present(map, field).ok_or(RecordError::MissingField { field })?;
    let text = as_string(value).ok_or_else(|| RecordError::WrongType {
        field,
        expected: "a string",
        found: kind_of(value),
    })?;
    if text.is_empty() {
        return Err(RecordError::MissingField { field });
    }
    Ok(text)
}

fn optional_string(map: &Map, field: &'static str) -> Result<String, RecordError> {
    match present(map, field) {
        None => Ok(String::new()),
        Some(value) => as_string(value).ok_or_else(|| RecordError::WrongType {
            field,
            expected: "a string",
            found: kind_of(value),
        }),
    }
}

fn required_bool(map: &Map, field: &'static str) -> Result<bool, RecordError> {
    let value = present(map, field).ok_or(RecordError::MissingField { field })?;
    value.as_bool().map_err(|_| RecordError::WrongType {
        field,
        expected: "a bool",
        found: kind_of(value),
    })
}

fn string_list(map: &Map, field: &'static str) -> Result<Vec<String>, RecordError> {
    let Some(value) = present(map, field) else {
        return Ok(Vec::new());
    };
    let wrong = || RecordError::WrongType {
        field,
        expected: "an array of strings",
        found: kind_of(value),
    };
    let items = classify(value).into_list().map_err(|_| wrong())?;
    items.iter().map(|item| as_string(item).ok_or_else(wrong)).collect()
}

fn image_bytes(map: &Map) -> Result<Vec<u8>, RecordError> {
    let Some(value) = present(map, "image") else {
        return Ok(Vec::new());
    };
    let value = value.flatten_clone();
    if value.is_blob() {
        return Ok(value.cast::<Blob>());
    }
    if let Some(text) = as_string(&value) {
        return Ok(text.into_bytes());
    }
    Err(RecordError::WrongType {
        field: "image",
        expected: "a blob or a string",
        found: kind_of(&value),
    })
}

fn game_versions(map: &Map) -> Result<Vec<GameVersion>, RecordError> {
    let value = present(map, "game_versions").ok_or(RecordError::MissingField {
        field: "game_versions",
    })?;
    let value = value.flatten_clone();

    if value.is_map() {
        let versions = value.cast::<Map>();
        return versions
            .iter()
            .map(|(game, item)| {
                let mod_version =
                    as_string(item).ok_or_else(|| RecordError::InvalidGameVersions {
                        reason: format!(
                            "mod version for '{game}' must be a string, got {}",
                            kind_of(item)
                        ),
                    })?;
                Ok(GameVersion {
                    version: game.to_string(),
                    mod_version,
                })
            })
            .collect();
    }

    if value.is_array() {
        let items = value.cast::<Array>();
        return items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let entry = classify(item).into_record().map_err(|_| {
                    RecordError::InvalidGameVersions {
                        reason: format!("entry {i} must be a map, got {}", kind_of(item)),
                    }
                })?;
                let read = |key: &str| {
                    present(&entry, key).and_then(as_string).ok_or_else(|| {
                        RecordError::InvalidGameVersions {
                            reason: format!("entry {i} is missing string '{key}'"),
                        }
                    })
                };
                Ok(GameVersion {
                    version: read("version")?,
                    mod_version: read("mod_version")?,
                })
            })
            .collect();
    }

    Err(RecordError::InvalidGameVersions {
        reason: format!("expected a map or an array, got {}", kind_of(&value)),
    })
}
