// src/plugins/contract.rs — The mod-provider contract and its script-backed implementation

use std::path::{Path, PathBuf};
use std::time::Duration;

use rhai::Dynamic;

use crate::mods::record::ModRecord;
use crate::plugins::loader::PluginKind;
use crate::plugins::manifest::PluginManifest;
use crate::plugins::PluginError;
use crate::scripting::marshal::{as_string, classify, kind_of};
use crate::scripting::ScriptEngine;

/// Top-level script variable holding the provider object.
pub const PLUGIN_OBJECT: &str = "plugin";

/// Methods every provider object must define.
pub const REQUIRED_METHODS: [&str; 7] = [
    "GetMods",
    "GetModByID",
    "AddMod",
    "RemoveMod",
    "UpdateMod",
    "GetGameModDirectory",
    "GetGameID",
];

/// A source of mods for one game.
pub trait ModProvider {
    /// Every mod the provider knows about. Malformed entries are skipped.
    fn get_mods(&mut self) -> Result<Vec<ModRecord>, PluginError>;

    /// One mod, or `None` when the provider has no such id.
    fn get_mod_by_id(&mut self, id: &str) -> Result<Option<ModRecord>, PluginError>;

    fn add_mod(&mut self, record: &ModRecord) -> Result<bool, PluginError>;

    fn remove_mod(&mut self, id: &str) -> Result<bool, PluginError>;

    fn update_mod(&mut self, record: &ModRecord) -> Result<bool, PluginError>;

    /// Directory the game loads mods from.
    fn get_game_mod_directory(&mut self) -> Result<String, PluginError>;

    fn get_game_id(&mut self) -> Result<String, PluginError>;
}

/// Check that `object` exists and defines every required method.
/// Fails on the first method missing, in declaration order.
pub fn validate(engine: &ScriptEngine, object: &str) -> Result<(), PluginError> {
    if !engine.has_object(object) {
        return Err(PluginError::ObjectMissing {
            name: object.to_string(),
        });
    }
    for method in REQUIRED_METHODS {
        if !engine.has_method(object, method) {
            return Err(PluginError::MissingMethod {
                method: method.to_string(),
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Script-backed provider
// ---------------------------------------------------------------------------

/// A loaded, validated plugin. Owns its engine.
pub struct ScriptModProvider {
    manifest: PluginManifest,
    kind: PluginKind,
    source: PathBuf,
    engine: ScriptEngine,
    call_timeout: Option<Duration>,
}

impl std::fmt::Debug for ScriptModProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptModProvider")
            .field("id", &self.manifest.id)
            .field("name", &self.manifest.name)
            .field("kind", &self.kind)
            .field("source", &self.source)
            .field("state", &self.engine.state())
            .finish()
    }
}

impl ScriptModProvider {
    /// Wrap an engine whose `plugin` object has already been validated.
    pub(crate) fn new(
        manifest: PluginManifest,
        kind: PluginKind,
        source: PathBuf,
        engine: ScriptEngine,
        call_timeout: Option<Duration>,
    ) -> Self {
        Self {
            manifest,
            kind,
            source,
            engine,
            call_timeout,
        }
    }

    pub fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    pub fn kind(&self) -> PluginKind {
        self.kind
    }

    /// Directory or archive the plugin was loaded from.
    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn engine(&self) -> &ScriptEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut ScriptEngine {
        &mut self.engine
    }

    /// Bound every later provider call by `timeout`. A call that exceeds it
    /// closes the engine.
    pub fn set_call_timeout(&mut self, timeout: Option<Duration>) {
        self.call_timeout = timeout;
    }

    /// Persist the plugin's cache and close its engine.
    pub fn shutdown(&mut self) {
        self.engine.shutdown();
    }

    fn call(&mut self, method: &'static str, args: Vec<Dynamic>) -> Result<Dynamic, PluginError> {
        tracing::debug!(plugin = %self.manifest.id, method, "Calling plugin method");
        let result = match self.call_timeout {
            Some(timeout) => {
                self.engine
                    .call_method_with_timeout(PLUGIN_OBJECT, method, args, timeout)
            }
            None => self.engine.call_method(PLUGIN_OBJECT, method, args),
        };
        Ok(result?)
    }

    fn call_bool(&mut self, method: &'static str, args: Vec<Dynamic>) -> Result<bool, PluginError> {
        let value = self.call(method, args)?;
        value
            .as_bool()
            .map_err(|_| unexpected(method, "a bool", &value))
    }

    fn call_string(&mut self, method: &'static str) -> Result<String, PluginError> {
        let value = self.call(method, Vec::new())?;
        as_string(&value).ok_or_else(|| unexpected(method, "a string", &value))
    }
}

impl ModProvider for ScriptModProvider {
    fn get_mods(&mut self) -> Result<Vec<ModRecord>, PluginError> {
        let value = self.call("GetMods", Vec::new())?;
        let items = classify(&value)
            .into_list()
            .map_err(|_| unexpected("GetMods", "a list of mods", &value))?;

        let total = items.len();
        let mods: Vec<ModRecord> = items
            .iter()
            .enumerate()
            .filter_map(|(index, item)| match ModRecord::from_script(item) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!(
                        plugin = %self.manifest.id,
                        "Skipping mod entry {} from GetMods: {}",
                        index,
                        e
                    );
                    None
                }
            })
            .collect();

        tracing::debug!(
            plugin = %self.manifest.id,
            "GetMods returned {} of {} entries",
            mods.len(),
            total
        );
        Ok(mods)
    }

    fn get_mod_by_id(&mut self, id: &str) -> Result<Option<ModRecord>, PluginError> {
        let value = self.call("GetModByID", vec![Dynamic::from(id.to_string())])?;
        if value.is_unit() {
            return Ok(None);
        }
        ModRecord::from_script(&value)
            .map(Some)
            .map_err(|source| PluginError::InvalidRecord {
                method: "GetModByID",
                source,
            })
    }

    fn add_mod(&mut self, record: &ModRecord) -> Result<bool, PluginError> {
        self.call_bool("AddMod", vec![record.to_dynamic()])
    }

    fn remove_mod(&mut self, id: &str) -> Result<bool, PluginError> {
        self.call_bool("RemoveMod", vec![Dynamic::from(id.to_string())])
    }

    fn update_mod(&mut self, record: &ModRecord) -> Result<bool, PluginError> {
        self.call_bool("UpdateMod", vec![record.to_dynamic()])
    }

    fn get_game_mod_directory(&mut self) -> Result<String, PluginError> {
        self.call_string("GetGameModDirectory")
    }

    fn get_game_id(&mut self) -> Result<String, PluginError> {
        self.call_string("GetGameID")
    }
}

impl Drop for ScriptModProvider {
    fn drop(&mut self) {
        self.engine.shutdown();
    }
}

fn unexpected(method: &'static str, expected: &'static str, found: &Dynamic) -> PluginError {
    PluginError::UnexpectedResult {
        method,
        expected,
        found: kind_of(found),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripting::{EngineOptions, ScriptError};
    use uuid::Uuid;

    fn engine_with(script: &str) -> ScriptEngine {
        let mut engine = ScriptEngine::new(Uuid::new_v4(), EngineOptions::default()).unwrap();
        engine.load_script(script).unwrap();
        engine
    }

    fn full_object(skip: Option<&str>) -> String {
        let methods: Vec<String> = REQUIRED_METHODS
            .iter()
            .filter(|m| Some(**m) != skip)
            .map(|m| format!("{m}: || true"))
            .collect();
        format!("let plugin = #{{ {} }};", methods.join(", "))
    }

    #[test]
    fn test_validate_complete_object() {
        let engine = engine_with(&full_object(None));
        validate(&engine, PLUGIN_OBJECT).unwrap();
    }

    #[test]
    fn test_validate_names_each_missing_method() {
        for missing in REQUIRED_METHODS {
            let engine = engine_with(&full_object(Some(missing)));
            match validate(&engine, PLUGIN_OBJECT) {
                Err(PluginError::MissingMethod { method }) => assert_eq!(method, missing),
                other => panic!("expected MissingMethod({missing}), got {other:?}"),
            }
        }
    }

    #[test]
    fn test_validate_reports_first_missing_in_order() {
        let engine = engine_with("let plugin = #{ GetMods: || [] };");
        match validate(&engine, PLUGIN_OBJECT) {
            Err(PluginError::MissingMethod { method }) => assert_eq!(method, "GetModByID"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_validate_non_callable_member() {
        let engine = engine_with(&format!(
            "{} plugin.GetGameID = \"factorio\";",
            full_object(None)
        ));
        match validate(&engine, PLUGIN_OBJECT) {
            Err(PluginError::MissingMethod { method }) => assert_eq!(method, "GetGameID"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_validate_missing_object() {
        let engine = engine_with("let other = 1;");
        assert!(matches!(
            validate(&engine, PLUGIN_OBJECT),
            Err(PluginError::ObjectMissing { .. })
        ));
    }

    #[test]
    fn test_plugin_error_fatality() {
        let err = PluginError::Script(ScriptError::Timeout(Duration::from_secs(1)));
        assert!(err.is_fatal());
        let err = PluginError::MissingMethod {
            method: "GetMods".into(),
        };
        assert!(!err.is_fatal());
    }
}
