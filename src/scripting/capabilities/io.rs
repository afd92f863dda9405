// src/scripting/capabilities/io.rs — `io::*` read-only filesystem and zip access

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rhai::{Array, Dynamic, ImmutableString, Map, Module};

use super::{caller_error, CapResult, CapabilityContext};
use crate::infra::files::{self, ArchiveFiles};
use crate::scripting::marshal::{as_string, kind_of};

/// Where a plugin's own files live.
#[derive(Debug, Clone)]
pub enum PluginRoot {
    Directory(PathBuf),
    Archive(Arc<ArchiveFiles>),
}

impl PluginRoot {
    /// Read a file addressed relative to the plugin root. `Ok(None)` when absent.
    pub fn read(&self, relative: &str) -> Result<Option<Vec<u8>>, String> {
        match self {
            PluginRoot::Directory(root) => {
                let path = files::safe_join(root, relative)
                    .ok_or_else(|| format!("path escapes the plugin root: {relative}"))?;
                match std::fs::read(&path) {
                    Ok(bytes) => Ok(Some(bytes)),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                    Err(e) => Err(format!("failed to read {}: {e}", path.display())),
                }
            }
            PluginRoot::Archive(entries) => Ok(entries.get(relative).cloned()),
        }
    }
}

fn text(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

fn patterns_from(value: &Dynamic) -> Result<Vec<String>, String> {
    if let Some(single) = as_string(value) {
        return Ok(vec![single]);
    }
    if value.is_array() {
        let items = value.clone().cast::<Array>();
        return items
            .iter()
            .map(|item| {
                as_string(item)
                    .ok_or_else(|| format!("pattern must be a string, got {}", kind_of(item)))
            })
            .collect();
    }
    Err(format!(
        "patterns must be a string or an array of strings, got {}",
        kind_of(value)
    ))
}

fn read_from_zip(zip: &str, name: &str, use_regex: bool) -> CapResult<Dynamic> {
    match files::read_file_from_zip(Path::new(zip), name, use_regex) {
        Ok(Some((_, bytes))) => Ok(Dynamic::from(text(bytes))),
        Ok(None) => Ok(Dynamic::UNIT),
        Err(e) => Err(caller_error("io::read_file_from_zip", e)),
    }
}

pub fn module(ctx: &CapabilityContext) -> Module {
    let mut module = Module::new();

    module.set_native_fn("read_file", |path: ImmutableString| -> CapResult<Dynamic> {
        if path.is_empty() {
            return Ok(Dynamic::UNIT);
        }
        std::fs::read(path.as_str())
            .map(|bytes| Dynamic::from(text(bytes)))
            .map_err(|e| caller_error("io::read_file", format!("{path}: {e}")))
    });

    module.set_native_fn("file_name", |path: ImmutableString| -> CapResult<String> {
        Ok(Path::new(path.as_str())
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default())
    });

    // Regex matching unless told otherwise.
    module.set_native_fn(
        "read_file_from_zip",
        |zip: ImmutableString, name: ImmutableString| -> CapResult<Dynamic> {
            read_from_zip(&zip, &name, true)
        },
    );

    module.set_native_fn(
        "read_file_from_zip",
        |zip: ImmutableString, name: ImmutableString, use_regex: bool| -> CapResult<Dynamic> {
            read_from_zip(&zip, &name, use_regex)
        },
    );

    module.set_native_fn("read_files_from_zip", |zip: ImmutableString| -> CapResult<Map> {
        let entries = files::read_archive(Path::new(zip.as_str()))
            .map_err(|e| caller_error("io::read_files_from_zip", e))?;
        let mut map = Map::new();
        for (name, bytes) in entries {
            map.insert(name.into(), Dynamic::from(text(bytes)));
        }
        Ok(map)
    });

    module.set_native_fn(
        "files_in_directory",
        |dir: ImmutableString, patterns: Dynamic| -> CapResult<Array> {
            let patterns =
                patterns_from(&patterns).map_err(|e| caller_error("io::files_in_directory", e))?;
            let found = files::files_in_directory(Path::new(dir.as_str()), &patterns)
                .map_err(|e| caller_error("io::files_in_directory", e))?;
            Ok(found
                .into_iter()
                .map(|p| Dynamic::from(p.to_string_lossy().into_owned()))
                .collect())
        },
    );

    let root = ctx.root.clone();
    module.set_native_fn(
        "read_plugin_file",
        move |path: ImmutableString| -> CapResult<Dynamic> {
            let root = root
                .as_ref()
                .ok_or_else(|| caller_error("io::read_plugin_file", "engine has no plugin root"))?;
            match root.read(&path) {
                Ok(Some(bytes)) => Ok(Dynamic::from(text(bytes))),
                Ok(None) => Ok(Dynamic::UNIT),
                Err(e) => Err(caller_error("io::read_plugin_file", e)),
            }
        },
    );

    module
}
