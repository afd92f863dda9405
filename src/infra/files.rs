// src/infra/files.rs — Filesystem and zip helpers shared by the loader and the io capability

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Glob pattern that matches files without an extension.
pub const NO_EXTENSION_PATTERN: &str = "*?";

/// Largest buffer reserved up front from an entry's declared size. The
/// header is untrusted; bigger entries grow while they are read.
const MAX_PREALLOCATION: u64 = 1024 * 1024;

/// In-memory file table of a zip archive, keyed by the entry's path.
pub type ArchiveFiles = BTreeMap<String, Vec<u8>>;

#[derive(Error, Debug)]
pub enum FilesError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Invalid glob pattern '{pattern}': {message}")]
    Pattern { pattern: String, message: String },

    #[error("Invalid regular expression: {0}")]
    Regex(#[from] regex::Error),
}

/// Write `bytes` to a hidden temp file next to `path`, then rename it into
/// place. On failure the temp file is removed and `path` is left untouched.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name"))?;
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));

    let written = (|| -> std::io::Result<()> {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        std::fs::rename(&tmp, path)
    })();
    if written.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    written
}

/// Read every file entry of an archive into memory. Directory entries are skipped.
pub fn read_archive(path: &Path) -> Result<ArchiveFiles, FilesError> {
    let file = File::open(path)?;
    read_archive_from(file)
}

pub fn read_archive_from<R: Read + Seek>(reader: R) -> Result<ArchiveFiles, FilesError> {
    let mut archive = zip::ZipArchive::new(reader)?;
    let mut files = ArchiveFiles::new();

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if entry.is_dir() {
            continue;
        }
        let mut content = Vec::with_capacity(preallocation(entry.size()));
        entry.read_to_end(&mut content)?;
        files.insert(entry.name().to_string(), content);
    }

    Ok(files)
}

fn preallocation(declared: u64) -> usize {
    usize::try_from(declared.min(MAX_PREALLOCATION)).unwrap_or(0)
}

/// Find one file in an archive, either by exact entry name or by the first
/// entry whose name matches `name` as a regular expression.
pub fn read_file_from_zip(
    path: &Path,
    name: &str,
    use_regex: bool,
) -> Result<Option<(String, Vec<u8>)>, FilesError> {
    let file = File::open(path)?;
    let mut archive = zip::ZipArchive::new(file)?;

    let matcher = if use_regex {
        Some(regex::Regex::new(name)?)
    } else {
        None
    };

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if entry.is_dir() {
            continue;
        }
        let matched = match &matcher {
            Some(re) => re.is_match(entry.name()),
            None => entry.name() == name,
        };
        if matched {
            let entry_name = entry.name().to_string();
            let mut content = Vec::new();
            entry.read_to_end(&mut content)?;
            return Ok(Some((entry_name, content)));
        }
    }

    Ok(None)
}

/// Recursively list files under `dir` whose file name matches any of `patterns`.
///
/// The special pattern `*?` matches files with no extension. Results are sorted.
pub fn files_in_directory(dir: &Path, patterns: &[String]) -> Result<Vec<PathBuf>, FilesError> {
    let mut compiled = Vec::new();
    let mut no_extension = false;
    for pattern in patterns {
        if pattern == NO_EXTENSION_PATTERN {
            no_extension = true;
            continue;
        }
        let glob = glob::Pattern::new(pattern).map_err(|e| FilesError::Pattern {
            pattern: pattern.clone(),
            message: e.msg.to_string(),
        })?;
        compiled.push(glob);
    }

    let mut found = Vec::new();
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        for entry in std::fs::read_dir(&current)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                pending.push(path);
                continue;
            }

            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let matches_no_ext = no_extension && path.extension().is_none();
            if matches_no_ext || compiled.iter().any(|p| p.matches(name)) {
                found.push(path);
            }
        }
    }

    found.sort();
    Ok(found)
}

/// Resolve `relative` under `root`, refusing absolute paths and `..` components.
pub fn safe_join(root: &Path, relative: &str) -> Option<PathBuf> {
    let candidate = Path::new(relative);
    if relative.is_empty() || candidate.is_absolute() {
        return None;
    }
    let escapes = candidate.components().any(|c| {
        matches!(
            c,
            std::path::Component::ParentDir
                | std::path::Component::RootDir
                | std::path::Component::Prefix(_)
        )
    });
    if escapes {
        None
    } else {
        Some(root.join(candidate))
    }
}
