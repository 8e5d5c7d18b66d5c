use std::fs;
use std::path::{Path, PathBuf};
use serde_json::Value;
use log::warn;
use crate::engine::persistence::load_record;
use crate::engine::ScanPolicy;
use crate::{Result, Error};

/// Checks that a collection, resource id or node name is a single plain
/// path component, so it can never address anything outside its parent.
pub(crate) fn require(value: &str, what: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::InvalidArgument(format!("missing {}", what)));
    }
    if value == "." || value == ".." || value.contains(|c: char| c == '/' || c == '\\' || c == '\0') {
        return Err(Error::InvalidArgument(format!("invalid {} {:?}", what, value)));
    }
    Ok(())
}

pub(crate) fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension().and_then(|s| s.to_str()) == Some(ext)
}

/// File name of `path` without its extension.
pub(crate) fn stem(path: &Path) -> Option<String> {
    path.file_stem().and_then(|s| s.to_str()).map(str::to_string)
}

pub(crate) fn dir_name(path: &Path) -> Option<String> {
    path.file_name().and_then(|s| s.to_str()).map(str::to_string)
}

/// Locates the file for `id` inside `dir`, accepting ids given with or
/// without the record extension.
pub(crate) fn resolve_record(dir: &Path, id: &str, ext: &str) -> Option<PathBuf> {
    let literal = dir.join(id);
    if literal.is_file() {
        return Some(literal);
    }
    let with_ext = dir.join(format!("{}.{}", id, ext));
    if with_ext.is_file() {
        return Some(with_ext);
    }
    None
}

/// Record files directly inside `dir`, sorted by name.
pub(crate) fn record_files(dir: &Path, ext: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && has_extension(&path, ext) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Every record file below `dir`, depth first, sorted within each directory.
pub(crate) fn walk_records(dir: &Path, ext: &str, out: &mut Vec<PathBuf>) -> Result<()> {
    let mut entries = fs::read_dir(dir)?
        .map(|e| e.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort();

    for path in entries {
        if path.is_dir() {
            walk_records(&path, ext, out)?;
        } else if has_extension(&path, ext) {
            out.push(path);
        }
    }
    Ok(())
}

/// Loads a record under `policy`: `Ok(None)` means it was skipped.
pub(crate) fn load_with_policy(path: &Path, policy: ScanPolicy) -> Result<Option<Value>> {
    match load_record(path) {
        Ok(v) => Ok(Some(v)),
        Err(e) if policy == ScanPolicy::Skip => {
            warn!("Skipping unreadable record {:?}: {}", path, e);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
