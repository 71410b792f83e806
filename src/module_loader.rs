//! Modül yükleyici: `import("x.ry")` arama yolları ve dizin importu.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use thiserror::Error;

pub const SOURCE_EXT: &str = "ry";

#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ModuleError(pub String);

/// Relative to the host working directory, plus one platform system path.
fn search_paths() -> Vec<PathBuf> {
    let mut paths = vec![
        PathBuf::from("."),
        PathBuf::from("./modules"),
        PathBuf::from("./modules/library"),
    ];
    if cfg!(windows) {
        paths.push(PathBuf::from("C:/ryl/modules"));
    } else {
        paths.push(PathBuf::from("/usr/lib/ryl/"));
    }
    paths
}

pub fn find_module_path(name: &str, want_dir: bool) -> Option<PathBuf> {
    for base in search_paths() {
        let candidate = base.join(name);
        debug!("module lookup: {}", candidate.display());
        if want_dir && candidate.is_dir() {
            return Some(candidate);
        }
        if !want_dir && candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

/// Locates a module by name through the search path and reads its source.
pub fn load_module(name: &str) -> Result<String, ModuleError> {
    let path = find_module_path(name, false)
        .ok_or_else(|| ModuleError(format!("Module '{}' not found.", name)))?;
    debug!("loading module {}", path.display());
    read_source(&path)
}

/// Every `.ry` file of a directory, in path order, for `import("dir/*")`.
pub fn load_directory(folder: &str) -> Result<Vec<(PathBuf, String)>, ModuleError> {
    let dir = find_module_path(folder, true)
        .ok_or_else(|| ModuleError(format!("Directory '{}' not found for wildcard import.", folder)))?;

    let entries = fs::read_dir(&dir)
        .map_err(|e| ModuleError(format!("Could not read directory '{}': {}", dir.display(), e)))?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some(SOURCE_EXT))
        .collect();
    files.sort();

    let mut out = Vec::with_capacity(files.len());
    for path in files {
        let source = read_source(&path)?;
        out.push((path, source));
    }
    Ok(out)
}

fn read_source(path: &Path) -> Result<String, ModuleError> {
    fs::read_to_string(path)
        .map_err(|e| ModuleError(format!("Could not read module '{}': {}", path.display(), e)))
}
