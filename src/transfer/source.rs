//! Source entries (server directories with a `month` folder) and the file
//! queries run against them.

#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use glob::{MatchOptions, Pattern};
use serde::Serialize;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::core::errors::{MoverError, Result};
use crate::monitor::fs_stats::bytes_to_gb;

/// Name of the per-server folder holding files awaiting archival.
pub const MONTH_DIR: &str = "month";

/// A directory under the backup root that owns a `month` folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceEntry {
    pub path: PathBuf,
    /// Basename of `path`; names the destination folder on the disk.
    pub server_name: String,
}

impl SourceEntry {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        let server_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self { path, server_name }
    }

    #[must_use]
    pub fn month_dir(&self) -> PathBuf {
        self.path.join(MONTH_DIR)
    }
}

/// Walk `root` (name-sorted) and return every directory that has a `month`
/// child directory. `month` folders themselves are not descended into.
pub fn discover_sources(root: &Path) -> Result<Vec<SourceEntry>> {
    if !root.is_dir() {
        return Err(MoverError::PathNotFound {
            path: root.to_path_buf(),
        });
    }

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || entry.file_name() != MONTH_DIR);

    let mut sources = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(error = %err, "skipping unreadable entry in source tree");
                continue;
            }
        };
        if entry.file_type().is_dir() && entry.path().join(MONTH_DIR).is_dir() {
            debug!(path = %entry.path().display(), "found source entry");
            sources.push(SourceEntry::new(entry.into_path()));
        }
    }
    Ok(sources)
}

/// Regular, non-hidden files directly inside the entry's `month` folder,
/// sorted by name.
pub fn get_file_list(entry: &SourceEntry) -> Result<Vec<PathBuf>> {
    let pattern = format!("{}/*", Pattern::escape(&entry.month_dir().to_string_lossy()));
    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: true,
    };
    let matches = glob::glob_with(&pattern, options).map_err(|err| MoverError::Runtime {
        details: format!("invalid month folder pattern {pattern:?}: {err}"),
    })?;

    let mut files: Vec<PathBuf> = matches
        .filter_map(|found| match found {
            Ok(path) => Some(path),
            Err(err) => {
                warn!(error = %err, "skipping unreadable month folder entry");
                None
            }
        })
        .filter(|path| path.is_file())
        .collect();
    files.sort();
    Ok(files)
}

/// Last modification time of `path`.
pub fn modified_at(path: &Path) -> Result<SystemTime> {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .map_err(|source| MoverError::io(path, source))
}

/// The item with the smallest timestamp; the first one wins on ties.
pub fn pick_oldest<T>(items: impl IntoIterator<Item = (T, SystemTime)>) -> Option<(T, SystemTime)> {
    items.into_iter().min_by_key(|(_, modified)| *modified)
}

/// Oldest file of a non-empty list. An empty list is an error.
pub fn get_oldest_file(files: &[PathBuf]) -> Result<PathBuf> {
    let stamped = files
        .iter()
        .map(|path| modified_at(path).map(|modified| (path, modified)))
        .collect::<Result<Vec<_>>>()?;
    pick_oldest(stamped)
        .map(|(path, _)| path.clone())
        .ok_or_else(|| MoverError::Runtime {
            details: "cannot pick the oldest file of an empty list".to_string(),
        })
}

/// Size of `file` in GB, rounded to two decimals.
pub fn get_size(file: &Path) -> Result<f64> {
    let meta = fs::metadata(file).map_err(|source| MoverError::io(file, source))?;
    Ok(bytes_to_gb(meta.len()))
}
