//! Start-of-run log rotation: `name` → `name.1` → … → `name.{keep}`.

#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};

use crate::core::errors::{MoverError, Result};

/// Shift the existing log (if any) into the numbered history, dropping the
/// oldest copy. With `keep == 0` the current log is simply discarded.
///
/// Returns whether a previous log was rotated away.
pub fn rotate_on_start(base: &Path, keep: u32) -> Result<bool> {
    if !base.is_file() {
        return Ok(false);
    }

    if keep == 0 {
        fs::remove_file(base).map_err(|source| MoverError::io(base, source))?;
        return Ok(true);
    }

    let oldest = rotated_name(base, keep);
    if oldest.exists() {
        fs::remove_file(&oldest).map_err(|source| MoverError::io(&oldest, source))?;
    }
    for index in (1..keep).rev() {
        let from = rotated_name(base, index);
        if from.exists() {
            let to = rotated_name(base, index + 1);
            fs::rename(&from, &to).map_err(|source| MoverError::io(&from, source))?;
        }
    }

    let first = rotated_name(base, 1);
    fs::rename(base, &first).map_err(|source| MoverError::io(base, source))?;
    Ok(true)
}

/// Build a rotated filename: `mover.log` → `mover.log.3`.
#[must_use]
pub fn rotated_name(base: &Path, index: u32) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!(".{index}"));
    PathBuf::from(name)
}
