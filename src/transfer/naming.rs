//! Destination file names: `{stem}_{dd}_{mm}_{yyyy}.gz`.
//!
//! The stem is the basename up to its first `.`, the date is the file's
//! modification day in local time. Two files of the same server sharing a
//! stem and a modification day map to the same name; the second move
//! overwrites the first.

#![allow(missing_docs)]

use std::path::Path;

use chrono::{DateTime, Datelike, Local, TimeZone};

use crate::core::errors::{MoverError, Result};
use crate::transfer::source::modified_at;

/// Pure naming rule for a basename and modification time.
#[must_use]
pub fn new_name<Tz: TimeZone>(file_name: &str, modified: &DateTime<Tz>) -> String {
    let stem = file_name.split('.').next().unwrap_or(file_name);
    format!(
        "{stem}_{:02}_{:02}_{}.gz",
        modified.day(),
        modified.month(),
        modified.year()
    )
}

/// Destination name for the file at `path`, using its mtime in local time.
pub fn get_new_name(path: &Path) -> Result<String> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| MoverError::Runtime {
            details: format!("{} has no file name", path.display()),
        })?;
    let modified: DateTime<Local> = modified_at(path)?.into();
    Ok(new_name(&file_name, &modified))
}
