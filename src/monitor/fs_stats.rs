//! Disk usage probe: statvfs figures converted to rounded GB.

#![allow(missing_docs)]

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::errors::Result;
use crate::platform::pal::{FsStats, Platform};

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Total/used/free space of one filesystem, in GB rounded to 2 decimals.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DiskUsage {
    pub total_gb: f64,
    pub used_gb: f64,
    pub free_gb: f64,
}

impl DiskUsage {
    /// `used` counts root-reserved blocks as free; `free` is what an
    /// unprivileged writer can still use.
    #[must_use]
    pub fn from_stats(stats: &FsStats) -> Self {
        Self {
            total_gb: bytes_to_gb(stats.total_bytes),
            used_gb: bytes_to_gb(stats.used_bytes()),
            free_gb: bytes_to_gb(stats.available_bytes),
        }
    }
}

/// Convert bytes to GB (1024^3) rounded to two decimal places.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn bytes_to_gb(bytes: u64) -> f64 {
    round2(bytes as f64 / BYTES_PER_GB)
}

#[must_use]
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Reads filesystem statistics through the platform on every call.
#[derive(Clone)]
pub struct DiskUsageProbe {
    platform: Arc<dyn Platform>,
}

impl DiskUsageProbe {
    #[must_use]
    pub fn new(platform: Arc<dyn Platform>) -> Self {
        Self { platform }
    }

    /// Usage of the filesystem holding `path`. Fails with `PathNotFound`
    /// when `path` does not exist.
    pub fn disk_usage(&self, path: &Path) -> Result<DiskUsage> {
        let stats = self.platform.fs_stats(path)?;
        let usage = DiskUsage::from_stats(&stats);
        debug!(
            path = %path.display(),
            total_gb = usage.total_gb,
            used_gb = usage.used_gb,
            free_gb = usage.free_gb,
            "disk usage probed"
        );
        Ok(usage)
    }
}
