//! Space-bounded transfer loop.
//!
//! Each outer pass starts with a threshold check against the cached free
//! space. Within a pass the engine repeatedly takes, for every source entry
//! with files left, its oldest file not yet skipped in this pass, and moves the
//! globally oldest of those if it is strictly smaller than the cached free
//! space. Files that do not fit or fail to move are skipped for the rest of
//! the pass. A pass that moves nothing ends the run as stalled, so every
//! continuing pass makes progress and the loop terminates.

#![allow(missing_docs)]

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::core::config::DiskConfig;
use crate::core::errors::Result;
use crate::monitor::fs_stats::{DiskUsage, DiskUsageProbe, round2};
use crate::platform::pal::Platform;
use crate::transfer::naming::new_name;
use crate::transfer::source::{
    SourceEntry, discover_sources, get_file_list, get_size, modified_at, pick_oldest,
};

/// What happened to one selected file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferOutcome {
    Moved,
    /// Not strictly smaller than the cached free space.
    NoSpace,
    /// The move command exited nonzero.
    Failed,
}

/// One move decision. Only logged and summarized, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferRecord {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub size_gb: f64,
    pub outcome: TransferOutcome,
}

/// Why the loop stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum LoopExit {
    /// Every month folder is empty.
    Exhausted,
    /// Free space dropped below the threshold at the start of a pass.
    ThresholdReached,
    /// A whole pass moved nothing; `files` could not be moved.
    Stalled { files: Vec<PathBuf> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferSummary {
    pub exit: LoopExit,
    pub passes: usize,
    pub records: Vec<TransferRecord>,
    /// Last free-space reading held by the engine.
    pub free_gb: f64,
}

impl TransferSummary {
    #[must_use]
    pub fn moved(&self) -> impl Iterator<Item = &TransferRecord> {
        self.records
            .iter()
            .filter(|record| record.outcome == TransferOutcome::Moved)
    }

    #[must_use]
    pub fn moved_count(&self) -> usize {
        self.moved().count()
    }

    #[must_use]
    pub fn moved_gb(&self) -> f64 {
        round2(self.moved().map(|record| record.size_gb).sum())
    }
}

/// Whether a pass may start with `free_gb` left and a `threshold_gb` floor.
#[must_use]
pub fn threshold_holds(free_gb: f64, threshold_gb: f64) -> bool {
    free_gb >= threshold_gb
}

/// The oldest eligible file of one source entry.
#[derive(Debug, Clone)]
struct Candidate {
    entry: SourceEntry,
    file: PathBuf,
    modified: SystemTime,
}

pub struct TransferEngine {
    platform: Arc<dyn Platform>,
    probe: DiskUsageProbe,
    mount_point: PathBuf,
    threshold_gb: f64,
    sources: Vec<SourceEntry>,
    usage: DiskUsage,
}

impl TransferEngine {
    /// Discover source entries under `source_dir` and read the disk's free
    /// space once.
    pub fn new(platform: Arc<dyn Platform>, disk: &DiskConfig, source_dir: &Path) -> Result<Self> {
        let sources = discover_sources(source_dir)?;
        let probe = DiskUsageProbe::new(Arc::clone(&platform));
        let usage = probe.disk_usage(&disk.mount_point)?;
        info!(
            sources = sources.len(),
            free_gb = usage.free_gb,
            threshold_gb = disk.threshold_gb,
            "transfer engine ready"
        );
        Ok(Self {
            platform,
            probe,
            mount_point: disk.mount_point.clone(),
            threshold_gb: disk.threshold_gb,
            sources,
            usage,
        })
    }

    #[must_use]
    pub fn sources(&self) -> &[SourceEntry] {
        &self.sources
    }

    /// Cached free space in GB.
    #[must_use]
    pub const fn free_gb(&self) -> f64 {
        self.usage.free_gb
    }

    /// True while the cached free space is at or above the threshold.
    pub fn check_threshold(&self) -> bool {
        if threshold_holds(self.usage.free_gb, self.threshold_gb) {
            return true;
        }
        warn!(
            free_gb = self.usage.free_gb,
            threshold_gb = self.threshold_gb,
            "free space is below the critical threshold"
        );
        false
    }

    /// Source entries whose month folder currently holds at least one file.
    pub fn check_month_folder(&self) -> Result<Vec<SourceEntry>> {
        let mut busy = Vec::new();
        for entry in &self.sources {
            if !get_file_list(entry)?.is_empty() {
                busy.push(entry.clone());
            }
        }
        Ok(busy)
    }

    /// Move `source` to `dest`, creating the destination folder first.
    ///
    /// Returns `Ok(false)` when the folder cannot be created or the move
    /// command fails; its captured output is logged.
    pub fn move_file(&self, source: &Path, dest: &Path) -> Result<bool> {
        let name = display_name(source);
        if let Some(parent) = dest.parent() {
            if let Err(err) = fs::create_dir_all(parent) {
                error!(
                    dir = %parent.display(),
                    error = %err,
                    "could not create destination folder"
                );
                return Ok(false);
            }
        }

        info!(file = %name, "starting move");
        let result = self.platform.move_file(source, dest)?;
        if result.is_success() {
            info!(file = %name, dest = %dest.display(), "move completed");
            return Ok(true);
        }
        error!(file = %name, code = %result.code_label(), "something went wrong moving the file");
        if !result.output.is_empty() {
            error!(output = %result.output, "move command output");
        }
        Ok(false)
    }

    /// Run passes until the month folders are empty, the threshold is
    /// breached, or a pass makes no progress.
    pub fn run(&mut self) -> Result<TransferSummary> {
        let mut records = Vec::new();
        let mut passes = 0;

        let exit = loop {
            if !self.check_threshold() {
                break LoopExit::ThresholdReached;
            }
            passes += 1;
            debug!(pass = passes, free_gb = self.usage.free_gb, "starting pass");

            let mut skipped: HashSet<PathBuf> = HashSet::new();
            let mut moved_in_pass = 0_usize;
            while let Some(candidate) = self.next_candidate(&skipped)? {
                let record = self.transfer(&candidate)?;
                if record.outcome == TransferOutcome::Moved {
                    moved_in_pass += 1;
                } else {
                    skipped.insert(record.source.clone());
                }
                records.push(record);
            }

            if self.check_month_folder()?.is_empty() {
                info!("all month folders are empty");
                break LoopExit::Exhausted;
            }
            if moved_in_pass == 0 {
                let mut files: Vec<PathBuf> = skipped.into_iter().collect();
                files.sort();
                warn!(
                    files = files.len(),
                    "no file could be moved in a whole pass, stopping"
                );
                break LoopExit::Stalled { files };
            }
        };

        Ok(TransferSummary {
            exit,
            passes,
            records,
            free_gb: self.usage.free_gb,
        })
    }

    fn next_candidate(&self, skipped: &HashSet<PathBuf>) -> Result<Option<Candidate>> {
        let mut candidates = Vec::new();
        for entry in self.check_month_folder()? {
            let mut stamped = Vec::new();
            for file in get_file_list(&entry)? {
                if skipped.contains(&file) {
                    continue;
                }
                let modified = modified_at(&file)?;
                stamped.push((file, modified));
            }
            if let Some((file, modified)) = pick_oldest(stamped) {
                candidates.push((
                    Candidate {
                        entry,
                        file,
                        modified,
                    },
                    modified,
                ));
            }
        }
        Ok(pick_oldest(candidates).map(|(candidate, _)| candidate))
    }

    fn transfer(&mut self, candidate: &Candidate) -> Result<TransferRecord> {
        let source = &candidate.file;
        let size_gb = get_size(source)?;
        let modified: DateTime<Local> = candidate.modified.into();
        let destination = self
            .mount_point
            .join(&candidate.entry.server_name)
            .join(new_name(&display_name(source), &modified));

        if size_gb >= self.usage.free_gb {
            warn!(
                file = %display_name(source),
                size_gb,
                free_gb = self.usage.free_gb,
                "not enough space to move file"
            );
            return Ok(record(candidate, destination, size_gb, TransferOutcome::NoSpace));
        }

        if destination.exists() {
            warn!(
                dest = %destination.display(),
                "destination already exists and will be overwritten"
            );
        }

        if !self.move_file(source, &destination)? {
            return Ok(record(candidate, destination, size_gb, TransferOutcome::Failed));
        }

        self.usage = self.probe.disk_usage(&self.mount_point)?;
        info!(free_gb = self.usage.free_gb, "space left");
        Ok(record(candidate, destination, size_gb, TransferOutcome::Moved))
    }
}

fn record(
    candidate: &Candidate,
    destination: PathBuf,
    size_gb: f64,
    outcome: TransferOutcome,
) -> TransferRecord {
    TransferRecord {
        source: candidate.file.clone(),
        destination,
        size_gb,
        outcome,
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
