//! In-memory [`Platform`] fake for deterministic tests.
//!
//! Mount and device state live in memory; `move_file` renames real files so the
//! transfer engine can be exercised against a temporary directory tree, and
//! debits the destination's free space by the moved size.

#![allow(missing_docs)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::core::errors::{MoverError, Result};
use crate::platform::blkid::BlockDevice;
use crate::platform::mount_table::MountEntry;
use crate::platform::pal::{CommandOutput, FsStats, Platform};

#[derive(Debug, Default)]
struct MockState {
    devices: Vec<BlockDevice>,
    mounts: Vec<MountEntry>,
    stats: HashMap<PathBuf, FsStats>,
    sticky_mounts: HashSet<PathBuf>,
    failing_unmounts: HashSet<PathBuf>,
    failing_mount: bool,
    failing_moves: HashSet<PathBuf>,
    post_move_free: VecDeque<u64>,
    calls: Vec<String>,
}

/// Scriptable platform fake. Builder methods consume and return `self`.
#[derive(Debug, Default)]
pub struct MockPlatform {
    state: Mutex<MockState>,
}

impl MockPlatform {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a block device carrying filesystem `uuid`.
    #[must_use]
    pub fn with_device(self, device: &str, uuid: &str) -> Self {
        self.state.lock().devices.push(BlockDevice {
            device: device.to_string(),
            uuid: Some(uuid.to_string()),
            label: None,
            fs_type: Some("ext4".to_string()),
            part_uuid: None,
        });
        self
    }

    /// Mark `source` as mounted on `target`.
    #[must_use]
    pub fn with_mount(self, source: &str, target: impl AsRef<Path>) -> Self {
        self.state.lock().mounts.push(mock_entry(source, target.as_ref()));
        self
    }

    /// Filesystem statistics reported for paths under `mount`.
    #[must_use]
    pub fn with_stats(self, mount: impl AsRef<Path>, total_bytes: u64, free_bytes: u64) -> Self {
        let mount = mount.as_ref().to_path_buf();
        self.state.lock().stats.insert(
            mount.clone(),
            FsStats {
                path: mount,
                total_bytes,
                free_bytes,
                available_bytes: free_bytes,
            },
        );
        self
    }

    /// `force_unmount(target)` reports success but the mount stays in the table.
    #[must_use]
    pub fn with_sticky_mount(self, target: impl AsRef<Path>) -> Self {
        self.state
            .lock()
            .sticky_mounts
            .insert(target.as_ref().to_path_buf());
        self
    }

    /// `force_unmount(target)` exits nonzero and changes nothing.
    #[must_use]
    pub fn with_failing_unmount(self, target: impl AsRef<Path>) -> Self {
        self.state
            .lock()
            .failing_unmounts
            .insert(target.as_ref().to_path_buf());
        self
    }

    /// Every `mount_uuid` call exits nonzero.
    #[must_use]
    pub fn with_failing_mount(self) -> Self {
        self.state.lock().failing_mount = true;
        self
    }

    /// Moving `source` exits nonzero and leaves the file in place.
    #[must_use]
    pub fn with_failing_move(self, source: impl AsRef<Path>) -> Self {
        self.state
            .lock()
            .failing_moves
            .insert(source.as_ref().to_path_buf());
        self
    }

    /// Free-space readings applied after each successful move instead of
    /// debiting the moved size, simulating concurrent writers on the disk.
    #[must_use]
    pub fn with_post_move_free(self, readings: Vec<u64>) -> Self {
        self.state.lock().post_move_free = readings.into();
        self
    }

    /// Journal of state-changing calls (`mount`, `umount`, `mv`).
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    pub fn mounts(&self) -> Vec<MountEntry> {
        self.state.lock().mounts.clone()
    }

    pub fn free_bytes(&self, mount: impl AsRef<Path>) -> Option<u64> {
        self.state
            .lock()
            .stats
            .get(mount.as_ref())
            .map(|stats| stats.available_bytes)
    }
}

impl Platform for MockPlatform {
    fn mount_table(&self) -> Result<Vec<MountEntry>> {
        Ok(self.state.lock().mounts.clone())
    }

    fn is_mount_point(&self, path: &Path) -> Result<bool> {
        Ok(self
            .state
            .lock()
            .mounts
            .iter()
            .any(|entry| entry.is_mounted_at(path)))
    }

    fn mount_uuid(&self, uuid: &str, target: &Path) -> Result<CommandOutput> {
        let mut state = self.state.lock();
        state
            .calls
            .push(format!("mount -U {uuid} {}", target.display()));

        if state.failing_mount {
            return Ok(CommandOutput::failure(32, "mount: mock failure"));
        }
        let Some(device) = state
            .devices
            .iter()
            .find(|device| device.has_uuid(uuid))
            .map(|device| device.device.clone())
        else {
            return Ok(CommandOutput::failure(
                1,
                format!("mount: can't find UUID={uuid}"),
            ));
        };
        if let Some(existing) = state.mounts.iter().find(|entry| entry.source == device) {
            return Ok(CommandOutput::failure(
                32,
                format!(
                    "mount: {}: {device} already mounted on {}.",
                    target.display(),
                    existing.target.display()
                ),
            ));
        }
        state.mounts.push(mock_entry(&device, target));
        Ok(CommandOutput::success())
    }

    fn force_unmount(&self, target: &Path) -> Result<CommandOutput> {
        let mut state = self.state.lock();
        state.calls.push(format!("umount -l {}", target.display()));

        if state.failing_unmounts.contains(target) {
            return Ok(CommandOutput::failure(
                32,
                format!("umount: {}: target is busy.", target.display()),
            ));
        }
        if !state.mounts.iter().any(|entry| entry.is_mounted_at(target)) {
            return Ok(CommandOutput::failure(
                32,
                format!("umount: {}: not mounted.", target.display()),
            ));
        }
        if !state.sticky_mounts.contains(target) {
            state.mounts.retain(|entry| !entry.is_mounted_at(target));
        }
        Ok(CommandOutput::success())
    }

    fn block_devices(&self) -> Result<Vec<BlockDevice>> {
        Ok(self.state.lock().devices.clone())
    }

    fn move_file(&self, source: &Path, dest: &Path) -> Result<CommandOutput> {
        let mut state = self.state.lock();
        state
            .calls
            .push(format!("mv {} {}", source.display(), dest.display()));

        if state.failing_moves.contains(source) {
            return Ok(CommandOutput::failure(
                1,
                format!(
                    "mv: cannot move '{}' to '{}': Input/output error",
                    source.display(),
                    dest.display()
                ),
            ));
        }

        let size = fs::metadata(source).map(|meta| meta.len()).unwrap_or(0);
        if let Err(error) = fs::rename(source, dest) {
            return Ok(CommandOutput::failure(
                1,
                format!("mv: cannot move '{}': {error}", source.display()),
            ));
        }

        let scripted = state.post_move_free.pop_front();
        if let Some(stats) = longest_prefix_mut(&mut state.stats, dest) {
            let free = scripted.unwrap_or_else(|| stats.available_bytes.saturating_sub(size));
            stats.free_bytes = free;
            stats.available_bytes = free;
        }
        Ok(CommandOutput::success())
    }

    fn fs_stats(&self, path: &Path) -> Result<FsStats> {
        if !path.exists() {
            return Err(MoverError::PathNotFound {
                path: path.to_path_buf(),
            });
        }
        let mut state = self.state.lock();
        longest_prefix_mut(&mut state.stats, path)
            .map(|stats| stats.clone())
            .ok_or_else(|| MoverError::FsStats {
                path: path.to_path_buf(),
                details: "mock stats not found".to_string(),
            })
    }
}

fn mock_entry(source: &str, target: &Path) -> MountEntry {
    MountEntry {
        source: source.to_string(),
        target: target.to_path_buf(),
        fs_type: "ext4".to_string(),
        options: vec!["rw".to_string(), "relatime".to_string()],
    }
}

fn longest_prefix_mut<'a>(
    stats: &'a mut HashMap<PathBuf, FsStats>,
    path: &Path,
) -> Option<&'a mut FsStats> {
    stats
        .iter_mut()
        .filter(|(mount, _)| path.starts_with(mount))
        .max_by_key(|(mount, _)| mount.as_os_str().len())
        .map(|(_, stats)| stats)
}
