//! Mount reconciliation for the external disk.
//!
//! The reconciler never trusts a command's exit code as the final word: after
//! every mount or unmount it re-reads the OS view (mount table or mount-point
//! check). Exit codes only decide whether the captured command output is
//! logged for diagnosis.

#![allow(missing_docs)]

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::core::config::DiskConfig;
use crate::core::errors::{MoverError, Result};
use crate::platform::blkid::BlockDevice;
use crate::platform::pal::{CommandOutput, Platform};

/// Where the configured disk currently stands relative to the mount point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MountState {
    /// Nothing from the disk is mounted. `uuid` is `None` when no configured
    /// disk is attached at all.
    Unmounted { uuid: Option<String> },
    MountedCorrectly { uuid: String },
    MountedWrong { uuid: String, path: PathBuf },
}

impl fmt::Display for MountState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unmounted { uuid: None } => write!(f, "no configured disk present"),
            Self::Unmounted { uuid: Some(uuid) } => write!(f, "disk {uuid} present, not mounted"),
            Self::MountedCorrectly { uuid } => write!(f, "disk {uuid} mounted correctly"),
            Self::MountedWrong { uuid, path } => {
                write!(f, "disk {uuid} mounted at wrong path {}", path.display())
            }
        }
    }
}

pub struct MountReconciler {
    platform: Arc<dyn Platform>,
    mount_point: PathBuf,
    uuids: Vec<String>,
    detected: Option<String>,
}

impl MountReconciler {
    #[must_use]
    pub fn new(platform: Arc<dyn Platform>, disk: &DiskConfig) -> Self {
        Self {
            platform,
            mount_point: disk.mount_point.clone(),
            uuids: disk.uuids.clone(),
            detected: None,
        }
    }

    #[must_use]
    pub fn mount_point(&self) -> &Path {
        &self.mount_point
    }

    /// UUID found by the last [`Self::disk_is_present`] call.
    #[must_use]
    pub fn detected_uuid(&self) -> Option<&str> {
        self.detected.as_deref()
    }

    /// Clear a mount left behind at the configured mount point by a previous run.
    ///
    /// A failing forced unmount is logged and tolerated; a successful one that
    /// leaves the mount in place is fatal.
    pub fn check_hanging_mount(&self) -> Result<()> {
        debug!(mount_point = %self.mount_point.display(), "checking for hanging mount");
        if !self.appears_in_mount_table()? {
            info!("no hanging mount found");
            return Ok(());
        }

        warn!(
            mount_point = %self.mount_point.display(),
            "found a previous mount still attached, removing it"
        );
        let result = self.platform.force_unmount(&self.mount_point)?;
        if !result.is_success() {
            error!(
                mount_point = %self.mount_point.display(),
                code = %result.code_label(),
                "could not remove the hanging mount"
            );
            log_diagnostics("umount", &result);
            return Ok(());
        }

        info!("hanging mount removed, verifying again");
        if self.appears_in_mount_table()? {
            error!(
                mount_point = %self.mount_point.display(),
                "mount is still present after forced unmount, aborting"
            );
            return Err(MoverError::HangingMountPersists {
                mount_point: self.mount_point.clone(),
            });
        }
        info!("no hanging mount found");
        Ok(())
    }

    /// First configured UUID (in configuration order) whose disk is attached.
    pub fn disk_is_present(&mut self) -> Result<Option<String>> {
        let devices = self.platform.block_devices()?;
        self.detected = self.first_present(&devices);
        match &self.detected {
            Some(uuid) => info!(uuid = %uuid, "detected disk"),
            None => debug!(uuids = ?self.uuids, "none of the configured disks is attached"),
        }
        Ok(self.detected.clone())
    }

    /// Mount `uuid` at the mount point unless something is already mounted
    /// there. Returns the mount status observed after the attempt.
    pub fn is_mounted(&self, uuid: &str) -> Result<bool> {
        if self.platform.is_mount_point(&self.mount_point)? {
            debug!(mount_point = %self.mount_point.display(), "mount point already mounted");
            return Ok(true);
        }

        info!(
            uuid,
            mount_point = %self.mount_point.display(),
            "disk is not mounted, mounting it"
        );
        let result = self.platform.mount_uuid(uuid, &self.mount_point)?;
        if !result.is_success() {
            error!(uuid, code = %result.code_label(), "could not mount the disk");
            log_diagnostics("mount", &result);
        }

        let mounted = self.platform.is_mount_point(&self.mount_point)?;
        debug!(mounted, "mount status after attempt");
        Ok(mounted)
    }

    /// Move the detected disk from wherever it is mounted to the configured
    /// mount point.
    ///
    /// Returns `Ok(false)` when the disk is not mounted anywhere or cannot be
    /// unmounted from the wrong place. Finding the device mounted exactly at
    /// the configured point is a contradiction and fails with
    /// `UnknownMountState`.
    pub fn handle_wrong_mount_point(&self) -> Result<bool> {
        let Some(uuid) = self.detected.as_deref() else {
            warn!("no detected disk to relocate");
            return Ok(false);
        };
        info!(uuid, "trying to relocate the disk");

        let devices = self.platform.block_devices()?;
        let Some(device) = devices.iter().find(|device| device.has_uuid(uuid)) else {
            warn!(uuid, "disk disappeared from the block device listing");
            return Ok(false);
        };
        debug!(device = %device.device, "resolved partition");

        let wrong_spots: Vec<PathBuf> = self
            .platform
            .mount_table()?
            .into_iter()
            .filter(|entry| entry.source == device.device)
            .map(|entry| entry.target)
            .collect();

        if wrong_spots.is_empty() {
            warn!(device = %device.device, "disk is not mounted anywhere");
            return Ok(false);
        }
        if wrong_spots.iter().any(|spot| spot == &self.mount_point) {
            error!(
                device = %device.device,
                mount_point = %self.mount_point.display(),
                "disk is mounted at the correct point, unknown error"
            );
            return Err(MoverError::UnknownMountState {
                device: device.device.clone(),
                mount_point: self.mount_point.clone(),
            });
        }

        for spot in &wrong_spots {
            warn!(
                uuid,
                expected = %self.mount_point.display(),
                actual = %spot.display(),
                "disk is mounted at the wrong point"
            );
            info!(path = %spot.display(), "unmounting disk");
            let result = self.platform.force_unmount(spot)?;
            if !result.is_success() {
                error!(path = %spot.display(), "could not unmount the disk");
                log_diagnostics("umount", &result);
                return Ok(false);
            }
        }

        let mounted = self.is_mounted(uuid)?;
        if mounted {
            info!(
                uuid,
                mount_point = %self.mount_point.display(),
                "disk is mounted correctly"
            );
        }
        Ok(mounted)
    }

    /// True when a configured disk is attached and ends up mounted at the
    /// configured point, relocating it if needed.
    pub fn can_exec_backup(&mut self) -> Result<bool> {
        let Some(uuid) = self.disk_is_present()? else {
            warn!("no disk detected");
            return Ok(false);
        };

        let start = if self.is_mounted(&uuid)? {
            info!(
                uuid = %uuid,
                mount_point = %self.mount_point.display(),
                "disk is mounted correctly"
            );
            true
        } else {
            warn!("could not mount the disk, trying to fix the mount point");
            self.handle_wrong_mount_point()?
        };
        debug!(start, "can_exec_backup");
        Ok(start)
    }

    /// Force-unmount the mount point. Failure is logged, never raised.
    pub fn unmount(&self) -> bool {
        info!(mount_point = %self.mount_point.display(), "unmounting disk");
        match self.platform.force_unmount(&self.mount_point) {
            Ok(result) if result.is_success() => {
                info!("disk unmounted");
                true
            }
            Ok(result) => {
                warn!(code = %result.code_label(), "the disk was not unmounted");
                log_diagnostics("umount", &result);
                false
            }
            Err(err) => {
                warn!(error = %err, "the disk was not unmounted");
                false
            }
        }
    }

    /// Current mount state derived from the block device listing and mount table.
    pub fn state(&self) -> Result<MountState> {
        let devices = self.platform.block_devices()?;
        let Some(uuid) = self.first_present(&devices) else {
            return Ok(MountState::Unmounted { uuid: None });
        };
        let device = devices
            .iter()
            .find(|device| device.has_uuid(&uuid))
            .map(|device| device.device.clone())
            .unwrap_or_default();

        let targets: Vec<PathBuf> = self
            .platform
            .mount_table()?
            .into_iter()
            .filter(|entry| entry.source == device)
            .map(|entry| entry.target)
            .collect();

        if targets.iter().any(|target| target == &self.mount_point) {
            return Ok(MountState::MountedCorrectly { uuid });
        }
        Ok(match targets.into_iter().next() {
            Some(path) => MountState::MountedWrong { uuid, path },
            None => MountState::Unmounted { uuid: Some(uuid) },
        })
    }

    fn first_present(&self, devices: &[BlockDevice]) -> Option<String> {
        self.uuids
            .iter()
            .find(|uuid| devices.iter().any(|device| device.has_uuid(uuid)))
            .cloned()
    }

    fn appears_in_mount_table(&self) -> Result<bool> {
        Ok(self
            .platform
            .mount_table()?
            .iter()
            .any(|entry| entry.is_mounted_at(&self.mount_point)))
    }
}

fn log_diagnostics(program: &str, result: &CommandOutput) {
    if result.output.is_empty() {
        return;
    }
    for line in result.output.lines() {
        debug!(program, "{line}");
    }
}
