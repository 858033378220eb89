//! PAL trait and the Linux implementation backed by mount/umount/blkid/mv and statvfs.

#![allow(missing_docs)]

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::errors::{MoverError, Result};
use crate::platform::blkid::{BlockDevice, parse_blkid_output};
use crate::platform::mount_table::{MountEntry, parse_mount_output};

/// Filesystem statistics for a path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FsStats {
    pub path: PathBuf,
    pub total_bytes: u64,
    /// Free blocks including those reserved for root.
    pub free_bytes: u64,
    /// Free blocks usable by unprivileged writers.
    pub available_bytes: u64,
}

impl FsStats {
    #[must_use]
    pub const fn used_bytes(&self) -> u64 {
        self.total_bytes.saturating_sub(self.free_bytes)
    }
}

/// Exit status plus combined stdout/stderr of an external command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub output: String,
}

impl CommandOutput {
    #[must_use]
    pub fn success() -> Self {
        Self {
            code: Some(0),
            output: String::new(),
        }
    }

    #[must_use]
    pub fn failure(code: i32, output: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            output: output.into(),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }

    /// Exit code rendered for log lines.
    #[must_use]
    pub fn code_label(&self) -> String {
        self.code
            .map_or_else(|| "signal".to_string(), |code| code.to_string())
    }
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        Self {
            code: output.status.code(),
            output: combined.trim_end().to_string(),
        }
    }
}

/// OS capabilities the reconciler and transfer engine depend on.
///
/// `Err` means the capability could not be exercised at all (e.g. the binary
/// could not be spawned); a command that ran and failed is reported through
/// [`CommandOutput`].
pub trait Platform: Send + Sync {
    fn mount_table(&self) -> Result<Vec<MountEntry>>;
    fn is_mount_point(&self, path: &Path) -> Result<bool>;
    fn mount_uuid(&self, uuid: &str, target: &Path) -> Result<CommandOutput>;
    fn force_unmount(&self, target: &Path) -> Result<CommandOutput>;
    fn block_devices(&self) -> Result<Vec<BlockDevice>>;
    fn move_file(&self, source: &Path, dest: &Path) -> Result<CommandOutput>;
    fn fs_stats(&self, path: &Path) -> Result<FsStats>;
}

const MOUNT_BIN: &str = "/bin/mount";
const UMOUNT_BIN: &str = "/bin/umount";
const BLKID_BIN: &str = "/sbin/blkid";
const MV_BIN: &str = "/bin/mv";

/// blkid exits with 2 when no device matched, which is an empty listing for us.
const BLKID_NOTHING_FOUND: i32 = 2;

/// Linux platform implementation using util-linux binaries + `statvfs`.
#[derive(Debug, Default)]
pub struct LinuxPlatform;

impl LinuxPlatform {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[cfg(unix)]
impl Platform for LinuxPlatform {
    fn mount_table(&self) -> Result<Vec<MountEntry>> {
        mount_listing(&run_command(MOUNT_BIN, &[])?)
    }

    fn is_mount_point(&self, path: &Path) -> Result<bool> {
        use std::os::unix::fs::MetadataExt;

        let Ok(meta) = std::fs::symlink_metadata(path) else {
            return Ok(false);
        };
        if !meta.is_dir() {
            return Ok(false);
        }
        let parent_path = path.join("..");
        let parent =
            std::fs::metadata(&parent_path).map_err(|source| MoverError::io(&parent_path, source))?;
        Ok(meta.dev() != parent.dev() || meta.ino() == parent.ino())
    }

    fn mount_uuid(&self, uuid: &str, target: &Path) -> Result<CommandOutput> {
        run_command(
            MOUNT_BIN,
            &[OsStr::new("-U"), OsStr::new(uuid), target.as_os_str()],
        )
    }

    fn force_unmount(&self, target: &Path) -> Result<CommandOutput> {
        run_command(UMOUNT_BIN, &[OsStr::new("-l"), target.as_os_str()])
    }

    fn block_devices(&self) -> Result<Vec<BlockDevice>> {
        blkid_listing(&run_command(BLKID_BIN, &[])?)
    }

    fn move_file(&self, source: &Path, dest: &Path) -> Result<CommandOutput> {
        run_command(MV_BIN, &[source.as_os_str(), dest.as_os_str()])
    }

    fn fs_stats(&self, path: &Path) -> Result<FsStats> {
        if !path.exists() {
            return Err(MoverError::PathNotFound {
                path: path.to_path_buf(),
            });
        }
        let stat = nix::sys::statvfs::statvfs(path).map_err(|error| MoverError::FsStats {
            path: path.to_path_buf(),
            details: error.to_string(),
        })?;
        let fragment = stat.fragment_size();
        Ok(FsStats {
            path: path.to_path_buf(),
            total_bytes: stat.blocks().saturating_mul(fragment),
            free_bytes: stat.blocks_free().saturating_mul(fragment),
            available_bytes: stat.blocks_available().saturating_mul(fragment),
        })
    }
}

/// Mount table from a finished `mount` run; a nonzero exit is `MountParse`.
fn mount_listing(result: &CommandOutput) -> Result<Vec<MountEntry>> {
    if !result.is_success() {
        return Err(MoverError::MountParse {
            details: format!(
                "{MOUNT_BIN} exited with {}: {}",
                result.code_label(),
                result.output
            ),
        });
    }
    Ok(parse_mount_output(&result.output))
}

/// Block devices from a finished `blkid` run.
fn blkid_listing(result: &CommandOutput) -> Result<Vec<BlockDevice>> {
    match result.code {
        Some(0) => parse_blkid_output(&result.output),
        Some(BLKID_NOTHING_FOUND) => Ok(Vec::new()),
        _ => Err(MoverError::DeviceProbe {
            details: format!(
                "{BLKID_BIN} exited with {}: {}",
                result.code_label(),
                result.output
            ),
        }),
    }
}

/// Detect active platform implementation.
pub fn detect_platform() -> Result<Arc<dyn Platform>> {
    #[cfg(target_os = "linux")]
    {
        Ok(Arc::new(LinuxPlatform::new()))
    }
    #[cfg(not(target_os = "linux"))]
    {
        Err(MoverError::UnsupportedPlatform {
            details: "only Linux is currently implemented".to_string(),
        })
    }
}

#[cfg(unix)]
fn run_command(program: &'static str, args: &[&OsStr]) -> Result<CommandOutput> {
    debug!(program, ?args, "running command");
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|source| MoverError::Command { program, source })?;
    let result = CommandOutput::from(output);
    debug!(program, code = %result.code_label(), "command finished");
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::{CommandOutput, FsStats, LinuxPlatform, Platform, blkid_listing, mount_listing};
    use std::path::{Path, PathBuf};

    #[test]
    fn used_bytes_is_total_minus_free() {
        let stats = FsStats {
            path: PathBuf::from("/mnt/cold"),
            total_bytes: 1_000,
            free_bytes: 300,
            available_bytes: 250,
        };
        assert_eq!(stats.used_bytes(), 700);
    }

    #[test]
    fn command_output_classification() {
        assert!(CommandOutput::success().is_success());
        let failed = CommandOutput::failure(32, "umount: /mnt/cold: not mounted.");
        assert!(!failed.is_success());
        assert_eq!(failed.code_label(), "32");
        let killed = CommandOutput {
            code: None,
            output: String::new(),
        };
        assert_eq!(killed.code_label(), "signal");
    }

    #[test]
    fn blkid_nothing_found_is_an_empty_listing() {
        let devices = blkid_listing(&CommandOutput::failure(2, "")).expect("exit 2 is empty");
        assert!(devices.is_empty());

        let found = blkid_listing(&CommandOutput {
            code: Some(0),
            output: r#"/dev/sdb1: UUID="5E2A-11F0" TYPE="exfat""#.to_string(),
        })
        .unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].has_uuid("5E2A-11F0"));

        let err = blkid_listing(&CommandOutput::failure(4, "blkid: usage")).expect_err("exit 4");
        assert_eq!(err.code(), "MVR-2004");
    }

    #[test]
    fn failed_mount_listing_is_a_parse_error() {
        let err = mount_listing(&CommandOutput::failure(1, "mount: permission denied"))
            .expect_err("nonzero exit");
        assert_eq!(err.code(), "MVR-2003");
        assert!(err.to_string().contains("permission denied"), "{err}");

        let entries = mount_listing(&CommandOutput {
            code: Some(0),
            output: "/dev/sdb1 on /mnt/cold type ext4 (rw)".to_string(),
        })
        .unwrap();
        assert!(entries[0].is_mounted_at(Path::new("/mnt/cold")));
    }

    #[cfg(unix)]
    #[test]
    fn combined_output_keeps_stdout_then_stderr() {
        use std::os::unix::process::ExitStatusExt;
        let output = std::process::Output {
            status: std::process::ExitStatus::from_raw(1 << 8),
            stdout: b"out\n".to_vec(),
            stderr: b"err\n".to_vec(),
        };
        let result = CommandOutput::from(output);
        assert_eq!(result.code, Some(1));
        assert_eq!(result.output, "out\nerr");
    }

    #[cfg(unix)]
    #[test]
    fn fs_stats_reports_missing_path() {
        let err = LinuxPlatform::new()
            .fs_stats(Path::new("/nonexistent/mover/mount"))
            .expect_err("missing path");
        assert_eq!(err.code(), "MVR-2001");
    }

    #[cfg(unix)]
    #[test]
    fn fs_stats_reads_real_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let stats = LinuxPlatform::new().fs_stats(dir.path()).expect("statvfs");
        assert!(stats.total_bytes > 0);
        assert!(stats.available_bytes <= stats.total_bytes);
    }

    #[cfg(unix)]
    #[test]
    fn root_is_a_mount_point_and_plain_dirs_are_not() {
        let platform = LinuxPlatform::new();
        assert!(platform.is_mount_point(Path::new("/")).unwrap());
        let dir = tempfile::tempdir().unwrap();
        let child = dir.path().join("plain");
        std::fs::create_dir(&child).unwrap();
        assert!(!platform.is_mount_point(&child).unwrap());
        assert!(!platform.is_mount_point(&dir.path().join("absent")).unwrap());
    }
}
