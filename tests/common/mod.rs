#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::time::{Duration, SystemTime};

use cold_backup_mover::core::config::Config;
use cold_backup_mover::core::errors::Result;
use cold_backup_mover::notify::{Notifier, read_attachment};
use filetime::FileTime;
use parking_lot::Mutex;
use tempfile::TempDir;

pub const GB: u64 = 1024 * 1024 * 1024;

/// Scratch backup root plus an (unmounted) target directory.
pub struct Tree {
    pub root: TempDir,
    pub source: PathBuf,
    pub mount: PathBuf,
}

impl Tree {
    pub fn new() -> Self {
        let root = tempfile::tempdir().expect("create temp root");
        let source = root.path().join("backup");
        let mount = root.path().join("media/usb0");
        fs::create_dir_all(&source).expect("create source root");
        fs::create_dir_all(&mount).expect("create mount point");
        Self {
            root,
            source,
            mount,
        }
    }

    /// Sparse file of `gb` GiB in `<server>/month/<name>`, aged `age_days`.
    pub fn backup(&self, server: &str, name: &str, gb: u64, age_days: u64) -> PathBuf {
        let month = self.source.join(server).join("month");
        fs::create_dir_all(&month).expect("create month dir");
        let path = month.join(name);
        fs::File::create(&path)
            .and_then(|file| file.set_len(gb * GB))
            .expect("create sparse backup");
        let modified = SystemTime::now() - Duration::from_secs(age_days * 86_400);
        filetime::set_file_mtime(&path, FileTime::from_system_time(modified))
            .expect("set mtime");
        path
    }

    pub fn config_toml(&self, uuid: &str, threshold_gb: u64) -> String {
        format!(
            r#"[disk]
mount_point = "{mount}/"
uuid = "{uuid}"
threshold = {threshold_gb}

[log]
name = "mover.log"
level = "info"
count = 3

[paths]
source_dir = "{source}"
log_dir = "{log}"

[mail]
enabled = false
"#,
            mount = self.mount.display(),
            source = self.source.display(),
            log = self.log_dir().display(),
        )
    }

    pub fn config(&self, uuid: &str, threshold_gb: u64) -> Config {
        Config::from_toml_str(&self.config_toml(uuid, threshold_gb)).expect("valid config")
    }

    pub fn write_config(&self, uuid: &str, threshold_gb: u64) -> PathBuf {
        let path = self.root.path().join("mover.toml");
        fs::write(&path, self.config_toml(uuid, threshold_gb)).expect("write config");
        path
    }

    pub fn log_dir(&self) -> PathBuf {
        self.root.path().join("log")
    }

    /// Files left under every month folder, sorted.
    pub fn remaining(&self) -> Vec<PathBuf> {
        let mut left: Vec<PathBuf> = walkdir::WalkDir::new(&self.source)
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .map(walkdir::DirEntry::into_path)
            .collect();
        left.sort();
        left
    }
}

/// A report as it reached the notifier.
#[derive(Debug, Clone)]
pub struct Sent {
    pub subject: String,
    pub body: String,
    pub attachment: Option<PathBuf>,
}

/// Notifier that keeps every report in memory.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Sent>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn send(&self, subject: &str, body: &str, attachment: Option<&Path>) -> Result<()> {
        if let Some(path) = attachment {
            read_attachment(path)?;
        }
        self.sent.lock().push(Sent {
            subject: subject.to_string(),
            body: body.to_string(),
            attachment: attachment.map(Path::to_path_buf),
        });
        Ok(())
    }
}

pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

pub fn run_cli(args: &[&str]) -> CmdResult {
    let output = Command::new(env!("CARGO_BIN_EXE_mover"))
        .args(args)
        .env_remove("MOVER_CONFIG")
        .env_remove("MOVER_OUTPUT_FORMAT")
        .env_remove("RUST_LOG")
        .env("RUST_BACKTRACE", "1")
        .output()
        .expect("execute mover command");

    CmdResult {
        status: output.status,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    }
}
