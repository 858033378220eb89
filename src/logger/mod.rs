//! Process-wide logging: console (stderr) plus a per-run log file, both fed by `tracing`.
//!
//! [`init`] is the single initialization point for a run. It rotates the
//! previous log away, opens a fresh file and installs the subscriber; the
//! returned [`LogHandle`] names the file attached to the report.

#![allow(missing_docs)]

pub mod rotation;

use std::fs::{self, OpenOptions};
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::core::config::{Config, LogLevel};
use crate::core::errors::{MoverError, Result};

/// Set once a subscriber from this module is installed.
static INSTALLED: AtomicBool = AtomicBool::new(false);

/// Everything [`init`] needs, detached from the full config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub dir: PathBuf,
    pub name: String,
    pub level: LogLevel,
    /// Rotated files kept next to the active one.
    pub count: u32,
    /// Force DEBUG regardless of `level` and `RUST_LOG`.
    pub verbose: bool,
    pub color: bool,
}

impl LogSettings {
    #[must_use]
    pub fn from_config(config: &Config, verbose: bool, color: bool) -> Self {
        Self {
            dir: config.paths.log_dir.clone(),
            name: config.log.name.clone(),
            level: config.log.level,
            count: config.log.count,
            verbose,
            color,
        }
    }

    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.name)
    }

    #[must_use]
    pub fn effective_level(&self) -> LevelFilter {
        if self.verbose {
            LevelFilter::DEBUG
        } else {
            level_filter(self.level)
        }
    }
}

/// The active log file of this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogHandle {
    path: PathBuf,
}

impl LogHandle {
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[must_use]
pub const fn level_filter(level: LogLevel) -> LevelFilter {
    match level {
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Warning => LevelFilter::WARN,
        LogLevel::Error => LevelFilter::ERROR,
    }
}

/// Rotate, open the run log and install console + file output.
///
/// Fails with `Logging` when a subscriber is already installed.
pub fn init(settings: &LogSettings) -> Result<LogHandle> {
    if INSTALLED.load(Ordering::Acquire) {
        return Err(MoverError::Logging {
            details: "logging is already initialized for this process".to_string(),
        });
    }
    fs::create_dir_all(&settings.dir).map_err(|source| MoverError::io(&settings.dir, source))?;
    let path = settings.path();
    rotation::rotate_on_start(&path, settings.count)?;
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&path)
        .map_err(|source| MoverError::io(&path, source))?;

    let level = settings.effective_level();
    let detailed = level == LevelFilter::DEBUG;

    let console = fmt::layer()
        .with_writer(io::stderr)
        .with_ansi(settings.color && io::stderr().is_terminal())
        .with_target(detailed)
        .with_line_number(detailed);
    let log_file = fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(detailed)
        .with_line_number(detailed);

    tracing_subscriber::registry()
        .with(env_filter(level, settings.verbose))
        .with(console)
        .with(log_file)
        .try_init()
        .map_err(|err| MoverError::Logging {
            details: err.to_string(),
        })?;
    INSTALLED.store(true, Ordering::Release);

    Ok(LogHandle { path })
}

/// Console-only output on stderr for commands that must not touch the run log.
pub fn init_console(level: LevelFilter, color: bool) -> Result<()> {
    let console = fmt::layer()
        .with_writer(io::stderr)
        .with_ansi(color && io::stderr().is_terminal())
        .with_target(false);

    tracing_subscriber::registry()
        .with(env_filter(level, false))
        .with(console)
        .try_init()
        .map_err(|err| MoverError::Logging {
            details: err.to_string(),
        })?;
    INSTALLED.store(true, Ordering::Release);
    Ok(())
}

/// `RUST_LOG` wins unless `--verbose` was given; third-party crates stay at WARN.
fn env_filter(level: LevelFilter, verbose: bool) -> EnvFilter {
    let fallback = || EnvFilter::new(format!("warn,cold_backup_mover={level}"));
    if verbose {
        return fallback();
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback())
}

#[cfg(test)]
mod tests {
    use super::{LogSettings, init, level_filter, rotation::rotated_name};
    use crate::core::config::LogLevel;
    use tracing::level_filters::LevelFilter;

    fn settings(dir: &std::path::Path) -> LogSettings {
        LogSettings {
            dir: dir.join("log"),
            name: "mover.log".to_string(),
            level: LogLevel::Info,
            count: 2,
            verbose: false,
            color: false,
        }
    }

    #[test]
    fn levels_map_to_filters() {
        assert_eq!(level_filter(LogLevel::Debug), LevelFilter::DEBUG);
        assert_eq!(level_filter(LogLevel::Warning), LevelFilter::WARN);
        assert_eq!(level_filter(LogLevel::Error), LevelFilter::ERROR);
    }

    #[test]
    fn verbose_forces_debug() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = settings(dir.path());
        assert_eq!(cfg.effective_level(), LevelFilter::INFO);
        cfg.verbose = true;
        assert_eq!(cfg.effective_level(), LevelFilter::DEBUG);
    }

    /// The only test in this crate that installs the global subscriber.
    #[test]
    fn init_rotates_writes_and_refuses_second_install() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = settings(dir.path());
        std::fs::create_dir_all(&cfg.dir).unwrap();
        std::fs::write(cfg.path(), "previous run\n").unwrap();

        let handle = init(&cfg).expect("first init succeeds");
        assert_eq!(handle.path(), cfg.path());
        assert_eq!(
            std::fs::read_to_string(rotated_name(&cfg.path(), 1)).unwrap(),
            "previous run\n"
        );

        tracing::info!("written to the run log");
        let contents = std::fs::read_to_string(handle.path()).unwrap();
        assert!(contents.contains("written to the run log"), "{contents}");

        let err = init(&cfg).expect_err("second init fails");
        assert_eq!(err.code(), "MVR-3002");
        assert!(
            std::fs::read_to_string(handle.path())
                .unwrap()
                .contains("written to the run log"),
            "a refused init must not rotate the active log"
        );
    }
}
