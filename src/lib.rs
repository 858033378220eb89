#![forbid(unsafe_code)]

//! Cold Backup Mover: rotates month backups onto an external disk.
//!
//! One run identifies the disk by filesystem UUID, reconciles its mount
//! point, moves the oldest backup files across every source folder until the
//! free space on the disk reaches the configured threshold, unmounts it and
//! reports the outcome.
//!
//! # Library usage
//!
//! ```rust,no_run
//! use cold_backup_mover::prelude::*;
//!
//! # fn main() -> cold_backup_mover::prelude::Result<()> {
//! let config = Config::load(None)?;
//! let report = run_once(&config, detect_platform()?, &LogNotifier, None)?;
//! println!("{}", report.report.subject);
//! # Ok(())
//! # }
//! ```

pub mod prelude;

pub mod core;
pub mod logger;
pub mod monitor;
pub mod mount;
pub mod notify;
pub mod platform;
pub mod runner;
pub mod transfer;
