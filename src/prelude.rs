//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use cold_backup_mover::prelude::*;
//! ```

// Core
pub use crate::core::config::{Config, DiskConfig};
pub use crate::core::errors::{MoverError, Result};

// Platform
pub use crate::platform::pal::{FsStats, Platform, detect_platform};

// Monitor
pub use crate::monitor::fs_stats::{DiskUsage, DiskUsageProbe};

// Mount
pub use crate::mount::{MountReconciler, MountState};

// Transfer
pub use crate::transfer::{LoopExit, TransferEngine, TransferOutcome, TransferSummary};

// Reporting
pub use crate::notify::{LogNotifier, Notifier, Report, ReportKind};
pub use crate::runner::{RunOutcome, RunReport, run_once};
