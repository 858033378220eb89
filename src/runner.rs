//! One complete rotation run: reconcile the mount, transfer, unmount, report.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info};

use crate::core::config::Config;
use crate::core::errors::Result;
use crate::monitor::fs_stats::{DiskUsage, DiskUsageProbe};
use crate::mount::MountReconciler;
use crate::notify::{self, Notifier, Report};
use crate::platform::pal::Platform;
use crate::transfer::{LoopExit, TransferEngine, TransferSummary};

/// How the run ended. All of these are handled outcomes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every month folder was emptied.
    Completed,
    ThresholdReached,
    Stalled { files: Vec<PathBuf> },
    /// No configured disk could be found or mounted.
    NotExecuted,
    /// The disk was mounted but the transfer stopped on an error.
    Aborted { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    #[serde(flatten)]
    pub outcome: RunOutcome,
    pub uuid: Option<String>,
    pub transfers: Option<TransferSummary>,
    /// Disk usage measured right before unmounting.
    pub usage: Option<DiskUsage>,
    pub unmounted: bool,
    pub report: Report,
}

/// Execute one run and deliver its report.
///
/// Fatal errors (a hanging mount that persists, a contradictory mount table,
/// a missing report attachment) are returned without sending anything;
/// everything else ends in a report.
pub fn run_once(
    config: &Config,
    platform: Arc<dyn Platform>,
    notifier: &dyn Notifier,
    attachment: Option<&Path>,
) -> Result<RunReport> {
    info!("======= cold backup copy to external disk =======");

    let mut reconciler = MountReconciler::new(Arc::clone(&platform), &config.disk);
    let ready = match reconciler
        .check_hanging_mount()
        .and_then(|()| reconciler.can_exec_backup())
    {
        Ok(ready) => ready,
        Err(err) if err.is_fatal() => return Err(err),
        Err(err) => {
            error!(error = %err, "mount check failed");
            false
        }
    };

    if !ready {
        error!("the cold backup copy was not executed");
        let report = Report::not_executed();
        notify::deliver(notifier, &report, attachment)?;
        return Ok(RunReport {
            outcome: RunOutcome::NotExecuted,
            uuid: reconciler.detected_uuid().map(str::to_string),
            transfers: None,
            usage: None,
            unmounted: false,
            report,
        });
    }

    let transferred =
        TransferEngine::new(Arc::clone(&platform), &config.disk, &config.paths.source_dir)
            .and_then(|mut engine| engine.run());
    let final_usage = DiskUsageProbe::new(platform).disk_usage(&config.disk.mount_point);
    let unmounted = reconciler.unmount();

    let (outcome, transfers, usage, report) = match (transferred, final_usage) {
        (Ok(summary), Ok(usage)) => {
            let (outcome, report) = match &summary.exit {
                LoopExit::Exhausted => (RunOutcome::Completed, Report::completed(&usage)),
                LoopExit::ThresholdReached => {
                    (RunOutcome::ThresholdReached, Report::threshold_reached(&usage))
                }
                LoopExit::Stalled { files } => (
                    RunOutcome::Stalled {
                        files: files.clone(),
                    },
                    Report::stalled(&usage, files),
                ),
            };
            (outcome, Some(summary), Some(usage), report)
        }
        (Ok(summary), Err(err)) => {
            error!(error = %err, "could not measure the disk after the transfer");
            let report = Report::aborted(&err);
            (
                RunOutcome::Aborted {
                    error: err.to_string(),
                },
                Some(summary),
                None,
                report,
            )
        }
        (Err(err), usage) => {
            error!(error = %err, "transfer stopped on an error");
            let report = Report::aborted(&err);
            (
                RunOutcome::Aborted {
                    error: err.to_string(),
                },
                None,
                usage.ok(),
                report,
            )
        }
    };

    notify::deliver(notifier, &report, attachment)?;
    Ok(RunReport {
        outcome,
        uuid: reconciler.detected_uuid().map(str::to_string),
        transfers,
        usage,
        unmounted,
        report,
    })
}
