//! Run reports: subject/body formatting and the delivery channels.
//!
//! Every channel reads the attachment before doing anything else; a missing
//! attachment is `AttachmentMissing`, which aborts the process.

#![allow(missing_docs)]

#[cfg(feature = "mail")]
pub mod smtp;

use std::fmt::{self, Write as _};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use crate::core::config::Config;
use crate::core::errors::{MoverError, Result};
use crate::monitor::fs_stats::DiskUsage;

const SUBJECT_SUFFIX: &str = "Cold Backup";

/// Severity tag placed in front of the subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
    Success,
    Warning,
    Error,
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "SUCCESS"),
            Self::Warning => write!(f, "WARNING"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// A formatted report ready to hand to a [`Notifier`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub kind: ReportKind,
    pub subject: String,
    pub body: String,
}

impl Report {
    fn new(kind: ReportKind, body: String) -> Self {
        Self {
            kind,
            subject: format!("[{kind}] {SUBJECT_SUFFIX}"),
            body,
        }
    }

    /// Every month folder was emptied.
    #[must_use]
    pub fn completed(usage: &DiskUsage) -> Self {
        Self::new(
            ReportKind::Success,
            format!(
                "Cold backups were copied to the external disk successfully!\n{}",
                usage_footer(usage)
            ),
        )
    }

    /// Free space fell below the threshold.
    #[must_use]
    pub fn threshold_reached(usage: &DiskUsage) -> Self {
        Self::new(
            ReportKind::Warning,
            format!(
                "Free space on the disk is below the critical threshold!\n{}",
                usage_footer(usage)
            ),
        )
    }

    /// A whole pass moved nothing; `files` are still in their month folders.
    #[must_use]
    pub fn stalled(usage: &DiskUsage, files: &[PathBuf]) -> Self {
        let mut body = String::from("Some cold backups could not be moved to the external disk:\n");
        for file in files {
            let _ = writeln!(body, "  - {}", file.display());
        }
        body.push_str(&usage_footer(usage));
        Self::new(ReportKind::Warning, body)
    }

    /// The disk could not be found or mounted.
    #[must_use]
    pub fn not_executed() -> Self {
        Self::new(
            ReportKind::Error,
            "The cold backup copy was not executed, see the log for more information".to_string(),
        )
    }

    /// The disk was mounted but the transfer could not run to an end.
    #[must_use]
    pub fn aborted(error: &MoverError) -> Self {
        Self::new(
            ReportKind::Error,
            format!(
                "The cold backup copy stopped after the disk was mounted: {error}\n\
                 See the log for more information"
            ),
        )
    }
}

fn usage_footer(usage: &DiskUsage) -> String {
    format!(
        "Free space left: {:.2} GB\nUsed space: {:.2} GB\nSee the log for more information",
        usage.free_gb, usage.used_gb
    )
}

/// Delivery channel for run reports.
pub trait Notifier: Send + Sync {
    fn send(&self, subject: &str, body: &str, attachment: Option<&Path>) -> Result<()>;

    fn send_report(&self, report: &Report, attachment: Option<&Path>) -> Result<()> {
        self.send(&report.subject, &report.body, attachment)
    }
}

/// Read an attachment, mapping a missing file to `AttachmentMissing`.
pub fn read_attachment(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            MoverError::AttachmentMissing {
                path: path.to_path_buf(),
            }
        } else {
            MoverError::io(path, source)
        }
    })
}

/// Writes the report to the log instead of mailing it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, subject: &str, body: &str, attachment: Option<&Path>) -> Result<()> {
        let attached = attachment.map(read_attachment).transpose()?;
        info!(
            subject,
            attachment_bytes = attached.as_ref().map_or(0, Vec::len),
            "report (mail disabled)"
        );
        for line in body.lines() {
            info!("  {line}");
        }
        Ok(())
    }
}

/// Channel selected by `[mail] enabled`.
pub fn from_config(config: &Config) -> Result<Box<dyn Notifier>> {
    if !config.mail.enabled {
        return Ok(Box::new(LogNotifier));
    }
    #[cfg(feature = "mail")]
    {
        Ok(Box::new(smtp::SmtpNotifier::new(&config.mail, &config.log.name)?))
    }
    #[cfg(not(feature = "mail"))]
    {
        warn!("mail support is not compiled in, reports go to the log");
        Ok(Box::new(LogNotifier))
    }
}

/// Send `report`, logging delivery failures other than a missing attachment.
pub fn deliver(notifier: &dyn Notifier, report: &Report, attachment: Option<&Path>) -> Result<()> {
    match notifier.send_report(report, attachment) {
        Ok(()) => Ok(()),
        Err(err) if err.is_fatal() => Err(err),
        Err(err) => {
            warn!(error = %err, subject = %report.subject, "report could not be delivered");
            Ok(())
        }
    }
}
