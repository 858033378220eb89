//! MVR-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, MoverError>;

/// Top-level error type for the cold backup mover.
#[derive(Debug, Error)]
pub enum MoverError {
    #[error("[MVR-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[MVR-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[MVR-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[MVR-1004] missing configuration key [{section}] {key}")]
    MissingKey { section: String, key: String },

    #[error("[MVR-1101] unsupported platform: {details}")]
    UnsupportedPlatform { details: String },

    #[error("[MVR-2001] path not found: {path}")]
    PathNotFound { path: PathBuf },

    #[error("[MVR-2002] filesystem stats failure for {path}: {details}")]
    FsStats { path: PathBuf, details: String },

    #[error("[MVR-2003] mount table parse failure: {details}")]
    MountParse { details: String },

    #[error("[MVR-2004] block device probe failure: {details}")]
    DeviceProbe { details: String },

    #[error("[MVR-2101] mount point {mount_point} is still mounted after forced unmount")]
    HangingMountPersists { mount_point: PathBuf },

    #[error(
        "[MVR-2102] device {device} is reported mounted at {mount_point} although the mount was expected to be elsewhere"
    )]
    UnknownMountState { device: String, mount_point: PathBuf },

    #[error("[MVR-2201] could not run {program}: {source}")]
    Command {
        program: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("[MVR-2301] notification failure: {details}")]
    Notification { details: String },

    #[error("[MVR-2302] notification attachment not found: {path}")]
    AttachmentMissing { path: PathBuf },

    #[error("[MVR-2401] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[MVR-3001] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[MVR-3002] logging setup failure: {details}")]
    Logging { details: String },

    #[error("[MVR-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl MoverError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "MVR-1001",
            Self::MissingConfig { .. } => "MVR-1002",
            Self::ConfigParse { .. } => "MVR-1003",
            Self::MissingKey { .. } => "MVR-1004",
            Self::UnsupportedPlatform { .. } => "MVR-1101",
            Self::PathNotFound { .. } => "MVR-2001",
            Self::FsStats { .. } => "MVR-2002",
            Self::MountParse { .. } => "MVR-2003",
            Self::DeviceProbe { .. } => "MVR-2004",
            Self::HangingMountPersists { .. } => "MVR-2101",
            Self::UnknownMountState { .. } => "MVR-2102",
            Self::Command { .. } => "MVR-2201",
            Self::Notification { .. } => "MVR-2301",
            Self::AttachmentMissing { .. } => "MVR-2302",
            Self::Serialization { .. } => "MVR-2401",
            Self::Io { .. } => "MVR-3001",
            Self::Logging { .. } => "MVR-3002",
            Self::Runtime { .. } => "MVR-3900",
        }
    }

    /// Whether the run must stop immediately without sending a report.
    ///
    /// Configuration problems, a mount point that refuses to clear, a
    /// contradictory mount table and a missing report attachment all end the
    /// process on the spot.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig { .. }
                | Self::MissingConfig { .. }
                | Self::ConfigParse { .. }
                | Self::MissingKey { .. }
                | Self::HangingMountPersists { .. }
                | Self::UnknownMountState { .. }
                | Self::AttachmentMissing { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Convenience constructor for a missing configuration key.
    #[must_use]
    pub fn missing_key(section: &str, key: &str) -> Self {
        Self::MissingKey {
            section: section.to_string(),
            key: key.to_string(),
        }
    }
}

impl From<serde_json::Error> for MoverError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for MoverError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
