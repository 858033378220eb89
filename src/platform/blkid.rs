//! Structured parser for the `blkid` listing.
//!
//! ```text
//! line  := device ":" { " " KEY "=" '"' value '"' }
//! KEY   := [A-Z_]+
//! ```

#![allow(missing_docs)]

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::errors::{MoverError, Result};

const FIELD_PATTERN: &str = r#"([A-Z_]+)="((?:[^"\\]|\\.)*)""#;

/// Block device metadata reported by the probe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockDevice {
    pub device: String,
    pub uuid: Option<String>,
    pub label: Option<String>,
    pub fs_type: Option<String>,
    pub part_uuid: Option<String>,
}

impl BlockDevice {
    /// Whether the filesystem UUID (not the partition UUID) equals `uuid`.
    #[must_use]
    pub fn has_uuid(&self, uuid: &str) -> bool {
        self.uuid
            .as_deref()
            .is_some_and(|own| own.eq_ignore_ascii_case(uuid))
    }
}

/// Parse a complete `blkid` listing.
pub fn parse_blkid_output(raw: &str) -> Result<Vec<BlockDevice>> {
    let pattern = field_pattern()?;
    let mut devices = Vec::new();

    for line in raw.lines().map(str::trim).filter(|line| !line.is_empty()) {
        let (device, rest) = match line.split_once(": ") {
            Some(split) => split,
            None => match line.strip_suffix(':') {
                Some(device) => (device, ""),
                None => {
                    warn!(line, "skipping malformed blkid line");
                    continue;
                }
            },
        };

        let mut fields: HashMap<&str, String> = pattern
            .captures_iter(rest)
            .filter_map(|caps| {
                let key = caps.get(1)?.as_str();
                let value = caps.get(2)?.as_str().replace("\\\"", "\"");
                Some((key, value))
            })
            .collect();

        devices.push(BlockDevice {
            device: device.to_string(),
            uuid: fields.remove("UUID"),
            label: fields.remove("LABEL"),
            fs_type: fields.remove("TYPE"),
            part_uuid: fields.remove("PARTUUID"),
        });
    }

    Ok(devices)
}

fn field_pattern() -> Result<&'static Regex> {
    static PATTERN: OnceLock<std::result::Result<Regex, regex::Error>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(FIELD_PATTERN))
        .as_ref()
        .map_err(|error| MoverError::DeviceProbe {
            details: format!("invalid blkid field pattern: {error}"),
        })
}
