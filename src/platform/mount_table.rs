//! Structured parser for the `mount` listing.
//!
//! Grammar of one listing line:
//!
//! ```text
//! line    := source " on " target " type " fstype " (" options ")"
//! options := option { "," option }
//! ```
//!
//! `source` ends at the first `" on "` and `fstype` starts after the last
//! `" type "`, so a target containing either token still parses. `mount`
//! prints targets already decoded, so the target is taken verbatim.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

/// One row of the active mount table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MountEntry {
    /// Device or pseudo-source (`/dev/sdb1`, `tmpfs`, ...).
    pub source: String,
    /// Directory the source is mounted on.
    pub target: PathBuf,
    pub fs_type: String,
    pub options: Vec<String>,
}

impl MountEntry {
    /// Whether this row mounts something at `path`.
    #[must_use]
    pub fn is_mounted_at(&self, path: &Path) -> bool {
        self.target == path
    }
}

/// Parse a complete `mount` listing, skipping lines that do not match the grammar.
pub fn parse_mount_output(raw: &str) -> Vec<MountEntry> {
    let mut entries = Vec::new();
    for line in raw.lines().map(str::trim).filter(|line| !line.is_empty()) {
        match parse_mount_line(line) {
            Some(entry) => entries.push(entry),
            None => warn!(line, "skipping malformed mount table line"),
        }
    }
    entries
}

/// Parse a single listing line.
pub fn parse_mount_line(line: &str) -> Option<MountEntry> {
    let (source, rest) = line.trim().split_once(" on ")?;
    let (target, tail) = rest.rsplit_once(" type ")?;
    let (fs_type, options) = tail.split_once(" (")?;
    let options = options.strip_suffix(')')?;

    if source.is_empty() || target.is_empty() || fs_type.is_empty() {
        return None;
    }

    Some(MountEntry {
        source: source.to_string(),
        target: PathBuf::from(target),
        fs_type: fs_type.to_string(),
        options: options
            .split(',')
            .filter(|option| !option.is_empty())
            .map(str::to_string)
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::{parse_mount_line, parse_mount_output};
    use std::path::Path;

    #[test]
    fn parses_util_linux_listing() {
        let sample = "/dev/sda1 on / type ext4 (rw,relatime,errors=remount-ro)\n\
                      tmpfs on /run type tmpfs (rw,nosuid,nodev,size=1638400k,mode=755)\n\
                      /dev/sdb1 on /mnt/cold type ext4 (rw,relatime)\n";
        let entries = parse_mount_output(sample);
        assert_eq!(entries.len(), 3);

        let cold = &entries[2];
        assert_eq!(cold.source, "/dev/sdb1");
        assert_eq!(cold.target, Path::new("/mnt/cold"));
        assert_eq!(cold.fs_type, "ext4");
        assert_eq!(cold.options, vec!["rw", "relatime"]);
        assert!(cold.is_mounted_at(Path::new("/mnt/cold")));
        assert!(!cold.is_mounted_at(Path::new("/mnt/cold/sub")));
    }

    #[test]
    fn target_containing_keywords_still_parses() {
        let entry = parse_mount_line("/dev/sdc1 on /srv/on call type stuff type xfs (rw)")
            .expect("line should parse");
        assert_eq!(entry.source, "/dev/sdc1");
        assert_eq!(entry.target, Path::new("/srv/on call type stuff"));
        assert_eq!(entry.fs_type, "xfs");
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let sample = "garbage line\n\
                      /dev/sdb1 on /mnt/cold type ext4\n\
                      \n\
                      /dev/sdb1 on /mnt/cold type ext4 (rw)\n";
        let entries = parse_mount_output(sample);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].target, Path::new("/mnt/cold"));
    }

    #[test]
    fn empty_option_list_is_allowed() {
        let entry = parse_mount_line("none on /sys/fs/bpf type bpf ()").expect("should parse");
        assert!(entry.options.is_empty());
    }

    #[test]
    fn target_with_spaces_is_kept() {
        let entry = parse_mount_line("/dev/sdd1 on /media/cold disk type vfat (rw)")
            .expect("should parse");
        assert_eq!(entry.target, Path::new("/media/cold disk"));
    }

    #[test]
    fn backslash_digits_in_target_are_literal() {
        let entries = parse_mount_output(
            "/dev/sdb1 on /mnt/cold type ext4 (rw)\n\
             /dev/sdc1 on /srv/x\\777 type ext4 (rw)\n\
             /dev/sdd1 on /srv/a\\040b type ext4 (rw)\n",
        );
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1].target, Path::new("/srv/x\\777"));
        assert!(entries[2].is_mounted_at(Path::new("/srv/a\\040b")));
        assert!(!entries[2].is_mounted_at(Path::new("/srv/a b")));
    }
}
