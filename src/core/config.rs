//! Configuration system: TOML key/value file + env var overrides + typed views.
//!
//! The file is kept as a raw key/value table so lookups can be done by
//! `(section, key)` the way operators write the file, and a typed view is
//! derived once at load time for the components that need numbers and paths.

#![allow(missing_docs)]

use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::errors::{MoverError, Result};

/// Fallback config location when neither `--config` nor `MOVER_CONFIG` is given.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/cold-backup-mover/mover.toml";

/// Keys that can be overridden through `MOVER_<SECTION>_<KEY>` variables.
const OVERRIDABLE_KEYS: &[(&str, &str)] = &[
    ("disk", "mount_point"),
    ("disk", "uuid"),
    ("disk", "threshold"),
    ("log", "name"),
    ("log", "level"),
    ("log", "count"),
    ("paths", "source_dir"),
    ("paths", "log_dir"),
    ("mail", "enabled"),
    ("mail", "from_name"),
    ("mail", "sender"),
    ("mail", "receiver"),
    ("mail", "smtp_host"),
    ("mail", "smtp_port"),
];

/// Effective configuration for one run. Never mutated after load.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    table: toml::Table,
    pub origin: Option<PathBuf>,
    pub disk: DiskConfig,
    pub log: LogConfig,
    pub paths: PathsConfig,
    pub mail: MailConfig,
}

/// External disk settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiskConfig {
    /// Mount point with any trailing separator stripped.
    pub mount_point: PathBuf,
    /// Accepted filesystem UUIDs in priority order.
    pub uuids: Vec<String>,
    /// Minimum free space in GB required to start a transfer pass.
    pub threshold_gb: f64,
}

/// Log file settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogConfig {
    pub name: String,
    pub level: LogLevel,
    /// Number of rotated log files kept next to the active one.
    pub count: u32,
}

/// Source tree and log directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PathsConfig {
    pub source_dir: PathBuf,
    pub log_dir: PathBuf,
}

/// Report mail settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MailConfig {
    pub enabled: bool,
    pub from_name: String,
    pub sender: String,
    pub receivers: Vec<String>,
    pub smtp_host: String,
    pub smtp_port: u16,
}

/// Verbosity accepted in `[log] level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl FromStr for LogLevel {
    type Err = MoverError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warning" | "warn" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            other => Err(MoverError::InvalidConfig {
                details: format!(
                    "log.level must be one of debug, info, warning, error; got {other:?}"
                ),
            }),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let source_dir = PathBuf::from("/srv/backup");
        Self {
            log_dir: source_dir.join("log"),
            source_dir,
        }
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            from_name: "Cold Backup".to_string(),
            sender: "backup@localhost".to_string(),
            receivers: vec!["root@localhost".to_string()],
            smtp_host: "localhost".to_string(),
            smtp_port: 25,
        }
    }
}

impl Config {
    /// Config path from `MOVER_CONFIG`, falling back to [`DEFAULT_CONFIG_PATH`].
    #[must_use]
    pub fn default_path() -> PathBuf {
        env_var("MOVER_CONFIG").map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from)
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Every required key lives in the file, so a missing file is always an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        if !path_buf.exists() {
            return Err(MoverError::MissingConfig { path: path_buf });
        }
        let raw =
            fs::read_to_string(&path_buf).map_err(|source| MoverError::io(&path_buf, source))?;
        let mut table: toml::Table = toml::from_str(&raw)?;
        apply_env_overrides_from(&mut table, env_var);
        let mut cfg = Self::from_table(table)?;
        cfg.origin = Some(path_buf);
        Ok(cfg)
    }

    /// Parse a config document without consulting the environment.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let table: toml::Table = toml::from_str(raw)?;
        Self::from_table(table)
    }

    /// Derive and validate the typed view from a raw key/value table.
    pub fn from_table(table: toml::Table) -> Result<Self> {
        let mut cfg = Self {
            table,
            origin: None,
            disk: DiskConfig {
                mount_point: PathBuf::new(),
                uuids: Vec::new(),
                threshold_gb: 0.0,
            },
            log: LogConfig {
                name: String::new(),
                level: LogLevel::Info,
                count: 0,
            },
            paths: PathsConfig::default(),
            mail: MailConfig::default(),
        };

        cfg.disk = DiskConfig {
            mount_point: PathBuf::from(cfg.get_mount_path()?),
            uuids: cfg.get_as_list("disk", "uuid")?,
            threshold_gb: parse_value("disk", "threshold", &cfg.get("disk", "threshold")?)?,
        };
        cfg.log = LogConfig {
            name: cfg.get("log", "name")?,
            level: cfg.get("log", "level")?.parse()?,
            count: parse_value("log", "count", &cfg.get("log", "count")?)?,
        };
        cfg.paths = cfg.derive_paths();
        cfg.mail = cfg.derive_mail()?;

        cfg.validate()?;
        Ok(cfg)
    }

    /// Raw string value of `[section] key`.
    pub fn get(&self, section: &str, key: &str) -> Result<String> {
        self.lookup(section, key)
            .map(value_to_string)
            .ok_or_else(|| MoverError::missing_key(section, key))
    }

    /// Comma-separated value split into trimmed items (arrays are accepted too).
    pub fn get_as_list(&self, section: &str, key: &str) -> Result<Vec<String>> {
        let raw = self.get(section, key)?;
        Ok(raw.split(',').map(|item| item.trim().to_string()).collect())
    }

    /// `[disk] mount_point` with trailing separators stripped (the root stays `/`).
    pub fn get_mount_path(&self) -> Result<String> {
        let raw = self.get("disk", "mount_point")?;
        let trimmed = raw.trim();
        let stripped = trimmed.trim_end_matches('/');
        if stripped.is_empty() && trimmed.starts_with('/') {
            return Ok("/".to_string());
        }
        Ok(stripped.to_string())
    }

    /// Whether `[section] key` is present. Never fails.
    #[must_use]
    pub fn exists(&self, section: &str, key: &str) -> bool {
        self.lookup(section, key).is_some()
    }

    /// Full path of the active log file.
    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.paths.log_dir.join(&self.log.name)
    }

    fn lookup(&self, section: &str, key: &str) -> Option<&toml::Value> {
        self.table
            .get(section)
            .and_then(toml::Value::as_table)
            .and_then(|entries| entries.get(key))
    }

    fn derive_paths(&self) -> PathsConfig {
        let defaults = PathsConfig::default();
        let source_dir = self
            .get("paths", "source_dir")
            .map_or(defaults.source_dir, PathBuf::from);
        let log_dir = self
            .get("paths", "log_dir")
            .map_or_else(|_| source_dir.join("log"), PathBuf::from);
        PathsConfig {
            source_dir,
            log_dir,
        }
    }

    fn derive_mail(&self) -> Result<MailConfig> {
        let defaults = MailConfig::default();
        let optional = |key: &str| self.get("mail", key).ok();
        Ok(MailConfig {
            enabled: optional("enabled")
                .map(|raw| parse_value("mail", "enabled", &raw))
                .transpose()?
                .unwrap_or(defaults.enabled),
            from_name: optional("from_name").unwrap_or(defaults.from_name),
            sender: optional("sender").unwrap_or(defaults.sender),
            receivers: if self.exists("mail", "receiver") {
                self.get_as_list("mail", "receiver")?
            } else {
                defaults.receivers
            },
            smtp_host: optional("smtp_host").unwrap_or(defaults.smtp_host),
            smtp_port: optional("smtp_port")
                .map(|raw| parse_value("mail", "smtp_port", &raw))
                .transpose()?
                .unwrap_or(defaults.smtp_port),
        })
    }

    fn validate(&self) -> Result<()> {
        if !self.disk.mount_point.is_absolute() {
            return Err(MoverError::InvalidConfig {
                details: format!(
                    "disk.mount_point must be an absolute path, got {}",
                    self.disk.mount_point.display()
                ),
            });
        }

        if self.disk.uuids.iter().any(String::is_empty) {
            return Err(MoverError::InvalidConfig {
                details: "disk.uuid must list at least one UUID and no blank entries".to_string(),
            });
        }

        if !self.disk.threshold_gb.is_finite() || self.disk.threshold_gb < 0.0 {
            return Err(MoverError::InvalidConfig {
                details: format!(
                    "disk.threshold must be a non-negative number of GB, got {}",
                    self.disk.threshold_gb
                ),
            });
        }

        if self.log.name.trim().is_empty() {
            return Err(MoverError::InvalidConfig {
                details: "log.name must not be empty".to_string(),
            });
        }

        if self.mail.enabled {
            if self.mail.smtp_host.trim().is_empty() || self.mail.smtp_port == 0 {
                return Err(MoverError::InvalidConfig {
                    details: "mail.smtp_host and mail.smtp_port must be set when mail is enabled"
                        .to_string(),
                });
            }
            if self.mail.receivers.iter().all(String::is_empty) {
                return Err(MoverError::InvalidConfig {
                    details: "mail.receiver must name at least one address".to_string(),
                });
            }
        }

        Ok(())
    }
}

/// Apply `MOVER_<SECTION>_<KEY>` overrides on the raw table.
fn apply_env_overrides_from<F>(table: &mut toml::Table, mut lookup: F)
where
    F: FnMut(&str) -> Option<String>,
{
    for (section, key) in OVERRIDABLE_KEYS {
        let name = format!(
            "MOVER_{}_{}",
            section.to_ascii_uppercase(),
            key.to_ascii_uppercase()
        );
        let Some(raw) = lookup(&name) else {
            continue;
        };
        let entry = table
            .entry((*section).to_string())
            .or_insert_with(|| toml::Value::Table(toml::Table::new()));
        if !entry.is_table() {
            *entry = toml::Value::Table(toml::Table::new());
        }
        if let Some(entries) = entry.as_table_mut() {
            entries.insert((*key).to_string(), toml::Value::String(raw));
        }
    }
}

fn value_to_string(value: &toml::Value) -> String {
    match value {
        toml::Value::String(raw) => raw.clone(),
        toml::Value::Array(items) => items
            .iter()
            .map(value_to_string)
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

fn parse_value<T>(section: &str, key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|error| MoverError::InvalidConfig {
            details: format!("{section}.{key}={raw:?}: {error}"),
        })
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::{Config, LogLevel, MoverError, apply_env_overrides_from};
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};

    const SAMPLE: &str = r#"
[disk]
mount_point = "/mnt/cold/"
uuid = "1111-AAAA, 2222-BBBB ,3333-CCCC"
threshold = 50

[log]
name = "mover.log"
level = "debug"
count = 5
"#;

    #[test]
    fn sample_config_loads() {
        let cfg = Config::from_toml_str(SAMPLE).expect("sample config should load");
        assert_eq!(cfg.disk.mount_point, PathBuf::from("/mnt/cold"));
        assert_eq!(cfg.disk.uuids, vec!["1111-AAAA", "2222-BBBB", "3333-CCCC"]);
        assert!((cfg.disk.threshold_gb - 50.0).abs() < f64::EPSILON);
        assert_eq!(cfg.log.level, LogLevel::Debug);
        assert_eq!(cfg.log.count, 5);
        assert_eq!(cfg.paths.source_dir, PathBuf::from("/srv/backup"));
        assert_eq!(cfg.paths.log_dir, PathBuf::from("/srv/backup/log"));
        assert_eq!(cfg.log_path(), PathBuf::from("/srv/backup/log/mover.log"));
    }

    #[test]
    fn get_stringifies_scalars() {
        let cfg = Config::from_toml_str(SAMPLE).unwrap();
        assert_eq!(cfg.get("disk", "threshold").unwrap(), "50");
        assert_eq!(cfg.get("log", "name").unwrap(), "mover.log");
    }

    #[test]
    fn get_missing_key_fails_with_missing_key() {
        let cfg = Config::from_toml_str(SAMPLE).unwrap();
        let err = cfg.get("disk", "label").expect_err("missing key");
        assert!(matches!(err, MoverError::MissingKey { .. }));
        let err = cfg.get("nosuch", "key").expect_err("missing section");
        assert!(matches!(err, MoverError::MissingKey { .. }));
    }

    #[test]
    fn exists_never_fails() {
        let cfg = Config::from_toml_str(SAMPLE).unwrap();
        assert!(cfg.exists("disk", "uuid"));
        assert!(!cfg.exists("disk", "label"));
        assert!(!cfg.exists("nosuch", "uuid"));
    }

    #[test]
    fn get_as_list_accepts_arrays() {
        let raw = SAMPLE.replace(
            r#"uuid = "1111-AAAA, 2222-BBBB ,3333-CCCC""#,
            r#"uuid = ["1111-AAAA", "2222-BBBB"]"#,
        );
        let cfg = Config::from_toml_str(&raw).unwrap();
        assert_eq!(
            cfg.get_as_list("disk", "uuid").unwrap(),
            vec!["1111-AAAA", "2222-BBBB"]
        );
    }

    #[test]
    fn mount_path_strips_trailing_separators_but_keeps_root() {
        let cfg = Config::from_toml_str(&SAMPLE.replace("/mnt/cold/", "/mnt/cold///")).unwrap();
        assert_eq!(cfg.get_mount_path().unwrap(), "/mnt/cold");

        let root = Config::from_toml_str(&SAMPLE.replace("/mnt/cold/", "/")).unwrap();
        assert_eq!(root.get_mount_path().unwrap(), "/");
    }

    #[test]
    fn missing_required_key_is_fatal() {
        let raw = SAMPLE.replace("threshold = 50\n", "");
        let err = Config::from_toml_str(&raw).expect_err("threshold is required");
        assert!(err.is_fatal());
        assert!(err.to_string().contains("threshold"), "{err}");
    }

    #[test]
    fn invalid_threshold_rejected() {
        let raw = SAMPLE.replace("threshold = 50", r#"threshold = "lots""#);
        let err = Config::from_toml_str(&raw).expect_err("bad threshold");
        assert!(matches!(err, MoverError::InvalidConfig { .. }));

        let raw = SAMPLE.replace("threshold = 50", "threshold = -1");
        let err = Config::from_toml_str(&raw).expect_err("negative threshold");
        assert!(err.to_string().contains("non-negative"), "{err}");
    }

    #[test]
    fn blank_uuid_rejected() {
        let raw = SAMPLE.replace("1111-AAAA, 2222-BBBB ,3333-CCCC", "1111-AAAA,,");
        let err = Config::from_toml_str(&raw).expect_err("blank uuid");
        assert!(err.to_string().contains("disk.uuid"), "{err}");
    }

    #[test]
    fn relative_mount_point_rejected() {
        let raw = SAMPLE.replace("/mnt/cold/", "mnt/cold");
        let err = Config::from_toml_str(&raw).expect_err("relative mount point");
        assert!(err.to_string().contains("absolute"), "{err}");
    }

    #[test]
    fn unknown_log_level_rejected() {
        let raw = SAMPLE.replace(r#"level = "debug""#, r#"level = "chatty""#);
        let err = Config::from_toml_str(&raw).expect_err("bad level");
        assert!(err.to_string().contains("log.level"), "{err}");
    }

    #[test]
    fn mail_section_overrides_defaults() {
        let raw = format!(
            "{SAMPLE}\n[mail]\nenabled = true\nsender = \"backup@example.org\"\nreceiver = \"ops@example.org, admin@example.org\"\nsmtp_host = \"10.0.0.35\"\nsmtp_port = 2525\n"
        );
        let cfg = Config::from_toml_str(&raw).unwrap();
        assert_eq!(cfg.mail.sender, "backup@example.org");
        assert_eq!(
            cfg.mail.receivers,
            vec!["ops@example.org", "admin@example.org"]
        );
        assert_eq!(cfg.mail.smtp_host, "10.0.0.35");
        assert_eq!(cfg.mail.smtp_port, 2525);
        assert_eq!(cfg.mail.from_name, "Cold Backup");
    }

    #[test]
    fn paths_section_overrides_defaults() {
        let raw = format!("{SAMPLE}\n[paths]\nsource_dir = \"/data/backup\"\n");
        let cfg = Config::from_toml_str(&raw).unwrap();
        assert_eq!(cfg.paths.source_dir, PathBuf::from("/data/backup"));
        assert_eq!(cfg.paths.log_dir, PathBuf::from("/data/backup/log"));
    }

    #[test]
    fn env_overrides_are_visible_through_get() {
        let mut table: toml::Table = toml::from_str(SAMPLE).unwrap();
        let vars: HashMap<String, String> = [
            ("MOVER_DISK_THRESHOLD", "200"),
            ("MOVER_MAIL_SMTP_HOST", "relay.internal"),
        ]
        .iter()
        .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
        .collect();

        apply_env_overrides_from(&mut table, |name| vars.get(name).cloned());
        let cfg = Config::from_table(table).unwrap();

        assert_eq!(cfg.get("disk", "threshold").unwrap(), "200");
        assert!((cfg.disk.threshold_gb - 200.0).abs() < f64::EPSILON);
        assert_eq!(cfg.mail.smtp_host, "relay.internal");
    }

    #[test]
    fn load_returns_error_for_explicit_missing_path() {
        let err = Config::load(Some(Path::new("/nonexistent/mover/mover.toml")))
            .expect_err("missing file");
        assert!(matches!(err, MoverError::MissingConfig { .. }));
    }

    #[test]
    fn load_reads_file_and_records_origin() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mover.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        let cfg = Config::load(Some(&path)).expect("config should load");
        assert_eq!(cfg.origin.as_deref(), Some(path.as_path()));
    }
}
