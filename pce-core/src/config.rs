//! Runtime configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{DEFAULT_GRACE_PERIOD, DEFAULT_HOSTNAME, DEFAULT_PATH, TEMP_DIR_PREFIX};
use crate::{Error, Result};

/// How absolute symlink targets found in a layer are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbsoluteSymlinks {
    /// Fail the extraction with a path escape
    #[default]
    Reject,
    /// Resolve the target against the destination root, the way the
    /// chrooted process will see it
    RootRelative,
}

/// Settings for one container run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Hostname inside the UTS namespace
    pub hostname: String,

    /// Wait between SIGTERM and SIGKILL when interrupted
    #[serde(with = "duration_serde")]
    pub grace_period: Duration,

    /// `PATH` used when the environment has none
    pub default_path: String,

    /// Directory that receives the per-run temporary directory
    pub temp_root: Option<PathBuf>,

    /// Prefix of the per-run temporary directory
    pub temp_prefix: String,

    /// Keep the materialized root after the container exits
    pub keep_rootfs: bool,

    /// Absolute symlink policy for extraction
    pub absolute_symlinks: AbsoluteSymlinks,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            hostname: DEFAULT_HOSTNAME.to_string(),
            grace_period: DEFAULT_GRACE_PERIOD,
            default_path: DEFAULT_PATH.to_string(),
            temp_root: None,
            temp_prefix: TEMP_DIR_PREFIX.to_string(),
            keep_rootfs: false,
            absolute_symlinks: AbsoluteSymlinks::Reject,
        }
    }
}

impl RuntimeConfig {
    /// Create a configuration with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the container hostname
    #[must_use]
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    /// Set the grace period before SIGKILL
    #[must_use]
    pub const fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Set the parent directory for per-run directories
    #[must_use]
    pub fn with_temp_root(mut self, temp_root: impl Into<PathBuf>) -> Self {
        self.temp_root = Some(temp_root.into());
        self
    }

    /// Keep the materialized root after the run
    #[must_use]
    pub const fn with_keep_rootfs(mut self, keep: bool) -> Self {
        self.keep_rootfs = keep;
        self
    }

    /// Set the absolute symlink policy
    #[must_use]
    pub const fn with_absolute_symlinks(mut self, policy: AbsoluteSymlinks) -> Self {
        self.absolute_symlinks = policy;
        self
    }

    /// Validate the configuration
    ///
    /// # Errors
    /// Returns error if the hostname is not a valid UTS name
    pub fn validate(&self) -> Result<()> {
        validate_hostname(&self.hostname)
    }
}

/// Check a hostname against the UTS name rules (1–64 bytes, letters, digits,
/// dashes and dots, no leading dash)
///
/// # Errors
/// Returns error describing the violated rule
pub fn validate_hostname(hostname: &str) -> Result<()> {
    let invalid = |message: &str| Error::InvalidConfig {
        message: format!("hostname {hostname:?} {message}"),
    };

    if hostname.is_empty() {
        return Err(invalid("is empty"));
    }
    if hostname.len() > 64 {
        return Err(invalid("is longer than 64 bytes"));
    }
    if hostname.starts_with('-') {
        return Err(invalid("starts with a dash"));
    }
    if !hostname
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
    {
        return Err(invalid("contains invalid characters"));
    }

    Ok(())
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[allow(clippy::cast_possible_truncation)]
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.hostname, "container");
        assert_eq!(config.grace_period, Duration::from_secs(5));
        assert_eq!(config.absolute_symlinks, AbsoluteSymlinks::Reject);
        assert!(!config.keep_rootfs);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = RuntimeConfig::new()
            .with_hostname("sandbox")
            .with_grace_period(Duration::from_millis(250))
            .with_keep_rootfs(true)
            .with_absolute_symlinks(AbsoluteSymlinks::RootRelative);

        assert_eq!(config.hostname, "sandbox");
        assert_eq!(config.grace_period, Duration::from_millis(250));
        assert!(config.keep_rootfs);
        assert_eq!(config.absolute_symlinks, AbsoluteSymlinks::RootRelative);
    }

    #[test]
    fn test_hostname_validation() {
        assert!(validate_hostname("container").is_ok());
        assert!(validate_hostname("web-1.local").is_ok());
        assert!(validate_hostname("").is_err());
        assert!(validate_hostname("-bad").is_err());
        assert!(validate_hostname("has space").is_err());
        assert!(validate_hostname(&"a".repeat(65)).is_err());
    }

    #[test]
    fn test_config_serde_fills_defaults() {
        let config: RuntimeConfig =
            serde_json::from_str(r#"{"hostname":"box","grace_period":1500}"#).unwrap();
        assert_eq!(config.hostname, "box");
        assert_eq!(config.grace_period, Duration::from_millis(1500));
        assert_eq!(config.temp_prefix, TEMP_DIR_PREFIX);
    }
}
