//! Core type definitions with strong typing and validation

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::constants::{IMAGE_REF_VALID_CHARS, MAX_IMAGE_REF_LEN};
use crate::error::ProviderError;
use crate::{Error, Result};

/// Image reference with validation
///
/// The reference is only checked syntactically; resolving it is up to the
/// image provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(try_from = "String", into = "String")]
pub struct ImageReference(String);

impl ImageReference {
    /// Create a new `ImageReference` with validation
    ///
    /// # Errors
    /// Returns error if the reference is empty, too long, or contains invalid characters
    pub fn new(reference: impl Into<String>) -> Result<Self> {
        let reference = reference.into();
        Self::validate(&reference)?;
        Ok(Self(reference))
    }

    fn validate(reference: &str) -> Result<()> {
        let invalid = |reason: String| -> Error {
            ProviderError::InvalidReference {
                reference: reference.chars().take(64).collect(),
                reason,
            }
            .into()
        };

        if reference.is_empty() {
            return Err(invalid("empty image reference".to_string()));
        }

        if reference.len() > MAX_IMAGE_REF_LEN {
            return Err(invalid(format!(
                "exceeds maximum length of {MAX_IMAGE_REF_LEN} bytes"
            )));
        }

        if !reference
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || IMAGE_REF_VALID_CHARS.contains(c))
        {
            return Err(invalid("contains invalid characters".to_string()));
        }

        Ok(())
    }

    /// Get the reference as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short name of the image: the last repository path component without
    /// tag or digest (`docker.io/library/alpine:3.19` → `alpine`)
    #[must_use]
    pub fn base_name(&self) -> &str {
        let without_digest = self.0.split('@').next().unwrap_or(&self.0);
        let last = without_digest
            .rsplit('/')
            .next()
            .unwrap_or(without_digest);
        last.split(':').next().unwrap_or(last)
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ImageReference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for ImageReference {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::new(s)
    }
}

impl From<ImageReference> for String {
    fn from(reference: ImageReference) -> Self {
        reference.0
    }
}

/// Process identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct ProcessId(i32);

impl ProcessId {
    /// Create from raw PID
    #[must_use]
    pub const fn from_raw(pid: i32) -> Self {
        Self(pid)
    }

    /// Convert to `nix::unistd::Pid`
    #[must_use]
    pub const fn as_nix_pid(self) -> nix::unistd::Pid {
        nix::unistd::Pid::from_raw(self.0)
    }

    /// Get raw PID value
    #[must_use]
    pub const fn as_raw(self) -> i32 {
        self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<nix::unistd::Pid> for ProcessId {
    fn from(pid: nix::unistd::Pid) -> Self {
        Self(pid.as_raw())
    }
}

impl From<ProcessId> for nix::unistd::Pid {
    fn from(pid: ProcessId) -> Self {
        nix::unistd::Pid::from_raw(pid.0)
    }
}

/// One line of a user namespace uid or gid map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdMapping {
    /// First id inside the namespace
    pub container_id: u32,
    /// First id outside the namespace
    pub host_id: u32,
    /// Number of ids mapped
    pub size: u32,
}

impl IdMapping {
    /// Map container root to a single host id
    #[must_use]
    pub const fn root_to(host_id: u32) -> Self {
        Self {
            container_id: 0,
            host_id,
            size: 1,
        }
    }

    /// Render in the `/proc/<pid>/uid_map` line format
    #[must_use]
    pub fn to_map_line(&self) -> String {
        format!("{} {} {}\n", self.container_id, self.host_id, self.size)
    }
}

/// Default command configuration taken from the image config
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageCommand {
    /// `Entrypoint` of the image config
    #[serde(default)]
    pub entrypoint: Vec<String>,
    /// `Cmd` of the image config
    #[serde(default)]
    pub cmd: Vec<String>,
}

impl ImageCommand {
    /// Create from entrypoint and cmd sequences
    #[must_use]
    pub const fn new(entrypoint: Vec<String>, cmd: Vec<String>) -> Self {
        Self { entrypoint, cmd }
    }

    /// The command the image runs when the caller gives none
    ///
    /// `entrypoint ++ cmd` when an entrypoint exists, otherwise `cmd`, and
    /// `None` when both are empty.
    #[must_use]
    pub fn effective(&self) -> Option<Vec<String>> {
        if !self.entrypoint.is_empty() {
            let mut command = self.entrypoint.clone();
            command.extend(self.cmd.iter().cloned());
            Some(command)
        } else if !self.cmd.is_empty() {
            Some(self.cmd.clone())
        } else {
            None
        }
    }
}

/// Termination state of a container process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TerminationState {
    /// Still running
    Running,
    /// Exited on its own
    Exited {
        /// Exit code
        code: i32,
    },
    /// Killed by a signal
    Signaled {
        /// Signal number
        signal: i32,
    },
}

impl TerminationState {
    /// Shell-style exit code (128 + signal for signaled processes)
    #[must_use]
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::Running => 0,
            Self::Exited { code } => code,
            Self::Signaled { signal } => 128 + signal,
        }
    }

    /// Check if the process finished successfully
    #[must_use]
    pub const fn success(self) -> bool {
        matches!(self, Self::Exited { code: 0 })
    }
}

impl From<std::process::ExitStatus> for TerminationState {
    fn from(status: std::process::ExitStatus) -> Self {
        use std::os::unix::process::ExitStatusExt;

        match (status.code(), status.signal()) {
            (Some(code), _) => Self::Exited { code },
            (None, Some(signal)) => Self::Signaled { signal },
            (None, None) => Self::Running,
        }
    }
}

impl fmt::Display for TerminationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Exited { code } => write!(f, "exited with code {code}"),
            Self::Signaled { signal } => write!(f, "killed by signal {signal}"),
        }
    }
}
