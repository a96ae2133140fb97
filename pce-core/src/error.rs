//! Error types for pce
//!
//! The top-level [`Error`] wraps one taxonomy enum per phase of a run:
//! image acquisition ([`ProviderError`]), root filesystem materialization
//! ([`ExtractError`]), the outer launch ([`LaunchError`]) and the inner
//! in-namespace phase ([`EnterError`]).

use std::time::Duration;
use thiserror::Error;

/// pce error types
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Image acquisition failed
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Archive extraction failed
    #[error(transparent)]
    Extract(#[from] ExtractError),

    /// Outer phase failed before or while launching the container
    #[error(transparent)]
    Launch(#[from] LaunchError),

    /// Inner phase failed inside the namespaces
    #[error(transparent)]
    Enter(#[from] EnterError),

    /// A layer could not be applied to the root filesystem
    #[error("layer {index} ({layer}) failed: {source}")]
    Layer {
        /// Position of the layer, bottom first
        index: usize,
        /// Layer digest
        layer: String,
        /// What went wrong inside the layer
        #[source]
        source: Box<Error>,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// System error from nix
    #[error("System error: {0}")]
    System(#[from] nix::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Task join error
    #[error("Task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

/// Failures of the image provider.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ProviderError {
    /// The reference is malformed or violates the reference limits
    #[error("invalid image reference {reference:?}: {reason}")]
    InvalidReference {
        /// Offending reference
        reference: String,
        /// Why it was rejected
        reason: String,
    },

    /// The registry could not deliver the image
    #[error("failed to pull {reference}: {reason}")]
    ImagePull {
        /// Image reference
        reference: String,
        /// Registry or transport message
        reason: String,
    },

    /// A registry operation did not finish in time
    #[error("{operation} timed out after {duration:?}")]
    Timeout {
        /// What was being done
        operation: String,
        /// Applied limit
        duration: Duration,
    },

    /// A layer or the image exceeds the configured size limits
    #[error("image too large: {size} bytes exceeds limit of {limit} bytes")]
    ImageTooLarge {
        /// Observed size
        size: u64,
        /// Applied limit
        limit: u64,
    },

    /// A layer uses a compression format that cannot be decoded
    #[error("layer {digest} has unsupported media type {media_type}")]
    UnsupportedMediaType {
        /// Layer digest
        digest: String,
        /// Layer media type
        media_type: String,
    },
}

/// Failures of the archive extractor.
///
/// Every variant aborts the whole extraction and names the entry that caused
/// it.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ExtractError {
    /// The entry name or a link target would resolve outside the root
    #[error("entry {entry:?} escapes the destination root: {reason}")]
    PathEscape {
        /// Raw entry name
        entry: String,
        /// Which rule was violated
        reason: String,
    },

    /// The entry has a tar type that is neither materialized nor skipped
    #[error("entry {entry:?} has unsupported type {kind}")]
    UnsupportedEntryType {
        /// Raw entry name
        entry: String,
        /// Tar type description
        kind: String,
    },

    /// Reading the stream or writing the entry failed
    #[error("I/O failure on {entry}: {source}")]
    Io {
        /// Raw entry name, or a description of the stream position
        entry: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

impl ExtractError {
    /// Name of the entry that caused the failure
    #[must_use]
    pub fn entry(&self) -> &str {
        match self {
            Self::PathEscape { entry, .. }
            | Self::UnsupportedEntryType { entry, .. }
            | Self::Io { entry, .. } => entry,
        }
    }

    /// Check if this is a containment violation
    #[must_use]
    pub const fn is_path_escape(&self) -> bool {
        matches!(self, Self::PathEscape { .. })
    }
}

/// Failures of the outer phase. None of them leave a child process behind.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum LaunchError {
    /// Neither the caller nor the image supplied a command
    #[error("no command specified and no default command found in image")]
    NoCommandSpecified,

    /// Creating or configuring the namespaces failed
    #[error("namespace setup failed: {message}")]
    NamespaceSetupFailure {
        /// Error message
        message: String,
    },

    /// The kernel refused namespace creation for this user
    #[error("permission denied: {operation}")]
    PrivilegeDenied {
        /// Operation that was denied
        operation: String,
    },

    /// Namespaces are not available on this operating system
    #[error("container functionality is not supported on {os}, please use Linux")]
    UnsupportedPlatform {
        /// Host operating system
        os: String,
    },
}

/// Failures of the inner phase.
///
/// Once the root has been changed there is no way back, so all of these are
/// fatal for the inner process.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum EnterError {
    /// sethostname(2) failed
    #[error("failed to set hostname {hostname:?}: {source}")]
    Hostname {
        /// Requested hostname
        hostname: String,
        /// Underlying error
        #[source]
        source: nix::Error,
    },

    /// chroot(2) or the following chdir failed
    #[error("failed to change root to {path}: {source}")]
    Chroot {
        /// New root
        path: String,
        /// Underlying error
        #[source]
        source: nix::Error,
    },

    /// A mount or unmount failed
    #[error("failed to {action} {target}: {source}")]
    Mount {
        /// mount or unmount
        action: &'static str,
        /// Mount point
        target: String,
        /// Underlying error
        #[source]
        source: nix::Error,
    },

    /// A device node could not be seeded
    #[error("failed to create device {path}: {source}")]
    Device {
        /// Device path inside the root
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The target command could not be started
    #[error("failed to execute {program}: {reason}")]
    Exec {
        /// Program name
        program: String,
        /// Why it failed
        reason: String,
    },

    /// Waiting for the target command failed
    #[error("failed to wait for container process: {source}")]
    Wait {
        /// Underlying error
        #[source]
        source: nix::Error,
    },
}

/// Result type alias for pce operations
pub type Result<T> = std::result::Result<T, Error>;
