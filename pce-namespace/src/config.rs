//! Namespace configuration

use serde::{Deserialize, Serialize};

use pce_core::config::validate_hostname;
use pce_core::constants::DEFAULT_HOSTNAME;
use pce_core::{Error, IdMapping, Result};

/// Namespaces requested for the container and how they are set up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceConfig {
    /// Enable UTS namespace (hostname)
    pub uts: bool,

    /// Enable PID namespace
    pub pid: bool,

    /// Enable mount namespace
    pub mount: bool,

    /// Enable user namespace
    pub user: bool,

    /// Make every mount in the new mount namespace recursively private
    pub private_mounts: bool,

    /// Hostname for the UTS namespace
    pub hostname: String,

    /// uid map written for the user namespace
    pub uid_mapping: Option<IdMapping>,

    /// gid map written for the user namespace
    pub gid_mapping: Option<IdMapping>,
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self {
            uts: true,
            pid: true,
            mount: true,
            user: true,
            private_mounts: true,
            hostname: DEFAULT_HOSTNAME.to_string(),
            uid_mapping: None,
            gid_mapping: None,
        }
    }
}

impl NamespaceConfig {
    /// Create a new namespace configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All namespaces, with container root mapped to the invoking user and
    /// group
    #[must_use]
    pub fn rootless() -> Self {
        Self::default()
            .with_uid_mapping(IdMapping::root_to(nix::unistd::getuid().as_raw()))
            .with_gid_mapping(IdMapping::root_to(nix::unistd::getgid().as_raw()))
    }

    /// Enable UTS namespace
    #[must_use]
    pub const fn with_uts(mut self, enable: bool) -> Self {
        self.uts = enable;
        self
    }

    /// Enable PID namespace
    #[must_use]
    pub const fn with_pid(mut self, enable: bool) -> Self {
        self.pid = enable;
        self
    }

    /// Enable mount namespace
    #[must_use]
    pub const fn with_mount(mut self, enable: bool) -> Self {
        self.mount = enable;
        self
    }

    /// Enable user namespace
    #[must_use]
    pub const fn with_user(mut self, enable: bool) -> Self {
        self.user = enable;
        self
    }

    /// Set hostname for UTS namespace
    #[must_use]
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    /// Set the uid mapping
    #[must_use]
    pub const fn with_uid_mapping(mut self, mapping: IdMapping) -> Self {
        self.uid_mapping = Some(mapping);
        self
    }

    /// Set the gid mapping
    #[must_use]
    pub const fn with_gid_mapping(mut self, mapping: IdMapping) -> Self {
        self.gid_mapping = Some(mapping);
        self
    }

    /// Convert to clone flags for unshare(2)
    #[cfg(target_os = "linux")]
    #[must_use]
    pub fn to_clone_flags(&self) -> nix::sched::CloneFlags {
        use nix::sched::CloneFlags;

        let mut flags = CloneFlags::empty();

        if self.uts {
            flags |= CloneFlags::CLONE_NEWUTS;
        }
        if self.pid {
            flags |= CloneFlags::CLONE_NEWPID;
        }
        if self.mount {
            flags |= CloneFlags::CLONE_NEWNS;
        }
        if self.user {
            flags |= CloneFlags::CLONE_NEWUSER;
        }

        flags
    }

    /// Get list of enabled namespace names
    #[must_use]
    pub fn enabled_namespaces(&self) -> Vec<&'static str> {
        let mut namespaces = Vec::new();

        if self.uts {
            namespaces.push("uts");
        }
        if self.pid {
            namespaces.push("pid");
        }
        if self.mount {
            namespaces.push("mnt");
        }
        if self.user {
            namespaces.push("user");
        }

        namespaces
    }

    /// Validate the configuration
    ///
    /// # Errors
    /// Returns error if the hostname is invalid, a user namespace lacks its
    /// id maps, or private mounts are requested without a mount namespace
    pub fn validate(&self) -> Result<()> {
        validate_hostname(&self.hostname)?;

        if self.user && (self.uid_mapping.is_none() || self.gid_mapping.is_none()) {
            return Err(Error::InvalidConfig {
                message: "user namespace requires both uid and gid mappings".to_string(),
            });
        }

        if self.private_mounts && !self.mount {
            return Err(Error::InvalidConfig {
                message: "private mount propagation requires a mount namespace".to_string(),
            });
        }

        Ok(())
    }
}
