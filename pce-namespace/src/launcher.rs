//! Namespace launcher (outer phase)
//!
//! Spawns the re-entered process into new namespaces and supervises it.
//! The namespaces are created in a pre-exec hook, between fork and exec of
//! the child:
//!
//! 1. `unshare(CLONE_NEWUSER)`, then `setgroups` is denied and the single
//!    entry uid and gid maps are written through `/proc/self`
//! 2. `unshare` of the remaining namespaces; a new PID namespace applies to
//!    the children of the re-entered process
//! 3. mount propagation of `/` is made recursively private
//!
//! The hook runs in a forked copy of a multi-threaded process, so it only
//! uses raw `libc` calls on buffers prepared before the fork.

#![allow(unsafe_code)]

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use nix::sched::CloneFlags;
use tokio::process::{Child, Command};

use pce_core::constants::DEFAULT_GRACE_PERIOD;
use pce_core::{ContainerEvent, ImageCommand, LaunchError, ProcessId, Result, TerminationState};

use crate::bootstrap::ReentryCommand;
use crate::config::NamespaceConfig;
use crate::runtime::ContainerProcess;
use crate::supervisor::{ShutdownSignal, supervise};

/// Pick the command to run: the caller's if given, else the image default
///
/// # Errors
/// Returns [`LaunchError::NoCommandSpecified`] when neither exists
pub fn resolve_command(requested: &[String], defaults: &ImageCommand) -> Result<Vec<String>> {
    if !requested.is_empty() {
        return Ok(requested.to_vec());
    }

    defaults
        .effective()
        .ok_or_else(|| LaunchError::NoCommandSpecified.into())
}

/// Everything the pre-exec hook needs, rendered before fork
#[derive(Debug)]
struct NamespacePlan {
    user: bool,
    uid_map: Vec<u8>,
    gid_map: Vec<u8>,
    other_flags: libc::c_int,
    private_mounts: bool,
}

impl NamespacePlan {
    fn from_config(config: &NamespaceConfig) -> Self {
        // The user namespace is unshared on its own, before the maps are written.
        let other_flags = config
            .to_clone_flags()
            .difference(CloneFlags::CLONE_NEWUSER)
            .bits();

        Self {
            user: config.user,
            uid_map: config
                .uid_mapping
                .map(|m| m.to_map_line().into_bytes())
                .unwrap_or_default(),
            gid_map: config
                .gid_mapping
                .map(|m| m.to_map_line().into_bytes())
                .unwrap_or_default(),
            other_flags,
            private_mounts: config.private_mounts,
        }
    }

    /// Runs between fork and exec
    ///
    /// # Safety
    /// Only async-signal-safe calls are made.
    unsafe fn apply(&self) -> io::Result<()> {
        unsafe {
            if self.user {
                check(libc::unshare(libc::CLONE_NEWUSER))?;
                write_proc_file(c"/proc/self/setgroups", b"deny")?;
                write_proc_file(c"/proc/self/uid_map", &self.uid_map)?;
                write_proc_file(c"/proc/self/gid_map", &self.gid_map)?;
            }

            if self.other_flags != 0 {
                check(libc::unshare(self.other_flags))?;
            }

            if self.private_mounts {
                check(libc::mount(
                    std::ptr::null(),
                    c"/".as_ptr(),
                    std::ptr::null(),
                    libc::MS_REC | libc::MS_PRIVATE,
                    std::ptr::null(),
                ))?;
            }
        }

        Ok(())
    }
}

fn check(ret: libc::c_int) -> io::Result<()> {
    if ret == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

/// Write `data` to a procfs file with raw syscalls
///
/// # Safety
/// Async-signal-safe; usable between fork and exec.
unsafe fn write_proc_file(path: &std::ffi::CStr, data: &[u8]) -> io::Result<()> {
    unsafe {
        let fd = libc::open(path.as_ptr(), libc::O_WRONLY | libc::O_CLOEXEC);
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }

        let written = libc::write(fd, data.as_ptr().cast(), data.len());
        let result = if written < 0 {
            Err(io::Error::last_os_error())
        } else if written.cast_unsigned() != data.len() {
            Err(io::Error::new(io::ErrorKind::WriteZero, "short write to procfs"))
        } else {
            Ok(())
        };

        libc::close(fd);
        result
    }
}

/// Map a failed spawn to the launch error taxonomy
fn classify_spawn_error(err: &io::Error, executable: &Path) -> LaunchError {
    match err.raw_os_error() {
        Some(libc::EPERM | libc::EACCES) => LaunchError::PrivilegeDenied {
            operation: format!("namespace setup: {err}"),
        },
        _ => LaunchError::NamespaceSetupFailure {
            message: format!("failed to start {}: {err}", executable.display()),
        },
    }
}

/// Starts and supervises containers
#[derive(Debug, Clone)]
pub struct NamespaceLauncher {
    config: NamespaceConfig,
    grace_period: Duration,
    verbose: bool,
    executable: Option<PathBuf>,
}

impl NamespaceLauncher {
    /// Launcher for the given namespaces
    #[must_use]
    pub const fn new(config: NamespaceConfig) -> Self {
        Self {
            config,
            grace_period: DEFAULT_GRACE_PERIOD,
            verbose: false,
            executable: None,
        }
    }

    /// Set the wait between SIGTERM and SIGKILL
    #[must_use]
    pub const fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Forward `--verbose` to the inner phase
    #[must_use]
    pub const fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Re-enter through `executable` instead of the running binary
    #[must_use]
    pub fn with_executable(mut self, executable: impl Into<PathBuf>) -> Self {
        self.executable = Some(executable.into());
        self
    }

    /// Namespace configuration
    #[must_use]
    pub const fn config(&self) -> &NamespaceConfig {
        &self.config
    }

    /// Arrange for `command` to start inside fresh namespaces
    ///
    /// The child is killed if its handle is dropped.
    #[must_use]
    pub fn namespaced_command(&self, mut command: Command) -> Command {
        let plan = NamespacePlan::from_config(&self.config);

        // SAFETY: the hook only performs async-signal-safe libc calls on
        // buffers rendered before fork.
        unsafe {
            command.pre_exec(move || unsafe { plan.apply() });
        }
        command.kill_on_drop(true);
        command
    }

    /// Spawn the re-entered process for `command` in `root`
    ///
    /// # Errors
    /// Returns [`LaunchError`] if the configuration is invalid or the
    /// namespaces cannot be created
    pub fn spawn(&self, root: &Path, command: Vec<String>) -> Result<(Child, ContainerProcess)> {
        self.config.validate()?;

        let executable = match &self.executable {
            Some(path) => path.clone(),
            None => crate::bootstrap::self_executable()?,
        };

        let reentry = ReentryCommand::with_executable(&executable, root, command)
            .verbose(self.verbose)
            .hostname(self.config.hostname.clone());

        tracing::debug!(
            executable = %executable.display(),
            args = ?reentry.args(),
            namespaces = ?self.config.enabled_namespaces(),
            "Spawning re-entered process"
        );

        let child = self
            .namespaced_command(reentry.to_command())
            .spawn()
            .map_err(|e| {
                let err = classify_spawn_error(&e, &executable);
                tracing::error!(error = %err, "Failed to create namespaces");
                err
            })?;

        let Some(raw_pid) = child.id() else {
            return Err(LaunchError::NamespaceSetupFailure {
                message: "child exited before its pid was known".to_string(),
            }
            .into());
        };

        #[allow(clippy::cast_possible_wrap)]
        let pid = ProcessId::from_raw(raw_pid as i32);

        ContainerEvent::Started {
            pid,
            command: reentry.command().to_vec(),
            timestamp: SystemTime::now(),
        }
        .emit_trace();

        let process = ContainerProcess {
            pid,
            command: reentry.command().to_vec(),
            namespaces: self.config.clone(),
            state: TerminationState::Running,
        };

        Ok((child, process))
    }

    /// Run `requested` (or the image default) in `root` until it exits
    ///
    /// SIGINT and SIGTERM are registered before the child is spawned and
    /// lead to a graceful, then forced, termination.
    ///
    /// # Errors
    /// Returns [`LaunchError`] for setup failures, or an I/O error if
    /// waiting for the child fails
    pub async fn launch(
        &self,
        root: &Path,
        requested: &[String],
        defaults: &ImageCommand,
    ) -> Result<ContainerProcess> {
        let command = resolve_command(requested, defaults)?;

        let mut shutdown = ShutdownSignal::install()?;
        let (child, mut process) = self.spawn(root, command)?;

        process.state =
            supervise(child, process.pid, shutdown.recv(), self.grace_period).await?;

        Ok(process)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pce_core::IdMapping;

    #[test]
    fn test_plan_separates_user_namespace() {
        let config = NamespaceConfig::new()
            .with_uid_mapping(IdMapping::root_to(1000))
            .with_gid_mapping(IdMapping::root_to(100));
        let plan = NamespacePlan::from_config(&config);

        assert!(plan.user);
        assert_eq!(
            plan.other_flags,
            libc::CLONE_NEWUTS | libc::CLONE_NEWPID | libc::CLONE_NEWNS
        );
        assert_eq!(plan.uid_map, b"0 1000 1\n");
        assert_eq!(plan.gid_map, b"0 100 1\n");
    }

    #[test]
    fn test_plan_without_uts() {
        let plan = NamespacePlan::from_config(&NamespaceConfig::new().with_uts(false));
        assert_eq!(plan.other_flags & libc::CLONE_NEWUTS, 0);
        assert_ne!(plan.other_flags & libc::CLONE_NEWNS, 0);
    }

    #[test]
    fn test_classify_spawn_error() {
        let exe = Path::new("/usr/bin/pce");

        let denied = classify_spawn_error(&io::Error::from_raw_os_error(libc::EPERM), exe);
        assert!(matches!(
            &denied,
            LaunchError::PrivilegeDenied { operation } if operation.starts_with("namespace setup")
        ));

        let missing = classify_spawn_error(&io::Error::from_raw_os_error(libc::ENOENT), exe);
        assert!(matches!(missing, LaunchError::NamespaceSetupFailure { .. }));
        assert!(missing.to_string().contains("/usr/bin/pce"));
    }
}
