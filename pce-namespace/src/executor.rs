//! In-namespace execution (inner phase)
//!
//! Runs in the re-entered process, which already lives in the new user,
//! mount and UTS namespaces. Its children are born into the new PID
//! namespace, so the target command is forked off to become PID 1 there.
//!
//! This module uses `unsafe` for fork() and signal handlers. The inner
//! phase is single-threaded, which keeps fork() sound.

#![allow(unsafe_code)]

use std::ffi::{CString, OsStr};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI32, Ordering};

use nix::errno::Errno;
use nix::mount::{MntFlags, MsFlags, mount, umount2};
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::{ForkResult, Pid, chdir, chroot, execvp, fork, sethostname};

use pce_core::constants::{DEFAULT_HOSTNAME, DEFAULT_PATH};
use pce_core::{EnterError, Result, TerminationState};

use crate::devices::prepare_filesystem;

/// Exit code of the forked child when it cannot mount `/proc`
const MOUNT_FAILED: i32 = 126;
/// Exit code of the forked child when exec fails
const EXEC_FAILED: i32 = 127;

/// PID that forwarded signals go to; 0 while no child exists
static CHILD_PID: AtomicI32 = AtomicI32::new(0);

extern "C" fn forward_signal(signal: libc::c_int) {
    let pid = CHILD_PID.load(Ordering::SeqCst);
    if pid > 0 {
        // SAFETY: kill(2) is async-signal-safe.
        unsafe {
            libc::kill(pid, signal);
        }
    }
}

/// Finishes isolation inside the namespaces and runs the target command
#[derive(Debug, Clone)]
pub struct NamespaceExecutor {
    root: PathBuf,
    command: Vec<String>,
    hostname: String,
    default_path: String,
}

impl NamespaceExecutor {
    /// Executor for `command` inside `root`
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, command: Vec<String>) -> Self {
        Self {
            root: root.into(),
            command,
            hostname: DEFAULT_HOSTNAME.to_string(),
            default_path: DEFAULT_PATH.to_string(),
        }
    }

    /// Set the container hostname
    #[must_use]
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    /// Set the `PATH` used when the environment has none
    #[must_use]
    pub fn with_default_path(mut self, path: impl Into<String>) -> Self {
        self.default_path = path.into();
        self
    }

    /// Run the inner phase
    ///
    /// Sets the hostname, changes root, seeds `/dev`, then forks the target
    /// command and waits for it. `/proc` is unmounted after the command
    /// exits.
    ///
    /// # Errors
    /// Returns [`EnterError`] for any failed step; after the root change
    /// there is no way back
    pub fn enter(&self) -> Result<TerminationState> {
        let argv = command_argv(&self.command)?;

        tracing::debug!(hostname = %self.hostname, "Setting hostname");
        sethostname(&self.hostname).map_err(|source| EnterError::Hostname {
            hostname: self.hostname.clone(),
            source,
        })?;

        tracing::debug!(root = %self.root.display(), "Changing root");
        chroot(&self.root)
            .and_then(|()| chdir("/"))
            .map_err(|source| EnterError::Chroot {
                path: self.root.display().to_string(),
                source,
            })?;

        prepare_filesystem(Path::new("/"))?;

        if needs_default_path(std::env::var_os("PATH").as_deref()) {
            // SAFETY: the inner phase is single-threaded.
            unsafe {
                std::env::set_var("PATH", &self.default_path);
            }
        }

        install_forwarding()?;

        tracing::info!(command = ?self.command, "Executing container command");

        // SAFETY: no other threads exist in the inner phase.
        match unsafe { fork() } {
            Ok(ForkResult::Parent { child }) => {
                CHILD_PID.store(child.as_raw(), Ordering::SeqCst);
                let state = wait_for(child);
                CHILD_PID.store(0, Ordering::SeqCst);

                if let Err(e) = unmount_proc() {
                    tracing::warn!(error = %e, "Failed to unmount /proc");
                }

                state
            }
            Ok(ForkResult::Child) => run_child(&argv),
            Err(e) => Err(EnterError::Exec {
                program: self.command[0].clone(),
                reason: format!("fork failed: {e}"),
            }
            .into()),
        }
    }
}

/// Convert the command into exec arguments
fn command_argv(command: &[String]) -> Result<Vec<CString>> {
    let Some(program) = command.first() else {
        return Err(EnterError::Exec {
            program: String::new(),
            reason: "empty command".to_string(),
        }
        .into());
    };

    command
        .iter()
        .map(|arg| {
            CString::new(arg.as_bytes()).map_err(|_| {
                EnterError::Exec {
                    program: program.clone(),
                    reason: format!("argument {arg:?} contains a NUL byte"),
                }
                .into()
            })
        })
        .collect()
}

fn needs_default_path(current: Option<&OsStr>) -> bool {
    current.is_none_or(OsStr::is_empty)
}

fn install_forwarding() -> Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(forward_signal),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );

    for signal in [Signal::SIGINT, Signal::SIGTERM, Signal::SIGHUP] {
        // SAFETY: the handler only touches an atomic and calls kill(2).
        unsafe { sigaction(signal, &action) }.map_err(|source| EnterError::Wait { source })?;
    }

    Ok(())
}

/// Body of the forked child: PID 1 of the new PID namespace
fn run_child(argv: &[CString]) -> ! {
    if let Err(e) = nix::sys::prctl::set_pdeathsig(Signal::SIGKILL) {
        tracing::debug!(error = %e, "Could not set parent death signal");
    }

    // proc reflects the PID namespace of the mounting process.
    let flags = MsFlags::MS_NOSUID | MsFlags::MS_NODEV | MsFlags::MS_NOEXEC;
    if let Err(source) = mount(Some("proc"), "/proc", Some("proc"), flags, None::<&str>) {
        let err = EnterError::Mount {
            action: "mount",
            target: "/proc".to_string(),
            source,
        };
        eprintln!("pce: {err}");
        std::process::exit(MOUNT_FAILED);
    }

    let Err(e) = execvp(&argv[0], argv);
    let err = EnterError::Exec {
        program: argv[0].to_string_lossy().into_owned(),
        reason: e.desc().to_string(),
    };
    eprintln!("pce: {err}");
    std::process::exit(EXEC_FAILED);
}

fn wait_for(child: Pid) -> Result<TerminationState> {
    loop {
        match waitpid(child, None) {
            Ok(status) => {
                if let Some(state) = termination(status) {
                    tracing::debug!(
                        pid = child.as_raw(),
                        state = %state,
                        "Container command finished"
                    );
                    return Ok(state);
                }
                tracing::debug!(status = ?status, "Child status changed");
            }
            Err(Errno::EINTR) => {}
            Err(source) => return Err(EnterError::Wait { source }.into()),
        }
    }
}

/// Final state for statuses that end the child
fn termination(status: WaitStatus) -> Option<TerminationState> {
    match status {
        WaitStatus::Exited(_, code) => Some(TerminationState::Exited { code }),
        WaitStatus::Signaled(_, signal, _) => Some(TerminationState::Signaled {
            signal: signal as i32,
        }),
        _ => None,
    }
}

fn unmount_proc() -> Result<()> {
    match umount2("/proc", MntFlags::MNT_DETACH) {
        // Not mounted: the child failed before mounting.
        Ok(()) | Err(Errno::EINVAL) => Ok(()),
        Err(source) => Err(EnterError::Mount {
            action: "unmount",
            target: "/proc".to_string(),
            source,
        }
        .into()),
    }
}
