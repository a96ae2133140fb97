//! Lifecycle supervision of the re-entered process
//!
//! The supervisor owns the child handle and races its exit against a
//! shutdown request. A shutdown sends SIGTERM, waits out the grace period,
//! then sends SIGKILL and reaps the child.

use std::future::Future;
use std::time::{Duration, SystemTime};

use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use tokio::process::Child;
use tokio::signal::unix::{SignalKind, signal};

use pce_core::{ContainerEvent, ProcessId, Result, TerminationState};

/// SIGINT and SIGTERM handlers for the outer phase
///
/// Install before spawning the child. The handlers stay in place for the
/// life of the process, so later signals are absorbed instead of killing the
/// outer phase.
pub struct ShutdownSignal {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
}

impl ShutdownSignal {
    /// Register the handlers
    ///
    /// # Errors
    /// Returns error if the handlers cannot be registered
    pub fn install() -> Result<Self> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    /// Wait for the next SIGINT or SIGTERM and return its name
    pub async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
        }
    }
}

/// Wait for `child`, escalating to termination when `shutdown` resolves first
///
/// # Errors
/// Returns error if waiting for or killing the child fails
pub async fn supervise<F>(
    mut child: Child,
    pid: ProcessId,
    shutdown: F,
    grace_period: Duration,
) -> Result<TerminationState>
where
    F: Future<Output = &'static str>,
{
    let state = tokio::select! {
        status = child.wait() => TerminationState::from(status?),
        received = shutdown => {
            tracing::info!(pid = %pid, signal = received, "Shutdown requested");
            terminate(&mut child, pid, grace_period).await?
        }
    };

    ContainerEvent::Exited {
        pid,
        state,
        timestamp: SystemTime::now(),
    }
    .emit_trace();

    Ok(state)
}

async fn terminate(
    child: &mut Child,
    pid: ProcessId,
    grace_period: Duration,
) -> Result<TerminationState> {
    match kill(pid.as_nix_pid(), Signal::SIGTERM) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => tracing::warn!(pid = %pid, error = %e, "Failed to send SIGTERM"),
    }

    ContainerEvent::Terminating {
        pid,
        signal: "SIGTERM",
        timestamp: SystemTime::now(),
    }
    .emit_trace();

    if let Ok(status) = tokio::time::timeout(grace_period, child.wait()).await {
        return Ok(TerminationState::from(status?));
    }

    ContainerEvent::Killed {
        pid,
        timestamp: SystemTime::now(),
    }
    .emit_trace();

    child.kill().await?;
    Ok(TerminationState::from(child.wait().await?))
}
