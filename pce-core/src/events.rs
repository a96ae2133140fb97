//! Container lifecycle events with structured tracing

use std::fmt;
use std::time::SystemTime;

use crate::{ProcessId, TerminationState};

/// Events emitted during container lifecycle
#[derive(Debug, Clone)]
pub enum ContainerEvent {
    /// Root filesystem materialized
    RootfsReady {
        /// Image reference or path the root came from
        source: String,
        /// Number of layers applied
        layers: usize,
        /// Timestamp
        timestamp: SystemTime,
    },

    /// Container process started
    Started {
        /// Host PID of the re-entered process
        pid: ProcessId,
        /// Command executed inside the container
        command: Vec<String>,
        /// Timestamp
        timestamp: SystemTime,
    },

    /// Graceful termination requested
    Terminating {
        /// Host PID
        pid: ProcessId,
        /// Signal name that was forwarded
        signal: &'static str,
        /// Timestamp
        timestamp: SystemTime,
    },

    /// Grace period expired, process killed
    Killed {
        /// Host PID
        pid: ProcessId,
        /// Timestamp
        timestamp: SystemTime,
    },

    /// Container process finished
    Exited {
        /// Host PID
        pid: ProcessId,
        /// How it finished
        state: TerminationState,
        /// Timestamp
        timestamp: SystemTime,
    },
}

impl ContainerEvent {
    /// Emit structured tracing event
    pub fn emit_trace(&self) {
        match self {
            Self::RootfsReady { source, layers, .. } => {
                tracing::info!(
                    source = %source,
                    layers,
                    event = "rootfs_ready",
                    "Root filesystem ready"
                );
            }
            Self::Started { pid, command, .. } => {
                tracing::info!(
                    pid = %pid,
                    command = ?command,
                    event = "started",
                    "Container started"
                );
            }
            Self::Terminating { pid, signal, .. } => {
                tracing::warn!(
                    pid = %pid,
                    signal,
                    event = "terminating",
                    "Forwarded termination signal to container"
                );
            }
            Self::Killed { pid, .. } => {
                tracing::warn!(
                    pid = %pid,
                    event = "killed",
                    "Grace period expired, container killed"
                );
            }
            Self::Exited { pid, state, .. } => {
                if state.success() {
                    tracing::info!(
                        pid = %pid,
                        exit_code = state.exit_code(),
                        event = "exited",
                        "Container exited"
                    );
                } else {
                    tracing::warn!(
                        pid = %pid,
                        exit_code = state.exit_code(),
                        state = %state,
                        event = "exited",
                        "Container exited"
                    );
                }
            }
        }
    }
}

impl fmt::Display for ContainerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RootfsReady { source, layers, .. } => {
                write!(f, "Root filesystem from {source} ready ({layers} layers)")
            }
            Self::Started { pid, command, .. } => {
                write!(f, "Container {pid} started: {}", command.join(" "))
            }
            Self::Terminating { pid, signal, .. } => {
                write!(f, "Container {pid} sent {signal}")
            }
            Self::Killed { pid, .. } => write!(f, "Container {pid} killed"),
            Self::Exited { pid, state, .. } => write!(f, "Container {pid} {state}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_display() {
        let event = ContainerEvent::Terminating {
            pid: ProcessId::from_raw(9),
            signal: "SIGTERM",
            timestamp: SystemTime::now(),
        };
        assert_eq!(event.to_string(), "Container 9 sent SIGTERM");
    }
}
