//! Namespace isolation for pce containers
//!
//! A container is started in two phases:
//! - the outer phase ([`launcher`]) creates UTS, PID, mount and user
//!   namespaces for a re-entered copy of the running executable
//!   ([`bootstrap`]) and supervises it ([`supervisor`])
//! - the inner phase ([`executor`]) sets the hostname, changes root, seeds
//!   `/dev` ([`devices`]) and runs the target command as PID 1 of the new
//!   PID namespace
//!
//! [`runtime`] selects the implementation for the host platform.

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

pub mod bootstrap;
pub mod config;
#[cfg(target_os = "linux")]
pub mod devices;
#[cfg(target_os = "linux")]
pub mod executor;
#[cfg(target_os = "linux")]
pub mod launcher;
pub mod runtime;
pub mod supervisor;

pub use bootstrap::ReentryCommand;
pub use config::NamespaceConfig;
#[cfg(target_os = "linux")]
pub use executor::NamespaceExecutor;
#[cfg(target_os = "linux")]
pub use launcher::{NamespaceLauncher, resolve_command};
#[cfg(target_os = "linux")]
pub use runtime::LinuxRuntime;
pub use runtime::{ContainerProcess, ContainerRuntime, UnsupportedRuntime, platform_runtime};
pub use supervisor::{ShutdownSignal, supervise};
