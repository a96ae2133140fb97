//! Re-entry into the running executable
//!
//! Namespaces are created for a fresh process image: the outer phase starts
//! its own executable again with the hidden `internalrun` subcommand, which
//! routes the new process to the inner phase.
//!
//! The invocation has the form
//!
//! ```text
//! <exe> [--verbose] internalrun [--hostname <name>] <root> -- <command...>
//! ```
//!
//! The command follows `--` as separate arguments, so nothing in it is ever
//! re-split or read as an option.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use pce_core::constants::REENTRY_SUBCOMMAND;
use pce_core::{LaunchError, Result};

/// Absolute path of the running executable
///
/// # Errors
/// Returns [`LaunchError::NamespaceSetupFailure`] if the path cannot be resolved
pub fn self_executable() -> Result<PathBuf> {
    std::env::current_exe().map_err(|e| {
        LaunchError::NamespaceSetupFailure {
            message: format!("cannot resolve own executable: {e}"),
        }
        .into()
    })
}

/// Arguments for one re-entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReentryCommand {
    executable: PathBuf,
    verbose: bool,
    hostname: Option<String>,
    root: PathBuf,
    command: Vec<String>,
}

impl ReentryCommand {
    /// Re-entry through an explicit executable
    #[must_use]
    pub fn with_executable(
        executable: impl Into<PathBuf>,
        root: impl Into<PathBuf>,
        command: Vec<String>,
    ) -> Self {
        Self {
            executable: executable.into(),
            verbose: false,
            hostname: None,
            root: root.into(),
            command,
        }
    }

    /// Forward the verbose flag
    #[must_use]
    pub const fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Pass a hostname to the inner phase
    #[must_use]
    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    /// Executable that will be started
    #[must_use]
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Command the inner phase will run
    #[must_use]
    pub fn command(&self) -> &[String] {
        &self.command
    }

    /// Arguments after the executable name
    #[must_use]
    pub fn args(&self) -> Vec<OsString> {
        let mut args = Vec::with_capacity(self.command.len() + 6);

        if self.verbose {
            args.push(OsString::from("--verbose"));
        }
        args.push(OsString::from(REENTRY_SUBCOMMAND));
        if let Some(hostname) = &self.hostname {
            args.push(OsString::from("--hostname"));
            args.push(OsString::from(hostname));
        }
        args.push(self.root.clone().into_os_string());
        args.push(OsString::from("--"));
        args.extend(self.command.iter().map(OsString::from));

        args
    }

    /// Build the process to spawn, with inherited standard streams
    #[must_use]
    pub fn to_command(&self) -> tokio::process::Command {
        let mut command = tokio::process::Command::new(&self.executable);
        command
            .args(self.args())
            .stdin(std::process::Stdio::inherit())
            .stdout(std::process::Stdio::inherit())
            .stderr(std::process::Stdio::inherit());
        command
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_reentry_args() {
        let reentry = ReentryCommand::with_executable(
            "/usr/bin/pce",
            "/tmp/pce-1/rootfs",
            strings(&["/bin/sh", "-c", "echo hi there"]),
        );

        assert_eq!(
            reentry.args(),
            vec!["internalrun", "/tmp/pce-1/rootfs", "--", "/bin/sh", "-c", "echo hi there"]
        );
    }

    #[test]
    fn test_reentry_args_with_options() {
        let reentry = ReentryCommand::with_executable(
            "/usr/bin/pce",
            "/tmp/root with space",
            strings(&["--help"]),
        )
        .verbose(true)
        .hostname("box");

        assert_eq!(
            reentry.args(),
            vec![
                "--verbose",
                "internalrun",
                "--hostname",
                "box",
                "/tmp/root with space",
                "--",
                "--help"
            ]
        );
    }

    #[test]
    fn test_self_executable_is_absolute() {
        let exe = self_executable().unwrap();
        assert!(exe.is_absolute());
    }
}
