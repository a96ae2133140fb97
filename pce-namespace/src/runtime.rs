//! Platform selection
//!
//! Namespaces only exist on Linux. Everywhere else the factory hands out an
//! [`UnsupportedRuntime`] that refuses every operation without touching the
//! system.

use std::path::Path;

use async_trait::async_trait;

use pce_core::{ImageCommand, LaunchError, ProcessId, Result, RuntimeConfig, TerminationState};

use crate::config::NamespaceConfig;

/// The outer phase's view of a launched container
#[derive(Debug, Clone)]
pub struct ContainerProcess {
    /// Host PID of the re-entered process
    pub pid: ProcessId,
    /// Command run inside the container
    pub command: Vec<String>,
    /// Namespaces the process was started in
    pub namespaces: NamespaceConfig,
    /// Termination state, `Running` until the process is reaped
    pub state: TerminationState,
}

impl ContainerProcess {
    /// Shell-style exit code
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        self.state.exit_code()
    }
}

/// Operations a platform must provide to run containers
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Runtime name for logs
    fn name(&self) -> &str;

    /// Fail early when containers cannot run on this host
    ///
    /// # Errors
    /// Returns [`LaunchError::UnsupportedPlatform`] where namespaces are missing
    fn ensure_supported(&self) -> Result<()> {
        Ok(())
    }

    /// Outer phase: start the command in new namespaces and wait for it
    async fn launch(
        &self,
        root: &Path,
        requested: &[String],
        defaults: &ImageCommand,
    ) -> Result<ContainerProcess>;

    /// Inner phase: finish isolation in `root` and run `command`
    fn enter(&self, root: &Path, command: &[String]) -> Result<TerminationState>;
}

/// Runtime backed by Linux namespaces
#[cfg(target_os = "linux")]
#[derive(Debug, Clone)]
pub struct LinuxRuntime {
    config: RuntimeConfig,
    verbose: bool,
}

#[cfg(target_os = "linux")]
impl LinuxRuntime {
    /// Create a runtime from the run configuration
    ///
    /// # Errors
    /// Returns error if the configuration is invalid
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            verbose: false,
        })
    }

    /// Forward `--verbose` to the inner phase
    #[must_use]
    pub const fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn launcher(&self) -> crate::launcher::NamespaceLauncher {
        let namespaces = NamespaceConfig::rootless().with_hostname(self.config.hostname.clone());

        crate::launcher::NamespaceLauncher::new(namespaces)
            .with_grace_period(self.config.grace_period)
            .with_verbose(self.verbose)
    }
}

#[cfg(target_os = "linux")]
#[async_trait]
impl ContainerRuntime for LinuxRuntime {
    fn name(&self) -> &'static str {
        "linux"
    }

    async fn launch(
        &self,
        root: &Path,
        requested: &[String],
        defaults: &ImageCommand,
    ) -> Result<ContainerProcess> {
        self.launcher().launch(root, requested, defaults).await
    }

    fn enter(&self, root: &Path, command: &[String]) -> Result<TerminationState> {
        crate::executor::NamespaceExecutor::new(root, command.to_vec())
            .with_hostname(self.config.hostname.clone())
            .with_default_path(self.config.default_path.clone())
            .enter()
    }
}

/// Runtime for hosts without namespaces
#[derive(Debug, Clone)]
pub struct UnsupportedRuntime {
    os: String,
}

impl UnsupportedRuntime {
    /// Runtime that reports `os` as unsupported
    #[must_use]
    pub fn new(os: impl Into<String>) -> Self {
        Self { os: os.into() }
    }

    fn error(&self) -> pce_core::Error {
        LaunchError::UnsupportedPlatform {
            os: self.os.clone(),
        }
        .into()
    }
}

#[async_trait]
impl ContainerRuntime for UnsupportedRuntime {
    fn name(&self) -> &'static str {
        "unsupported"
    }

    fn ensure_supported(&self) -> Result<()> {
        Err(self.error())
    }

    async fn launch(
        &self,
        _root: &Path,
        _requested: &[String],
        _defaults: &ImageCommand,
    ) -> Result<ContainerProcess> {
        Err(self.error())
    }

    fn enter(&self, _root: &Path, _command: &[String]) -> Result<TerminationState> {
        Err(self.error())
    }
}

/// Runtime for the host platform
///
/// # Errors
/// Returns error if the configuration is invalid
#[cfg(target_os = "linux")]
pub fn platform_runtime(config: RuntimeConfig, verbose: bool) -> Result<Box<dyn ContainerRuntime>> {
    Ok(Box::new(LinuxRuntime::new(config)?.with_verbose(verbose)))
}

/// Runtime for the host platform
///
/// # Errors
/// Never fails on this platform
#[cfg(not(target_os = "linux"))]
pub fn platform_runtime(
    _config: RuntimeConfig,
    _verbose: bool,
) -> Result<Box<dyn ContainerRuntime>> {
    Ok(Box::new(UnsupportedRuntime::new(std::env::consts::OS)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unsupported_runtime_refuses() {
        let runtime = UnsupportedRuntime::new("macos");
        let err = runtime
            .launch(Path::new("/tmp"), &["sh".to_string()], &ImageCommand::default())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            pce_core::Error::Launch(LaunchError::UnsupportedPlatform { .. })
        ));
        assert!(err.to_string().contains("macos"));
        assert!(runtime.enter(Path::new("/tmp"), &[]).is_err());
        assert!(runtime.ensure_supported().is_err());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_platform_runtime_on_linux() {
        let runtime = platform_runtime(RuntimeConfig::default(), false).unwrap();
        assert_eq!(runtime.name(), "linux");
        assert!(runtime.ensure_supported().is_ok());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_platform_runtime_rejects_bad_config() {
        let config = RuntimeConfig::default().with_hostname("not valid");
        assert!(platform_runtime(config, false).is_err());
    }
}
