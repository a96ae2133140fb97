//! Run command implementation
//!
//! Pulls the image, materializes it into a per-run temporary directory and
//! hands the root to the platform runtime. The exit code of the container
//! becomes the exit code of `pce`.

use std::path::Path;
use std::time::SystemTime;

use anyhow::{Context, Result};
use tempfile::TempDir;
use tracing::{debug, info, warn};

use pce_core::constants::ROOTFS_DIR;
use pce_core::{ContainerEvent, ImageReference, RuntimeConfig};
use pce_image::{
    ImageProvider, MaterializedRoot, PulledImage, RegistryProvider, RootfsMaterializer,
};
use pce_namespace::platform_runtime;

use crate::cli::RunArgs;

pub async fn execute(args: RunArgs, verbose: bool) -> Result<i32> {
    let config = args.runtime_config();
    config.validate().context("Invalid run options")?;

    let runtime = platform_runtime(config.clone(), verbose)?;
    runtime.ensure_supported()?;

    let image = ImageReference::new(&args.image)?;
    let pulled = RegistryProvider::new()
        .pull(&image)
        .await
        .with_context(|| format!("Failed to pull {image}"))?;

    let workdir = create_workdir(&config)?;
    debug!(path = %workdir.path().display(), "Created run directory");

    let root = materialize(&pulled, workdir.path().join(ROOTFS_DIR), &config).await?;

    ContainerEvent::RootfsReady {
        source: image.to_string(),
        layers: root.layers,
        timestamp: SystemTime::now(),
    }
    .emit_trace();

    let outcome = runtime
        .launch(&root.root, &args.command, &pulled.command)
        .await
        .context("Container failed");

    release_workdir(workdir, config.keep_rootfs);

    let process = outcome?;
    if process.state.success() {
        info!(pid = %process.pid, "Container exited successfully");
    } else {
        warn!(pid = %process.pid, state = %process.state, "Container exited with failure");
    }

    Ok(process.exit_code())
}

fn create_workdir(config: &RuntimeConfig) -> Result<TempDir> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(&config.temp_prefix);

    match &config.temp_root {
        Some(parent) => builder.tempdir_in(parent),
        None => builder.tempdir(),
    }
    .context("Failed to create run directory")
}

/// Extract the image layers on a blocking thread
pub async fn materialize(
    image: &PulledImage,
    root: impl AsRef<Path>,
    config: &RuntimeConfig,
) -> Result<MaterializedRoot> {
    let layers = image.layers.clone();
    let root = root.as_ref().to_path_buf();
    let materializer = RootfsMaterializer::new().with_absolute_symlinks(config.absolute_symlinks);

    info!(
        image = %image.reference,
        layers = layers.len(),
        size = %image.size(),
        "Extracting image"
    );

    tokio::task::spawn_blocking(move || materializer.materialize(&layers, &root))
        .await
        .context("Extraction task failed")?
        .with_context(|| format!("Failed to extract {}", image.reference))
}

/// Remove the run directory, or keep it when asked to
fn release_workdir(workdir: TempDir, keep: bool) {
    if keep {
        let path = workdir.keep();
        info!(path = %path.display(), "Keeping root filesystem");
        return;
    }

    let path = workdir.path().to_path_buf();
    if let Err(e) = workdir.close() {
        warn!(path = %path.display(), error = %e, "Failed to remove run directory");
    } else {
        debug!(path = %path.display(), "Removed run directory");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workdir_uses_prefix() {
        let parent = tempfile::tempdir().unwrap();
        let config = RuntimeConfig::new().with_temp_root(parent.path());

        let workdir = create_workdir(&config).unwrap();
        let name = workdir.path().file_name().unwrap().to_string_lossy().into_owned();

        assert!(name.starts_with("pce-"));
        assert_eq!(workdir.path().parent().unwrap(), parent.path());
    }

    #[test]
    fn test_release_workdir() {
        let parent = tempfile::tempdir().unwrap();
        let config = RuntimeConfig::new().with_temp_root(parent.path());

        let removed = create_workdir(&config).unwrap();
        let removed_path = removed.path().to_path_buf();
        release_workdir(removed, false);
        assert!(!removed_path.exists());

        let kept = create_workdir(&config).unwrap();
        let kept_path = kept.path().to_path_buf();
        std::fs::create_dir(kept_path.join(ROOTFS_DIR)).unwrap();
        release_workdir(kept, true);
        assert!(kept_path.join(ROOTFS_DIR).is_dir());
    }
}
