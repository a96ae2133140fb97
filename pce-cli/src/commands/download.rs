//! Download command implementation

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use pce_core::{AbsoluteSymlinks, ImageReference, RuntimeConfig};
use pce_image::{ImageProvider, PulledImage, RegistryProvider, archive_path, write_image_archive};

use crate::cli::DownloadArgs;
use crate::commands::run::materialize;

pub async fn execute(args: DownloadArgs) -> Result<i32> {
    let image = ImageReference::new(&args.image)?;

    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;

    let pulled = RegistryProvider::new()
        .pull(&image)
        .await
        .with_context(|| format!("Failed to pull {image}"))?;

    let written = if args.extract {
        let policy = if args.allow_absolute_symlinks {
            AbsoluteSymlinks::RootRelative
        } else {
            AbsoluteSymlinks::Reject
        };
        let config = RuntimeConfig::new().with_absolute_symlinks(policy);

        let root = extract_path(&args.output, &image);
        materialize(&pulled, &root, &config).await?;
        root
    } else {
        write_archive(pulled, &args.output).await?
    };

    info!(image = %image, path = %written.display(), "Download complete");
    println!("{}", written.display());

    Ok(0)
}

/// Directory an image is extracted into
fn extract_path(output: &Path, image: &ImageReference) -> PathBuf {
    output.join(image.base_name())
}

async fn write_archive(image: PulledImage, output: &Path) -> Result<PathBuf> {
    let path = archive_path(output, &image);
    let target = path.clone();

    tokio::task::spawn_blocking(move || write_image_archive(&image, &target))
        .await
        .context("Archive task failed")?
        .with_context(|| format!("Failed to write {}", path.display()))?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_path_uses_base_name() {
        let image = ImageReference::new("docker.io/library/alpine:3.19").unwrap();
        assert_eq!(
            extract_path(Path::new("/out"), &image),
            PathBuf::from("/out/alpine")
        );
    }
}
