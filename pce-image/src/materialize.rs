//! Root filesystem materialization
//!
//! Layers are applied bottom first into one directory, so later layers
//! overwrite earlier ones. Whiteout files are not interpreted.

use std::path::{Path, PathBuf};

use pce_core::{AbsoluteSymlinks, Error, Result};

use crate::extract::{ArchiveExtractor, ExtractSummary};
use crate::layer::LayerSource;

/// Outcome of materializing a root
#[derive(Debug, Clone, Default)]
pub struct MaterializedRoot {
    /// Canonical root path
    pub root: PathBuf,
    /// Number of layers applied
    pub layers: usize,
    /// Entries written over all layers
    pub summary: ExtractSummary,
}

/// Builds a root directory from image layers
#[derive(Debug, Clone, Copy, Default)]
pub struct RootfsMaterializer {
    absolute_symlinks: AbsoluteSymlinks,
}

impl RootfsMaterializer {
    /// Create a materializer with the default symlink policy
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the absolute symlink policy
    #[must_use]
    pub const fn with_absolute_symlinks(mut self, policy: AbsoluteSymlinks) -> Self {
        self.absolute_symlinks = policy;
        self
    }

    /// Apply `layers` in order into `root`
    ///
    /// # Errors
    /// Returns [`Error::Layer`] naming the first failing layer; layers after
    /// it are not applied
    pub fn materialize<L: LayerSource>(
        &self,
        layers: &[L],
        root: impl AsRef<Path>,
    ) -> Result<MaterializedRoot> {
        let extractor =
            ArchiveExtractor::new(root)?.with_absolute_symlinks(self.absolute_symlinks);

        let mut summary = ExtractSummary::default();

        for (index, layer) in layers.iter().enumerate() {
            tracing::debug!(layer = %layer.describe(), index, "Applying layer");

            let applied = layer
                .open()
                .and_then(|stream| extractor.extract(stream))
                .map_err(|source| {
                    tracing::error!(
                        layer = %layer.describe(),
                        index,
                        error = %source,
                        "Layer extraction failed"
                    );
                    Error::Layer {
                        index,
                        layer: layer.describe().to_string(),
                        source: Box::new(source),
                    }
                })?;

            summary.merge(applied);
        }

        tracing::info!(
            root = %extractor.root().display(),
            layers = layers.len(),
            entries = summary.materialized(),
            skipped = summary.skipped.len(),
            "Root filesystem materialized"
        );

        Ok(MaterializedRoot {
            root: extractor.root().to_path_buf(),
            layers: layers.len(),
            summary,
        })
    }
}
