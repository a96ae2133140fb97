//! Image provider abstraction
//!
//! The runtime only needs two things from an image: its layers in
//! application order and its default command. Any source that can deliver
//! those implements [`ImageProvider`].

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::Deserialize;

use pce_core::{ByteSize, ImageCommand, ImageReference, ProviderError, Result};

use crate::layer::Layer;

/// A fully fetched image
#[derive(Debug, Clone)]
pub struct PulledImage {
    /// Reference the image was requested by
    pub reference: ImageReference,
    /// Manifest digest reported by the source
    pub digest: String,
    /// Layers, bottom first
    pub layers: Vec<Layer>,
    /// Default entrypoint and arguments
    pub command: ImageCommand,
    /// Raw image configuration document
    pub config: String,
}

impl PulledImage {
    /// Total size of all layer blobs
    #[must_use]
    pub fn size(&self) -> ByteSize {
        self.layers
            .iter()
            .map(|layer| ByteSize::from(layer.size()))
            .fold(ByteSize::default(), |total, size| total + size)
    }
}

/// Source of container images
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &str;

    /// Fetch the image behind `reference`
    async fn pull(&self, reference: &ImageReference) -> Result<PulledImage>;
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    config: Option<ContainerConfig>,
}

#[derive(Debug, Default, Deserialize)]
struct ContainerConfig {
    #[serde(rename = "Entrypoint", default)]
    entrypoint: Option<Vec<String>>,
    #[serde(rename = "Cmd", default)]
    cmd: Option<Vec<String>>,
}

/// Read the default command out of an OCI image configuration document
///
/// # Errors
/// Returns error if the document is not valid JSON
pub fn parse_image_command(config: &str) -> Result<ImageCommand> {
    let file: ConfigFile = serde_json::from_str(config)?;
    let container = file.config.unwrap_or_default();

    Ok(ImageCommand::new(
        container.entrypoint.unwrap_or_default(),
        container.cmd.unwrap_or_default(),
    ))
}

/// In-memory provider, used for tests and preloaded images
#[derive(Debug, Clone, Default)]
pub struct MemoryProvider {
    images: Arc<RwLock<HashMap<ImageReference, PulledImage>>>,
}

impl MemoryProvider {
    /// Create an empty provider
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an image under its reference
    pub fn insert(&self, image: PulledImage) {
        if let Ok(mut images) = self.images.write() {
            images.insert(image.reference.clone(), image);
        }
    }
}

#[async_trait]
impl ImageProvider for MemoryProvider {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn pull(&self, reference: &ImageReference) -> Result<PulledImage> {
        let images = self.images.read().map_err(|_| ProviderError::ImagePull {
            reference: reference.to_string(),
            reason: "image table poisoned".to_string(),
        })?;

        images.get(reference).cloned().ok_or_else(|| {
            ProviderError::ImagePull {
                reference: reference.to_string(),
                reason: "image not found".to_string(),
            }
            .into()
        })
    }
}
