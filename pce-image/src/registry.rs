//! OCI registry image provider
//!
//! Pulls the manifest and configuration, then every layer blob into memory.
//! Multi-platform indexes are resolved by the client to the host platform.
//! Each round-trip is bounded by [`IMAGE_PULL_TIMEOUT`], and layer counts and
//! sizes are checked against [`MAX_LAYERS`] and [`MAX_LAYER_SIZE`] before
//! anything is downloaded.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use oci_distribution::client::{ClientConfig, ClientProtocol};
use oci_distribution::secrets::RegistryAuth;
use oci_distribution::{Client, Reference};

use pce_core::constants::{IMAGE_PULL_TIMEOUT, MAX_LAYER_SIZE, MAX_LAYERS};
use pce_core::{ByteSize, ImageReference, ProviderError, Result};

use crate::layer::Layer;
use crate::provider::{ImageProvider, PulledImage, parse_image_command};

/// Provider backed by an OCI distribution registry
pub struct RegistryProvider {
    client: Client,
    timeout: Duration,
}

impl RegistryProvider {
    /// Anonymous HTTPS client
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: Client::new(ClientConfig {
                protocol: ClientProtocol::Https,
                ..Default::default()
            }),
            timeout: IMAGE_PULL_TIMEOUT,
        }
    }

    /// Override the per-request timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn pull_layer(
        &self,
        reference: &Reference,
        image: &ImageReference,
        descriptor: &oci_distribution::manifest::OciDescriptor,
    ) -> Result<Layer> {
        let declared = u64::try_from(descriptor.size).unwrap_or(0);
        if declared > MAX_LAYER_SIZE {
            return Err(ProviderError::ImageTooLarge {
                size: declared,
                limit: MAX_LAYER_SIZE,
            }
            .into());
        }

        tracing::debug!(
            digest = %descriptor.digest,
            size = %ByteSize::from_bytes(declared),
            media_type = %descriptor.media_type,
            "Pulling layer"
        );

        let mut data = Vec::new();
        tokio::time::timeout(self.timeout, async {
            self.client.pull_blob(reference, descriptor, &mut data).await
        })
        .await
        .map_err(|_| ProviderError::Timeout {
            operation: format!("pull layer {}", descriptor.digest),
            duration: self.timeout,
        })?
        .map_err(|e| ProviderError::ImagePull {
            reference: image.to_string(),
            reason: format!("layer {}: {e}", descriptor.digest),
        })?;

        let received = data.len() as u64;
        if received > MAX_LAYER_SIZE {
            return Err(ProviderError::ImageTooLarge {
                size: received,
                limit: MAX_LAYER_SIZE,
            }
            .into());
        }

        Ok(Layer::new(
            descriptor.digest.clone(),
            descriptor.media_type.clone(),
            Bytes::from(data),
        ))
    }
}

impl Default for RegistryProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a validated reference into the registry client's form
///
/// # Errors
/// Returns [`ProviderError::InvalidReference`] if the client rejects it
pub fn parse_reference(image: &ImageReference) -> Result<Reference> {
    image.as_str().parse().map_err(|e| {
        ProviderError::InvalidReference {
            reference: image.to_string(),
            reason: format!("{e}"),
        }
        .into()
    })
}

#[async_trait]
impl ImageProvider for RegistryProvider {
    fn name(&self) -> &'static str {
        "registry"
    }

    async fn pull(&self, image: &ImageReference) -> Result<PulledImage> {
        let reference = parse_reference(image)?;

        tracing::info!(image = %image, registry = %reference.registry(), "Pulling image");

        let (manifest, digest, config) = tokio::time::timeout(self.timeout, async {
            self.client
                .pull_manifest_and_config(&reference, &RegistryAuth::Anonymous)
                .await
        })
        .await
        .map_err(|_| ProviderError::Timeout {
            operation: format!("pull manifest for {image}"),
            duration: self.timeout,
        })?
        .map_err(|e| ProviderError::ImagePull {
            reference: image.to_string(),
            reason: e.to_string(),
        })?;

        if manifest.layers.len() > MAX_LAYERS {
            return Err(ProviderError::ImagePull {
                reference: image.to_string(),
                reason: format!("too many layers: {} > {MAX_LAYERS}", manifest.layers.len()),
            }
            .into());
        }

        let mut layers = Vec::with_capacity(manifest.layers.len());
        for descriptor in &manifest.layers {
            layers.push(self.pull_layer(&reference, image, descriptor).await?);
        }

        let pulled = PulledImage {
            reference: image.clone(),
            digest,
            layers,
            command: parse_image_command(&config)?,
            config,
        };

        tracing::info!(
            image = %image,
            digest = %pulled.digest,
            layers = pulled.layers.len(),
            size = %pulled.size(),
            "Image pulled"
        );

        Ok(pulled)
    }
}
