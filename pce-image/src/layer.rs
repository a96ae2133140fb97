//! Image layers and their decompression

use std::fmt;
use std::io::Read;

use bytes::{Buf, Bytes};
use flate2::read::GzDecoder;

use pce_core::{ProviderError, Result};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Anything the materializer can read an uncompressed tar stream from
pub trait LayerSource {
    /// Digest or other name used in log lines and errors
    fn describe(&self) -> &str;

    /// Open a fresh uncompressed tar stream
    ///
    /// # Errors
    /// Returns error if the layer cannot be decoded
    fn open(&self) -> Result<Box<dyn Read + '_>>;
}

/// Compression applied to a layer blob
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// Plain tar
    None,
    /// gzip compressed tar
    Gzip,
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "tar"),
            Self::Gzip => write!(f, "tar+gzip"),
        }
    }
}

/// One layer blob as delivered by an image provider
#[derive(Debug, Clone)]
pub struct Layer {
    digest: String,
    media_type: String,
    data: Bytes,
}

impl Layer {
    /// Create a layer from its raw blob
    #[must_use]
    pub fn new(digest: impl Into<String>, media_type: impl Into<String>, data: Bytes) -> Self {
        Self {
            digest: digest.into(),
            media_type: media_type.into(),
            data,
        }
    }

    /// Content digest
    #[must_use]
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Media type announced by the manifest
    #[must_use]
    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    /// Raw, possibly compressed blob
    #[must_use]
    pub const fn data(&self) -> &Bytes {
        &self.data
    }

    /// Blob size in bytes
    #[must_use]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Work out how the blob is compressed
    ///
    /// The media type decides when it names a compression; otherwise the
    /// gzip magic bytes are checked.
    ///
    /// # Errors
    /// Returns [`ProviderError::UnsupportedMediaType`] for zstd layers
    pub fn compression(&self) -> Result<Compression> {
        let media_type = self.media_type.as_str();

        if media_type.ends_with("zstd") {
            return Err(ProviderError::UnsupportedMediaType {
                digest: self.digest.clone(),
                media_type: self.media_type.clone(),
            }
            .into());
        }

        if media_type.ends_with("gzip") || self.data.starts_with(&GZIP_MAGIC) {
            Ok(Compression::Gzip)
        } else {
            Ok(Compression::None)
        }
    }
}

impl LayerSource for Layer {
    fn describe(&self) -> &str {
        &self.digest
    }

    fn open(&self) -> Result<Box<dyn Read + '_>> {
        let reader = self.data.clone().reader();

        Ok(match self.compression()? {
            Compression::None => Box::new(reader),
            Compression::Gzip => Box::new(GzDecoder::new(reader)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression as Level;
    use flate2::write::GzEncoder;
    use pce_core::constants::{
        DOCKER_LAYER_MEDIA_TYPE_GZIP, OCI_LAYER_MEDIA_TYPE_GZIP, OCI_LAYER_MEDIA_TYPE_TAR,
        OCI_LAYER_MEDIA_TYPE_ZSTD,
    };
    use std::io::Write;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Level::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_compression_from_media_type() {
        let layer = Layer::new("sha256:a", OCI_LAYER_MEDIA_TYPE_GZIP, Bytes::new());
        assert_eq!(layer.compression().unwrap(), Compression::Gzip);

        let layer = Layer::new("sha256:b", DOCKER_LAYER_MEDIA_TYPE_GZIP, Bytes::new());
        assert_eq!(layer.compression().unwrap(), Compression::Gzip);

        let layer = Layer::new("sha256:c", OCI_LAYER_MEDIA_TYPE_TAR, Bytes::from_static(b"x"));
        assert_eq!(layer.compression().unwrap(), Compression::None);
    }

    #[test]
    fn test_compression_sniffed_from_magic() {
        let layer = Layer::new("sha256:d", "", Bytes::from(gzip(b"hello")));
        assert_eq!(layer.compression().unwrap(), Compression::Gzip);
    }

    #[test]
    fn test_zstd_is_unsupported() {
        let layer = Layer::new("sha256:e", OCI_LAYER_MEDIA_TYPE_ZSTD, Bytes::new());
        assert!(matches!(
            layer.compression(),
            Err(pce_core::Error::Provider(ProviderError::UnsupportedMediaType { .. }))
        ));
    }

    #[test]
    fn test_open_decompresses() {
        let layer = Layer::new("sha256:f", OCI_LAYER_MEDIA_TYPE_GZIP, Bytes::from(gzip(b"payload")));

        let mut out = String::new();
        layer.open().unwrap().read_to_string(&mut out).unwrap();
        assert_eq!(out, "payload");

        // A second open starts from the beginning again.
        let mut again = String::new();
        layer.open().unwrap().read_to_string(&mut again).unwrap();
        assert_eq!(again, "payload");
    }
}
