//! pce Image - image acquisition and root filesystem materialization
//!
//! Layers come from an [`ImageProvider`] and are applied bottom first by the
//! [`RootfsMaterializer`]. Every archive entry passes through the
//! [`ArchiveExtractor`], which refuses anything that would land outside the
//! destination root.

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod archive;
pub mod extract;
pub mod layer;
pub mod materialize;
pub mod path;
pub mod provider;
pub mod registry;

pub use archive::{archive_path, write_image_archive};
pub use extract::{ArchiveExtractor, ExtractSummary, extract};
pub use layer::{Compression, Layer, LayerSource};
pub use materialize::{MaterializedRoot, RootfsMaterializer};
pub use provider::{ImageProvider, MemoryProvider, PulledImage, parse_image_command};
pub use registry::RegistryProvider;
