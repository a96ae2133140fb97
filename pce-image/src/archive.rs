//! Image tarball export for the `download` command
//!
//! The tarball follows the `docker save` layout: a `manifest.json` index, the
//! image configuration and one file per layer blob, stored as delivered.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tar::{Builder, Header};

use pce_core::Result;

use crate::layer::{Compression, Layer};
use crate::provider::PulledImage;

const CONFIG_FILE: &str = "config.json";
const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ManifestEntry {
    config: String,
    repo_tags: Vec<String>,
    layers: Vec<String>,
}

/// Path of the tarball for `image` under `output_dir`
#[must_use]
pub fn archive_path(output_dir: &Path, image: &PulledImage) -> PathBuf {
    output_dir.join(format!("{}.tar", image.reference.base_name()))
}

fn layer_file_name(layer: &Layer) -> Result<String> {
    let hex = layer
        .digest()
        .split_once(':')
        .map_or(layer.digest(), |(_, hex)| hex);

    Ok(match layer.compression()? {
        Compression::None => format!("{hex}.tar"),
        Compression::Gzip => format!("{hex}.tar.gz"),
    })
}

fn append(builder: &mut Builder<impl Write>, name: &str, data: &[u8]) -> io::Result<()> {
    let mut header = Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    builder.append_data(&mut header, name, data)
}

/// Write `image` as a tarball at `path`
///
/// # Errors
/// Returns error if the file cannot be written
pub fn write_image_archive(image: &PulledImage, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    let mut builder = Builder::new(BufWriter::new(file));

    let mut layer_names = Vec::with_capacity(image.layers.len());
    for layer in &image.layers {
        let name = layer_file_name(layer)?;
        append(&mut builder, &name, layer.data())?;
        layer_names.push(name);
    }

    append(&mut builder, CONFIG_FILE, image.config.as_bytes())?;

    let manifest = vec![ManifestEntry {
        config: CONFIG_FILE.to_string(),
        repo_tags: vec![image.reference.to_string()],
        layers: layer_names,
    }];
    append(&mut builder, MANIFEST_FILE, &serde_json::to_vec_pretty(&manifest)?)?;

    builder.into_inner()?.flush()?;

    tracing::info!(
        image = %image.reference,
        path = %path.display(),
        layers = image.layers.len(),
        "Image archive written"
    );

    Ok(())
}
