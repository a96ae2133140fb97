//! Minimal `/dev` and `/proc` skeleton inside the new root
//!
//! A real character device is created when the kernel allows it. Inside an
//! unprivileged user namespace `mknod` is refused, and a regular placeholder
//! file takes the device's place.

use std::fs::{self, DirBuilder, Permissions};
use std::io;
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use nix::errno::Errno;
use nix::sys::stat::{Mode, SFlag, makedev, mknod};

use pce_core::{EnterError, Result};

/// A device node seeded into `/dev`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceNode {
    /// File name under `/dev`
    pub name: &'static str,
    /// Major device number
    pub major: u64,
    /// Minor device number
    pub minor: u64,
    /// Whether the placeholder carries random-looking content
    pub random: bool,
}

/// Devices every container gets
pub const DEVICE_NODES: [DeviceNode; 4] = [
    DeviceNode {
        name: "null",
        major: 1,
        minor: 3,
        random: false,
    },
    DeviceNode {
        name: "zero",
        major: 1,
        minor: 5,
        random: false,
    },
    DeviceNode {
        name: "random",
        major: 1,
        minor: 8,
        random: true,
    },
    DeviceNode {
        name: "urandom",
        major: 1,
        minor: 9,
        random: true,
    },
];

/// How a device entry ended up on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seeded {
    /// Real character device
    Node,
    /// Regular file standing in for the device
    Placeholder,
    /// Something already existed at the path and was left alone
    Existing,
}

/// Create `proc` and `dev` under `root` and seed the standard devices
///
/// # Errors
/// Returns [`EnterError::Device`] if a directory or device entry cannot be
/// created
pub fn prepare_filesystem(root: &Path) -> Result<Vec<(DeviceNode, Seeded)>> {
    for dir in ["proc", "dev"] {
        let path = root.join(dir);
        DirBuilder::new()
            .recursive(true)
            .mode(0o755)
            .create(&path)
            .map_err(|source| device_error(&path, source))?;
    }

    let dev = root.join("dev");
    let mut seeded = Vec::with_capacity(DEVICE_NODES.len());

    for node in DEVICE_NODES {
        let outcome = seed_device(&dev, node)?;
        tracing::debug!(device = node.name, outcome = ?outcome, "Seeded device");
        seeded.push((node, outcome));
    }

    Ok(seeded)
}

fn seed_device(dev: &Path, node: DeviceNode) -> Result<Seeded> {
    let path = dev.join(node.name);

    if fs::symlink_metadata(&path).is_ok() {
        return Ok(Seeded::Existing);
    }

    let mode = Mode::from_bits_truncate(0o666);
    match mknod(&path, SFlag::S_IFCHR, mode, makedev(node.major, node.minor)) {
        Ok(()) => Ok(Seeded::Node),
        Err(Errno::EPERM | Errno::EACCES | Errno::EOPNOTSUPP) => {
            write_placeholder(&path, node)?;
            Ok(Seeded::Placeholder)
        }
        Err(e) => Err(device_error(&path, io::Error::from(e))),
    }
}

fn write_placeholder(path: &Path, node: DeviceNode) -> Result<()> {
    let content = if node.random {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_nanos());
        format!("random_data_placeholder_{nanos}")
    } else {
        String::new()
    };

    fs::write(path, content).map_err(|source| device_error(path, source))?;
    fs::set_permissions(path, Permissions::from_mode(0o666))
        .map_err(|source| device_error(path, source))?;

    Ok(())
}

fn device_error(path: &Path, source: io::Error) -> pce_core::Error {
    EnterError::Device {
        path: path.display().to_string(),
        source,
    }
    .into()
}
