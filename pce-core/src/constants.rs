//! Limits, defaults and well-known values shared across pce crates

use std::time::Duration;

/// Maximum image reference length in bytes
pub const MAX_IMAGE_REF_LEN: usize = 512;

/// Characters allowed in an image reference besides ASCII alphanumerics
pub const IMAGE_REF_VALID_CHARS: &str = "/:.-_@";

/// Maximum number of layers accepted from a manifest
pub const MAX_LAYERS: usize = 128;

/// Maximum size of a single compressed layer blob (512 MiB)
pub const MAX_LAYER_SIZE: u64 = 512 * 1024 * 1024;

/// Upper bound for each registry round-trip
pub const IMAGE_PULL_TIMEOUT: Duration = Duration::from_secs(300);

/// Hostname set inside the UTS namespace
pub const DEFAULT_HOSTNAME: &str = "container";

/// Time between the graceful SIGTERM and the forced SIGKILL
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// `PATH` exported to the container when the environment has none
pub const DEFAULT_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// Prefix of the per-run temporary directory
pub const TEMP_DIR_PREFIX: &str = "pce-";

/// Name of the root filesystem directory inside the per-run directory
pub const ROOTFS_DIR: &str = "rootfs";

/// Subcommand that selects the in-namespace code path on re-entry
pub const REENTRY_SUBCOMMAND: &str = "internalrun";

/// Mode given to extracted directories and regular files
pub const EXTRACTED_MODE: u32 = 0o755;

/// Symlink hops followed while resolving a link target
pub const MAX_SYMLINK_HOPS: usize = 40;

/// OCI layer, uncompressed tar
pub const OCI_LAYER_MEDIA_TYPE_TAR: &str = "application/vnd.oci.image.layer.v1.tar";

/// OCI layer, gzip compressed tar
pub const OCI_LAYER_MEDIA_TYPE_GZIP: &str = "application/vnd.oci.image.layer.v1.tar+gzip";

/// OCI layer, zstd compressed tar
pub const OCI_LAYER_MEDIA_TYPE_ZSTD: &str = "application/vnd.oci.image.layer.v1.tar+zstd";

/// Docker v2 layer, gzip compressed tar
pub const DOCKER_LAYER_MEDIA_TYPE_GZIP: &str = "application/vnd.docker.image.rootfs.diff.tar.gzip";

/// Docker v2 layer, uncompressed tar
pub const DOCKER_LAYER_MEDIA_TYPE_TAR: &str = "application/vnd.docker.image.rootfs.diff.tar";
