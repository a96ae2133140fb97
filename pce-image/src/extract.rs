//! Secure tar extraction into a destination root
//!
//! Entries are applied in stream order. Every name and link target is
//! checked twice: lexically with [`clean_entry_path`] and physically with
//! [`resolve_in_root`] against what earlier entries already put on disk.
//! The first failing entry aborts the whole extraction; entries written
//! before it stay in place.

use std::fs::{self, DirBuilder, OpenOptions, Permissions};
use std::io::{self, Read};
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

use tar::{Archive, Entry, EntryType};

use pce_core::constants::EXTRACTED_MODE;
use pce_core::{AbsoluteSymlinks, ExtractError, Result};

use crate::path::{clean_entry_path, resolve_in_root};

/// What an extraction wrote to disk
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    /// Directories created or confirmed
    pub directories: usize,
    /// Regular files written
    pub files: usize,
    /// Symbolic links created
    pub symlinks: usize,
    /// Hard links created
    pub hardlinks: usize,
    /// Device and FIFO entries that were not materialized
    pub skipped: Vec<String>,
}

impl ExtractSummary {
    /// Number of entries that were materialized
    #[must_use]
    pub const fn materialized(&self) -> usize {
        self.directories + self.files + self.symlinks + self.hardlinks
    }

    /// Fold another summary into this one
    pub fn merge(&mut self, other: Self) {
        self.directories += other.directories;
        self.files += other.files;
        self.symlinks += other.symlinks;
        self.hardlinks += other.hardlinks;
        self.skipped.extend(other.skipped);
    }
}

/// Applies tar streams to one destination root
#[derive(Debug, Clone)]
pub struct ArchiveExtractor {
    root: PathBuf,
    absolute_symlinks: AbsoluteSymlinks,
}

impl ArchiveExtractor {
    /// Create an extractor for `root`, creating the directory if needed
    ///
    /// # Errors
    /// Returns error if the root cannot be created or canonicalized
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        fs::create_dir_all(root)?;

        Ok(Self {
            root: root.canonicalize()?,
            absolute_symlinks: AbsoluteSymlinks::default(),
        })
    }

    /// Set the absolute symlink policy
    #[must_use]
    pub const fn with_absolute_symlinks(mut self, policy: AbsoluteSymlinks) -> Self {
        self.absolute_symlinks = policy;
        self
    }

    /// Canonical destination root
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Apply every entry of `stream` to the root
    ///
    /// # Errors
    /// Returns [`ExtractError`] for the first entry that escapes the root,
    /// has an unsupported type, or cannot be read or written
    pub fn extract<R: Read>(&self, stream: R) -> Result<ExtractSummary> {
        let mut archive = Archive::new(stream);
        let mut summary = ExtractSummary::default();

        let entries = archive.entries().map_err(|source| ExtractError::Io {
            entry: "archive header".to_string(),
            source,
        })?;

        let mut previous: Option<String> = None;

        for entry in entries {
            let mut entry = entry.map_err(|source| ExtractError::Io {
                entry: previous.as_ref().map_or_else(
                    || "first archive entry".to_string(),
                    |name| format!("entry after {name}"),
                ),
                source,
            })?;

            let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
            self.apply(&mut entry, &name, &mut summary)?;
            previous = Some(name);
        }

        tracing::debug!(
            root = %self.root.display(),
            directories = summary.directories,
            files = summary.files,
            symlinks = summary.symlinks,
            hardlinks = summary.hardlinks,
            skipped = summary.skipped.len(),
            "Archive extracted"
        );

        Ok(summary)
    }

    fn apply<R: Read>(
        &self,
        entry: &mut Entry<'_, R>,
        name: &str,
        summary: &mut ExtractSummary,
    ) -> Result<()> {
        let entry_type = entry.header().entry_type();

        match entry_type {
            EntryType::Directory => {
                self.create_directory(entry, name)?;
                summary.directories += 1;
            }
            // Pre-POSIX archives mark directories with a trailing slash only.
            EntryType::Regular if name.ends_with('/') => {
                self.create_directory(entry, name)?;
                summary.directories += 1;
            }
            EntryType::Regular | EntryType::Continuous => {
                self.write_file(entry, name)?;
                summary.files += 1;
            }
            EntryType::Symlink => {
                self.create_symlink(entry, name)?;
                summary.symlinks += 1;
            }
            EntryType::Link => {
                self.create_hardlink(entry, name)?;
                summary.hardlinks += 1;
            }
            EntryType::Char | EntryType::Block | EntryType::Fifo => {
                tracing::debug!(entry = %name, kind = ?entry_type, "Skipping special file");
                summary.skipped.push(name.to_string());
            }
            EntryType::XGlobalHeader
            | EntryType::XHeader
            | EntryType::GNULongName
            | EntryType::GNULongLink => {}
            other => {
                return Err(ExtractError::UnsupportedEntryType {
                    entry: name.to_string(),
                    kind: describe_type(other),
                }
                .into());
            }
        }

        Ok(())
    }

    /// Lexically clean the entry name, then resolve it physically
    ///
    /// The final component is only followed when `follow_last` is set.
    fn destination<R: Read>(
        &self,
        entry: &Entry<'_, R>,
        name: &str,
        follow_last: bool,
    ) -> Result<PathBuf> {
        let raw = entry.path().map_err(|source| io_error(name, source))?;
        self.contained(&raw, name, follow_last)
    }

    fn contained(&self, raw: &Path, name: &str, follow_last: bool) -> Result<PathBuf> {
        let cleaned = clean_entry_path(raw).map_err(|reason| escape(name, reason))?;

        let resolved = resolve_in_root(
            &self.root,
            &self.root,
            &cleaned,
            self.absolute_symlinks,
            follow_last,
        )
        .map_err(|reason| escape(name, reason))?;

        if !resolved.starts_with(&self.root) {
            return Err(escape(name, "resolves outside the root".to_string()));
        }

        Ok(resolved)
    }

    fn create_directory<R: Read>(&self, entry: &Entry<'_, R>, name: &str) -> Result<()> {
        let target = self.destination(entry, name, true)?;

        // A directory may replace a file or link left by an earlier layer.
        remove_unless(&target, fs::Metadata::is_dir).map_err(|source| io_error(name, source))?;

        DirBuilder::new()
            .recursive(true)
            .mode(EXTRACTED_MODE)
            .create(&target)
            .map_err(|source| io_error(name, source))?;

        Ok(())
    }

    fn write_file<R: Read>(&self, entry: &mut Entry<'_, R>, name: &str) -> Result<()> {
        let target = self.destination(entry, name, false)?;
        let target = self.leaf(target, name)?;

        self.prepare_parent(&target, name)?;
        remove_unless(&target, fs::Metadata::is_file).map_err(|source| io_error(name, source))?;

        // O_NOFOLLOW so a link swapped in at the leaf is never written through.
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(EXTRACTED_MODE)
            .custom_flags(libc::O_NOFOLLOW)
            .open(&target)
            .map_err(|source| io_error(name, source))?;

        io::copy(entry, &mut file).map_err(|source| io_error(name, source))?;

        file.set_permissions(Permissions::from_mode(EXTRACTED_MODE))
            .map_err(|source| io_error(name, source))?;

        Ok(())
    }

    fn create_symlink<R: Read>(&self, entry: &Entry<'_, R>, name: &str) -> Result<()> {
        let link_target = link_name(entry, name)?;
        let target = self.destination(entry, name, false)?;
        let target = self.leaf(target, name)?;

        let parent = target
            .parent()
            .map_or_else(|| self.root.clone(), Path::to_path_buf);

        // The link must resolve inside the root as seen from its own directory.
        resolve_in_root(
            &self.root,
            &parent,
            &link_target,
            self.absolute_symlinks,
            true,
        )
        .map_err(|reason| escape(name, format!("symlink target: {reason}")))?;

        self.prepare_parent(&target, name)?;
        remove_existing(&target).map_err(|source| io_error(name, source))?;

        std::os::unix::fs::symlink(&link_target, &target)
            .map_err(|source| io_error(name, source))?;

        Ok(())
    }

    fn create_hardlink<R: Read>(&self, entry: &Entry<'_, R>, name: &str) -> Result<()> {
        let link_target = link_name(entry, name)?;
        let source = self
            .contained(&link_target, name, false)
            .map_err(|err| match err {
                pce_core::Error::Extract(ExtractError::PathEscape { entry, reason }) => {
                    ExtractError::PathEscape {
                        entry,
                        reason: format!("hard link target: {reason}"),
                    }
                    .into()
                }
                other => other,
            })?;

        if fs::symlink_metadata(&source).is_err() {
            return Err(io_error(
                name,
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("hard link target {} does not exist", link_target.display()),
                ),
            ));
        }

        let target = self.destination(entry, name, false)?;
        let target = self.leaf(target, name)?;

        self.prepare_parent(&target, name)?;
        if target != source {
            remove_existing(&target).map_err(|source| io_error(name, source))?;
        }

        fs::hard_link(&source, &target).map_err(|source| io_error(name, source))?;

        Ok(())
    }

    /// Reject entries that resolve to the root itself
    fn leaf(&self, target: PathBuf, name: &str) -> Result<PathBuf> {
        if target == self.root {
            return Err(io_error(
                name,
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "entry resolves to the destination root",
                ),
            ));
        }
        Ok(target)
    }

    fn prepare_parent(&self, target: &Path, name: &str) -> Result<()> {
        if let Some(parent) = target.parent() {
            DirBuilder::new()
                .recursive(true)
                .mode(EXTRACTED_MODE)
                .create(parent)
                .map_err(|source| io_error(name, source))?;

            // The parent was built from resolved components; confirm nothing
            // moved it outside while creating it.
            let canonical = parent
                .canonicalize()
                .map_err(|source| io_error(name, source))?;
            if !canonical.starts_with(&self.root) {
                return Err(escape(name, "parent directory resolves outside the root".to_string()));
            }
        }
        Ok(())
    }
}

/// Extract `stream` into `root` with the default policy
///
/// # Errors
/// See [`ArchiveExtractor::extract`]
pub fn extract<R: Read>(stream: R, root: impl AsRef<Path>) -> Result<ExtractSummary> {
    ArchiveExtractor::new(root)?.extract(stream)
}

fn link_name<R: Read>(entry: &Entry<'_, R>, name: &str) -> Result<PathBuf> {
    entry
        .link_name()
        .map_err(|source| io_error(name, source))?
        .map(|target| target.into_owned())
        .ok_or_else(|| {
            io_error(
                name,
                io::Error::new(io::ErrorKind::InvalidData, "link entry without target"),
            )
        })
}

/// Remove whatever is at `path` unless it already has the wanted kind
fn remove_unless(path: &Path, wanted: fn(&fs::Metadata) -> bool) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if wanted(&meta) => Ok(()),
        Ok(_) => remove_existing(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

fn remove_existing(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

fn describe_type(entry_type: EntryType) -> String {
    match entry_type {
        EntryType::GNUSparse => "GNU sparse file".to_string(),
        other => format!("type flag {:?}", char::from(other.as_byte())),
    }
}

fn escape(name: &str, reason: String) -> pce_core::Error {
    ExtractError::PathEscape {
        entry: name.to_string(),
        reason,
    }
    .into()
}

fn io_error(name: &str, source: io::Error) -> pce_core::Error {
    ExtractError::Io {
        entry: name.to_string(),
        source,
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tar_with_dir(name: &str) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(EntryType::Directory);
        header.set_mode(0o700);
        header.set_size(0);
        builder
            .append_data(&mut header, name, io::empty())
            .unwrap();
        builder.into_inner().unwrap()
    }

    #[test]
    fn test_summary_merge() {
        let mut first = ExtractSummary {
            files: 2,
            skipped: vec!["dev/null".to_string()],
            ..Default::default()
        };
        first.merge(ExtractSummary {
            directories: 1,
            files: 1,
            ..Default::default()
        });

        assert_eq!(first.files, 3);
        assert_eq!(first.materialized(), 4);
        assert_eq!(first.skipped.len(), 1);
    }

    #[test]
    fn test_directory_entry() {
        let dir = tempfile::tempdir().unwrap();
        let summary = extract(tar_with_dir("etc/").as_slice(), dir.path()).unwrap();

        assert_eq!(summary.directories, 1);
        assert!(dir.path().join("etc").is_dir());
    }

    #[test]
    fn test_existing_directory_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("etc")).unwrap();

        let summary = extract(tar_with_dir("./etc").as_slice(), dir.path()).unwrap();
        assert_eq!(summary.directories, 1);
    }

    #[test]
    fn test_empty_archive() {
        let dir = tempfile::tempdir().unwrap();
        let data = tar::Builder::new(Vec::new()).into_inner().unwrap();

        let summary = extract(data.as_slice(), dir.path()).unwrap();
        assert_eq!(summary, ExtractSummary::default());
    }

    #[test]
    fn test_describe_type() {
        assert_eq!(describe_type(EntryType::GNUSparse), "GNU sparse file");
        assert_eq!(describe_type(EntryType::new(b'Z')), "type flag 'Z'");
    }
}
