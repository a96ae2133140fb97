//! Path containment for archive extraction
//!
//! Two layers of checks keep every extracted object under the destination
//! root:
//!
//! - [`clean_entry_path`] normalizes a raw entry name lexically and rejects
//!   absolute names and names that climb above their start.
//! - [`resolve_in_root`] walks a path through the files already on disk,
//!   following symlinks the way the kernel would once the root is the
//!   process root, and fails if the walk ever leaves the root.

use std::ffi::OsString;
use std::fs;
use std::path::{Component, Path, PathBuf};

use pce_core::AbsoluteSymlinks;
use pce_core::constants::MAX_SYMLINK_HOPS;

/// Normalize a raw entry name into a path relative to the root
///
/// `.` components are dropped and `..` components cancel the preceding
/// component. The empty result stands for the root itself.
///
/// # Errors
/// Returns the violated rule if the name is absolute or climbs above the root
pub fn clean_entry_path(raw: &Path) -> Result<PathBuf, String> {
    let mut cleaned = PathBuf::new();

    for component in raw.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => {
                return Err("absolute entry name".to_string());
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if !cleaned.pop() {
                    return Err("entry name climbs above the root".to_string());
                }
            }
            Component::Normal(name) => cleaned.push(name),
        }
    }

    Ok(cleaned)
}

#[derive(Debug)]
enum Part {
    Root,
    Parent,
    Name(OsString),
}

fn parts_of(path: &Path) -> Vec<Part> {
    path.components()
        .filter_map(|component| match component {
            Component::Prefix(_) | Component::RootDir => Some(Part::Root),
            Component::CurDir => None,
            Component::ParentDir => Some(Part::Parent),
            Component::Normal(name) => Some(Part::Name(name.to_os_string())),
        })
        .collect()
}

/// Resolve `path` starting at `start`, following symlinks that already exist
/// under `root`
///
/// `root` must be canonical and `start` must be `root` or a directory below
/// it without symlink components. Components that do not exist yet are
/// appended as-is. The returned path never contains an existing symlink
/// except possibly as its final component when `follow_last` is false.
///
/// # Errors
/// Returns the violated rule if the walk leaves `root`, meets an absolute
/// symlink under [`AbsoluteSymlinks::Reject`], or exceeds the hop limit
pub fn resolve_in_root(
    root: &Path,
    start: &Path,
    path: &Path,
    absolute: AbsoluteSymlinks,
    follow_last: bool,
) -> Result<PathBuf, String> {
    if !start.starts_with(root) {
        return Err(format!("{} is outside the root", start.display()));
    }

    let mut current = start.to_path_buf();
    let mut hops = 0usize;

    // Stack of pending parts, next part on top.
    let mut pending = parts_of(path);
    pending.reverse();

    while let Some(part) = pending.pop() {
        match part {
            Part::Root => match absolute {
                AbsoluteSymlinks::Reject => {
                    return Err(format!("absolute target {}", path.display()));
                }
                AbsoluteSymlinks::RootRelative => current = root.to_path_buf(),
            },
            Part::Parent => {
                if current == root {
                    return Err(format!("{} climbs above the root", path.display()));
                }
                current.pop();
            }
            Part::Name(name) => {
                let next = current.join(&name);
                let is_last = pending.is_empty();

                let is_symlink = fs::symlink_metadata(&next)
                    .map(|meta| meta.file_type().is_symlink())
                    .unwrap_or(false);

                if !is_symlink || (is_last && !follow_last) {
                    current = next;
                    continue;
                }

                hops += 1;
                if hops > MAX_SYMLINK_HOPS {
                    return Err(format!("too many symlinks resolving {}", path.display()));
                }

                let link = fs::read_link(&next)
                    .map_err(|e| format!("cannot read symlink {}: {e}", next.display()))?;

                let mut expanded = parts_of(&link);
                if matches!(expanded.first(), Some(Part::Root)) {
                    match absolute {
                        AbsoluteSymlinks::Reject => {
                            return Err(format!(
                                "{} passes through absolute symlink {}",
                                path.display(),
                                next.display()
                            ));
                        }
                        AbsoluteSymlinks::RootRelative => {
                            expanded.remove(0);
                            current = root.to_path_buf();
                        }
                    }
                }

                pending.extend(expanded.into_iter().rev());
            }
        }
    }

    if current.starts_with(root) {
        Ok(current)
    } else {
        Err(format!("{} resolves outside the root", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;

    #[test]
    fn test_clean_plain_names() {
        assert_eq!(clean_entry_path(Path::new("a/b/c")).unwrap(), Path::new("a/b/c"));
        assert_eq!(clean_entry_path(Path::new("./a/./b/")).unwrap(), Path::new("a/b"));
        assert_eq!(clean_entry_path(Path::new("a/../b")).unwrap(), Path::new("b"));
        assert_eq!(clean_entry_path(Path::new("./")).unwrap(), Path::new(""));
    }

    #[test]
    fn test_clean_rejects_escapes() {
        assert!(clean_entry_path(Path::new("../x")).is_err());
        assert!(clean_entry_path(Path::new("../../etc/passwd")).is_err());
        assert!(clean_entry_path(Path::new("a/../../x")).is_err());
        assert!(clean_entry_path(Path::new("/etc/passwd")).is_err());
    }

    #[test]
    fn test_resolve_plain_path() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();

        let resolved = resolve_in_root(
            &root,
            &root,
            Path::new("usr/bin/../lib"),
            AbsoluteSymlinks::Reject,
            true,
        )
        .unwrap();
        assert_eq!(resolved, root.join("usr/lib"));
    }

    #[test]
    fn test_resolve_rejects_parent_of_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();

        let result = resolve_in_root(
            &root,
            &root,
            Path::new("../outside"),
            AbsoluteSymlinks::Reject,
            true,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_resolve_follows_relative_symlink() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        fs::create_dir_all(root.join("usr/lib")).unwrap();
        symlink("usr/lib", root.join("lib")).unwrap();

        let resolved = resolve_in_root(
            &root,
            &root,
            Path::new("lib/libc.so"),
            AbsoluteSymlinks::Reject,
            true,
        )
        .unwrap();
        assert_eq!(resolved, root.join("usr/lib/libc.so"));
    }

    #[test]
    fn test_resolve_catches_chained_escape() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        symlink(".", root.join("here")).unwrap();

        // Lexically "here/here/.." stays inside, physically it is the parent of root.
        let result = resolve_in_root(
            &root,
            &root,
            Path::new("here/here/.."),
            AbsoluteSymlinks::Reject,
            true,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_resolve_absolute_policy() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let start = root.join("bin");

        assert!(
            resolve_in_root(&root, &start, Path::new("/bin/busybox"), AbsoluteSymlinks::Reject, true)
                .is_err()
        );

        let resolved = resolve_in_root(
            &root,
            &start,
            Path::new("/bin/busybox"),
            AbsoluteSymlinks::RootRelative,
            true,
        )
        .unwrap();
        assert_eq!(resolved, root.join("bin/busybox"));
    }

    #[test]
    fn test_resolve_keeps_last_symlink_when_asked() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        symlink("target", root.join("link")).unwrap();

        let resolved =
            resolve_in_root(&root, &root, Path::new("link"), AbsoluteSymlinks::Reject, false)
                .unwrap();
        assert_eq!(resolved, root.join("link"));
    }
}
