//! Virtual filesystem.
//!
//! Reads go through an ordered search path of mounts; the first mount that
//! has a path wins. Writes always land in a single real write directory.
//!
//! Virtual paths are `/`-separated and relative to the virtual root. A
//! leading `/` is ignored and `..` is rejected, so nothing can escape a
//! mount.
//!
//! # Mount sources
//!
//! - [`MountSource::Directory`] - a real directory, read live
//! - [`MountSource::Archive`] - a tar archive, read into memory once
//! - [`MountSource::Tree`] - a prepared [`MemoryTree`]
//! - [`MountSource::Embedded`] - an `include_dir!` tree compiled into the binary

mod tree;

pub use tree::MemoryTree;

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use include_dir::Dir;

use crate::error::{Error, Result};

/// What a virtual path refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FileKind {
    Absent,
    File,
    Directory,
}

impl FileKind {
    /// Numeric code exposed to scripts: 0 absent, 1 file, 2 directory.
    pub fn code(self) -> i64 {
        match self {
            FileKind::Absent => 0,
            FileKind::File => 1,
            FileKind::Directory => 2,
        }
    }
}

/// Where a mount's content comes from.
pub enum MountSource {
    Directory(PathBuf),
    Archive(PathBuf),
    Tree(MemoryTree),
    Embedded(&'static Dir<'static>),
}

enum Backend {
    Directory(PathBuf),
    Tree { tree: MemoryTree, origin: String },
}

impl Backend {
    fn kind(&self, rel: &str) -> FileKind {
        match self {
            Backend::Directory(root) => match fs::metadata(root.join(rel)) {
                Ok(meta) if meta.is_dir() => FileKind::Directory,
                Ok(_) => FileKind::File,
                Err(_) => FileKind::Absent,
            },
            Backend::Tree { tree, .. } => tree.kind(rel),
        }
    }

    fn read(&self, rel: &str) -> Result<Vec<u8>> {
        match self {
            Backend::Directory(root) => {
                let path = root.join(rel);
                fs::read(&path).map_err(|e| Error::io(path, e))
            }
            Backend::Tree { tree, .. } => tree
                .read(rel)
                .map(<[u8]>::to_vec)
                .ok_or_else(|| Error::NotFound(rel.to_string())),
        }
    }

    fn list(&self, rel: &str) -> Result<Vec<String>> {
        match self {
            Backend::Directory(root) => {
                let path = root.join(rel);
                let entries = fs::read_dir(&path).map_err(|e| Error::io(&path, e))?;
                Ok(entries
                    .flatten()
                    .map(|entry| entry.file_name().to_string_lossy().into_owned())
                    .collect())
            }
            Backend::Tree { tree, .. } => Ok(tree.list(rel)),
        }
    }

    fn describe(&self) -> String {
        match self {
            Backend::Directory(root) => root.display().to_string(),
            Backend::Tree { origin, .. } => origin.clone(),
        }
    }
}

struct Mount {
    point: String,
    backend: Backend,
}

enum Resolved<'a> {
    /// The path lies inside the mount, at this relative location.
    Inside(&'a str),
    /// The path is a parent of the mount point; the mount contributes
    /// this child name to listings.
    Ancestor(&'a str),
    Outside,
}

impl Mount {
    fn resolve<'a>(&'a self, path: &'a str) -> Resolved<'a> {
        let point = self.point.as_str();
        if point.is_empty() {
            return Resolved::Inside(path);
        }
        if path == point {
            return Resolved::Inside("");
        }
        if let Some(rest) = path.strip_prefix(point).and_then(|r| r.strip_prefix('/')) {
            return Resolved::Inside(rest);
        }

        let below = if path.is_empty() {
            Some(point)
        } else {
            point.strip_prefix(path).and_then(|r| r.strip_prefix('/'))
        };
        match below {
            Some(rest) => Resolved::Ancestor(rest.split('/').next().unwrap_or(rest)),
            None => Resolved::Outside,
        }
    }
}

/// Normalise a virtual path: strip separators and `.`, reject `..`.
pub fn normalize(path: &str) -> Result<String> {
    let mut parts = Vec::new();
    for part in path.split(['/', '\\']) {
        match part {
            "" | "." => continue,
            ".." => return Err(Error::InvalidPath(path.to_string())),
            other => parts.push(other),
        }
    }
    Ok(parts.join("/"))
}

/// The virtual filesystem: an ordered search path plus a write directory.
#[derive(Default)]
pub struct Vfs {
    mounts: RwLock<Vec<Mount>>,
    write_dir: RwLock<Option<PathBuf>>,
}

impl Vfs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a mount to the search path.
    ///
    /// With `append` the mount is searched last, otherwise first.
    pub fn mount(&self, source: MountSource, mount_point: &str, append: bool) -> Result<()> {
        let point = normalize(mount_point)?;
        let backend = match source {
            MountSource::Directory(root) => {
                if !root.is_dir() {
                    return Err(Error::NotFound(format!(
                        "mount directory {}",
                        root.display()
                    )));
                }
                Backend::Directory(root)
            }
            MountSource::Archive(path) => Backend::Tree {
                tree: MemoryTree::from_tar_file(&path)?,
                origin: path.display().to_string(),
            },
            MountSource::Tree(tree) => Backend::Tree {
                tree,
                origin: "<memory>".to_string(),
            },
            MountSource::Embedded(dir) => Backend::Tree {
                tree: MemoryTree::from_embedded(dir),
                origin: "<embedded>".to_string(),
            },
        };

        log::debug!(
            "[vfs] mounting {} at '/{}'{}",
            backend.describe(),
            point,
            if append { " (append)" } else { "" }
        );

        let mount = Mount { point, backend };
        let mut mounts = self.mounts.write().unwrap_or_else(PoisonError::into_inner);
        if append {
            mounts.push(mount);
        } else {
            mounts.insert(0, mount);
        }
        Ok(())
    }

    /// Number of mounts on the search path.
    pub fn mount_count(&self) -> usize {
        self.mounts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Set the directory `write` saves into, creating it if needed.
    pub fn set_write_dir(&self, path: impl Into<PathBuf>) -> Result<()> {
        let path = path.into();
        fs::create_dir_all(&path).map_err(|e| Error::io(&path, e))?;
        log::debug!("[vfs] write dir set to {}", path.display());
        *self.write_dir.write().unwrap_or_else(PoisonError::into_inner) = Some(path);
        Ok(())
    }

    pub fn write_dir(&self) -> Option<PathBuf> {
        self.write_dir
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Classify a virtual path.
    pub fn kind(&self, path: &str) -> Result<FileKind> {
        let path = normalize(path)?;
        let mounts = self.mounts.read().unwrap_or_else(PoisonError::into_inner);
        for mount in mounts.iter() {
            match mount.resolve(&path) {
                Resolved::Inside(rel) => match mount.backend.kind(rel) {
                    FileKind::Absent => continue,
                    found => return Ok(found),
                },
                Resolved::Ancestor(_) => return Ok(FileKind::Directory),
                Resolved::Outside => continue,
            }
        }
        Ok(FileKind::Absent)
    }

    pub fn exists(&self, path: &str) -> bool {
        matches!(self.kind(path), Ok(FileKind::File | FileKind::Directory))
    }

    /// Read a file from the first mount that has it.
    pub fn read(&self, path: &str) -> Result<Vec<u8>> {
        let path = normalize(path)?;
        let mounts = self.mounts.read().unwrap_or_else(PoisonError::into_inner);
        for mount in mounts.iter() {
            match mount.resolve(&path) {
                Resolved::Inside(rel) => match mount.backend.kind(rel) {
                    FileKind::File => return mount.backend.read(rel),
                    FileKind::Directory => {
                        return Err(Error::NotFound(format!("{} is a directory", path)))
                    }
                    FileKind::Absent => continue,
                },
                Resolved::Ancestor(_) => {
                    return Err(Error::NotFound(format!("{} is a directory", path)))
                }
                Resolved::Outside => continue,
            }
        }
        Err(Error::NotFound(path))
    }

    /// Write `data` to `path` below the write directory.
    pub fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        let rel = normalize(path)?;
        if rel.is_empty() {
            return Err(Error::InvalidPath(path.to_string()));
        }
        let root = self.write_dir().ok_or_else(|| {
            Error::io(
                &rel,
                std::io::Error::new(std::io::ErrorKind::NotFound, "no write directory set"),
            )
        })?;

        let target = root.join(&rel);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        fs::write(&target, data).map_err(|e| Error::io(&target, e))
    }

    /// Names directly below `path`, merged across mounts, sorted.
    pub fn list(&self, path: &str) -> Result<Vec<String>> {
        let path = normalize(path)?;
        let mounts = self.mounts.read().unwrap_or_else(PoisonError::into_inner);
        let mut names = BTreeSet::new();
        let mut found = false;

        for mount in mounts.iter() {
            match mount.resolve(&path) {
                Resolved::Inside(rel) => {
                    if mount.backend.kind(rel) == FileKind::Directory {
                        found = true;
                        names.extend(mount.backend.list(rel)?);
                    }
                }
                Resolved::Ancestor(child) => {
                    found = true;
                    names.insert(child.to_string());
                }
                Resolved::Outside => {}
            }
        }

        if found {
            Ok(names.into_iter().collect())
        } else {
            Err(Error::NotFound(path))
        }
    }

    /// Description of the mount a path would be read from.
    pub fn real_dir(&self, path: &str) -> Option<String> {
        let path = normalize(path).ok()?;
        let mounts = self.mounts.read().unwrap_or_else(PoisonError::into_inner);
        mounts.iter().find_map(|mount| match mount.resolve(&path) {
            Resolved::Inside(rel) if mount.backend.kind(rel) != FileKind::Absent => {
                Some(mount.backend.describe())
            }
            _ => None,
        })
    }
}

impl std::fmt::Debug for Vfs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vfs")
            .field("mounts", &self.mount_count())
            .field("write_dir", &self.write_dir())
            .finish()
    }
}

/// Read a file from the real filesystem, bypassing the mounts.
pub fn read_raw(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| Error::io(path, e))
}

/// Write a file to the real filesystem, bypassing the write directory.
pub fn write_raw(path: &Path, data: &[u8]) -> Result<()> {
    fs::write(path, data).map_err(|e| Error::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(files: &[(&str, &str)]) -> MountSource {
        let mut tree = MemoryTree::new();
        for (path, content) in files {
            tree.insert(path, content.as_bytes().to_vec()).unwrap();
        }
        MountSource::Tree(tree)
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("/a//b/./c").unwrap(), "a/b/c");
        assert_eq!(normalize("").unwrap(), "");
        assert!(matches!(normalize("a/../b"), Err(Error::InvalidPath(_))));
    }

    #[test]
    fn test_first_mount_wins() {
        let vfs = Vfs::new();
        vfs.mount(tree(&[("a.txt", "appended")]), "/", true).unwrap();
        vfs.mount(tree(&[("a.txt", "prepended")]), "/", false).unwrap();
        assert_eq!(vfs.read("a.txt").unwrap(), b"prepended");
    }

    #[test]
    fn test_listing_merges_mounts() {
        let vfs = Vfs::new();
        vfs.mount(tree(&[("x.txt", "1"), ("shared.txt", "1")]), "/", true)
            .unwrap();
        vfs.mount(tree(&[("y.txt", "2"), ("shared.txt", "2")]), "/", true)
            .unwrap();
        assert_eq!(vfs.list("/").unwrap(), vec!["shared.txt", "x.txt", "y.txt"]);
    }

    #[test]
    fn test_mount_point_prefix() {
        let vfs = Vfs::new();
        vfs.mount(tree(&[("boot.rhai", "")]), "core/scripts", true)
            .unwrap();

        assert_eq!(vfs.kind("core/scripts/boot.rhai").unwrap(), FileKind::File);
        assert_eq!(vfs.kind("core").unwrap(), FileKind::Directory);
        assert_eq!(vfs.kind("boot.rhai").unwrap(), FileKind::Absent);
        assert_eq!(vfs.list("").unwrap(), vec!["core"]);
        assert_eq!(vfs.list("core").unwrap(), vec!["scripts"]);
        assert!(matches!(vfs.read("core"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let vfs = Vfs::new();
        assert!(matches!(vfs.read("missing.txt"), Err(Error::NotFound(_))));
        assert!(matches!(vfs.list("nowhere"), Err(Error::NotFound(_))));
        assert_eq!(vfs.kind("missing.txt").unwrap(), FileKind::Absent);
    }

    #[test]
    fn test_write_requires_write_dir() {
        let vfs = Vfs::new();
        assert!(matches!(vfs.write("out.bin", b"x"), Err(Error::Io { .. })));
    }

    #[test]
    fn test_write_then_read_through_mount() {
        let dir = tempfile::tempdir().unwrap();
        let vfs = Vfs::new();
        vfs.set_write_dir(dir.path()).unwrap();
        vfs.mount(MountSource::Directory(dir.path().to_path_buf()), "save", true)
            .unwrap();

        vfs.write("nested/state.bin", &[1, 2, 3]).unwrap();
        assert_eq!(vfs.read("save/nested/state.bin").unwrap(), vec![1, 2, 3]);
        assert_eq!(vfs.kind("save/nested").unwrap(), FileKind::Directory);
        assert_eq!(
            vfs.real_dir("save/nested/state.bin"),
            Some(dir.path().display().to_string())
        );
    }

    #[test]
    fn test_directory_mount_must_exist() {
        let vfs = Vfs::new();
        let err = vfs
            .mount(MountSource::Directory(PathBuf::from("/definitely/not/here")), "", true)
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
