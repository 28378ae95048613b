//! In-memory file trees.
//!
//! Archives and embedded script directories are flattened into a
//! [`MemoryTree`] when they are mounted, so lookups never touch the
//! archive or directory again.

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::path::Path;

use include_dir::Dir;

use super::{normalize, FileKind};
use crate::error::{Error, Result};

/// A read-only tree of files held in memory.
#[derive(Clone, Debug, Default)]
pub struct MemoryTree {
    files: BTreeMap<String, Cow<'static, [u8]>>,
    dirs: BTreeSet<String>,
}

impl MemoryTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file, creating its parent directories.
    pub fn insert(&mut self, path: &str, data: impl Into<Cow<'static, [u8]>>) -> Result<()> {
        let path = normalize(path)?;
        if path.is_empty() {
            return Err(Error::InvalidPath("cannot insert a file at the root".to_string()));
        }
        self.add_parents(&path);
        self.files.insert(path, data.into());
        Ok(())
    }

    /// Add an (empty) directory and its parents.
    pub fn insert_dir(&mut self, path: &str) -> Result<()> {
        let path = normalize(path)?;
        if !path.is_empty() {
            self.add_parents(&path);
            self.dirs.insert(path);
        }
        Ok(())
    }

    /// Read every regular file and directory of a tar stream.
    pub fn from_tar<R: Read>(reader: R) -> std::io::Result<Self> {
        let mut tree = Self::new();
        let mut archive = tar::Archive::new(reader);

        for entry in archive.entries()? {
            let mut entry = entry?;
            let path = entry.path()?.to_string_lossy().replace('\\', "/");
            let entry_type = entry.header().entry_type();

            let inserted = if entry_type.is_dir() {
                tree.insert_dir(&path)
            } else if entry_type.is_file() {
                // The header size is untrusted; let the buffer grow with what is read.
                let mut data = Vec::new();
                entry.read_to_end(&mut data)?;
                if data.len() as u64 != entry.size() {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        format!(
                            "archive entry '{}' declares {} bytes but holds {}",
                            path,
                            entry.size(),
                            data.len()
                        ),
                    ));
                }
                tree.insert(&path, data)
            } else {
                continue;
            };

            if let Err(e) = inserted {
                log::warn!("[vfs] skipping archive entry '{}': {}", path, e);
            }
        }

        Ok(tree)
    }

    /// Open and read a tar archive from disk.
    pub fn from_tar_file(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| Error::io(path, e))?;
        Self::from_tar(std::io::BufReader::new(file)).map_err(|e| Error::io(path, e))
    }

    /// Borrow the files of an `include_dir!` tree without copying them.
    pub fn from_embedded(dir: &'static Dir<'static>) -> Self {
        let mut tree = Self::new();
        tree.add_embedded(dir);
        tree
    }

    fn add_embedded(&mut self, dir: &'static Dir<'static>) {
        for file in dir.files() {
            let path = file.path().to_string_lossy().replace('\\', "/");
            if let Err(e) = self.insert(&path, file.contents()) {
                log::warn!("[vfs] skipping embedded file '{}': {}", path, e);
            }
        }
        for subdir in dir.dirs() {
            let path = subdir.path().to_string_lossy().replace('\\', "/");
            if let Err(e) = self.insert_dir(&path) {
                log::warn!("[vfs] skipping embedded directory '{}': {}", path, e);
            }
            self.add_embedded(subdir);
        }
    }

    fn add_parents(&mut self, path: &str) {
        let mut end = 0;
        while let Some(offset) = path[end..].find('/') {
            end += offset;
            self.dirs.insert(path[..end].to_string());
            end += 1;
        }
    }

    /// Number of files in the tree.
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub(crate) fn kind(&self, rel: &str) -> FileKind {
        if self.files.contains_key(rel) {
            FileKind::File
        } else if rel.is_empty() || self.dirs.contains(rel) {
            FileKind::Directory
        } else {
            FileKind::Absent
        }
    }

    pub(crate) fn read(&self, rel: &str) -> Option<&[u8]> {
        self.files.get(rel).map(|data| &**data)
    }

    pub(crate) fn list(&self, rel: &str) -> Vec<String> {
        let prefix = if rel.is_empty() {
            String::new()
        } else {
            format!("{}/", rel)
        };

        self.files
            .keys()
            .chain(self.dirs.iter())
            .filter_map(|path| path.strip_prefix(prefix.as_str()))
            .filter(|child| !child.is_empty() && !child.contains('/'))
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_creates_parents() {
        let mut tree = MemoryTree::new();
        tree.insert("a/b/c.txt", b"x".to_vec()).unwrap();
        assert_eq!(tree.kind("a"), FileKind::Directory);
        assert_eq!(tree.kind("a/b"), FileKind::Directory);
        assert_eq!(tree.kind("a/b/c.txt"), FileKind::File);
        assert_eq!(tree.kind("a/c"), FileKind::Absent);
        assert_eq!(tree.kind(""), FileKind::Directory);
    }

    #[test]
    fn test_list_direct_children_only() {
        let mut tree = MemoryTree::new();
        tree.insert("top.txt", b"1".to_vec()).unwrap();
        tree.insert("dir/inner.txt", b"2".to_vec()).unwrap();
        tree.insert("dir/deeper/x.txt", b"3".to_vec()).unwrap();

        let mut root = tree.list("");
        root.sort();
        assert_eq!(root, vec!["dir", "top.txt"]);

        let mut dir = tree.list("dir");
        dir.sort();
        assert_eq!(dir, vec!["deeper", "inner.txt"]);
    }

    #[test]
    fn test_from_tar() {
        let mut builder = tar::Builder::new(Vec::new());
        let data = b"print(1);";
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, "scripts/app.rhai", &data[..])
            .unwrap();
        let bytes = builder.into_inner().unwrap();

        let tree = MemoryTree::from_tar(&bytes[..]).unwrap();
        assert_eq!(tree.kind("scripts"), FileKind::Directory);
        assert_eq!(tree.read("scripts/app.rhai"), Some(&data[..]));
    }

    #[test]
    fn test_from_tar_rejects_oversized_header() {
        let mut builder = tar::Builder::new(Vec::new());
        let data = b"tiny";
        let mut header = tar::Header::new_gnu();
        header.set_path("huge.bin").unwrap();
        header.set_size(1u64 << 60);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append(&header, &data[..]).unwrap();
        let bytes = builder.into_inner().unwrap();

        assert!(MemoryTree::from_tar(&bytes[..]).is_err());
    }

    #[test]
    fn test_rejects_escaping_paths() {
        let mut tree = MemoryTree::new();
        assert!(tree.insert("../evil", b"x".to_vec()).is_err());
        assert!(tree.insert("/", b"x".to_vec()).is_err());
    }
}
