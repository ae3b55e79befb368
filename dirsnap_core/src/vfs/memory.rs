//! In-memory VFS used to exercise traversal without touching the disk
//!
//! Besides plain files and folders, a `MemoryVfs` can mark folders as
//! access-denied or failing so that the skip semantics of the snapshot builder
//! and walker can be tested independently of the host's permissions.

use dirsnap_common::{FileMetadata, Vfs, VfsError};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::SystemTime;

#[derive(Debug, Clone)]
struct MemoryEntry {
    is_folder: bool,
    size: u64,
    created_at: Option<SystemTime>,
    modified_at: Option<SystemTime>,
    is_system: bool,
}

impl MemoryEntry {
    fn folder() -> Self {
        Self {
            is_folder: true,
            size: 0,
            created_at: None,
            modified_at: None,
            is_system: false,
        }
    }
}

pub struct MemoryVfs {
    entries: BTreeMap<PathBuf, MemoryEntry>,
    denied: HashSet<PathBuf>,
    failing: HashSet<PathBuf>,
    listings: AtomicUsize,
}

impl MemoryVfs {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            denied: HashSet::new(),
            failing: HashSet::new(),
            listings: AtomicUsize::new(0),
        }
    }

    /// Add a folder, creating any missing ancestors
    pub fn with_dir(mut self, path: impl AsRef<Path>) -> Self {
        self.insert_ancestors(path.as_ref());
        self.entries
            .entry(path.as_ref().to_path_buf())
            .or_insert_with(MemoryEntry::folder);
        self
    }

    /// Add a file of `size` bytes, creating any missing ancestors
    pub fn with_file(mut self, path: impl AsRef<Path>, size: u64) -> Self {
        self.insert_ancestors(path.as_ref());
        self.entries.insert(
            path.as_ref().to_path_buf(),
            MemoryEntry {
                is_folder: false,
                size,
                created_at: None,
                modified_at: None,
                is_system: false,
            },
        );
        self
    }

    pub fn with_modified(mut self, path: impl AsRef<Path>, time: SystemTime) -> Self {
        if let Some(entry) = self.entries.get_mut(path.as_ref()) {
            entry.modified_at = Some(time);
        }
        self
    }

    /// Flag an existing entry with the system attribute
    pub fn with_system(mut self, path: impl AsRef<Path>) -> Self {
        if let Some(entry) = self.entries.get_mut(path.as_ref()) {
            entry.is_system = true;
        }
        self
    }

    /// Listing this folder fails with `PermissionDenied`
    pub fn deny(mut self, path: impl AsRef<Path>) -> Self {
        self.denied.insert(path.as_ref().to_path_buf());
        self
    }

    /// Listing this folder fails with a generic I/O error
    pub fn fail(mut self, path: impl AsRef<Path>) -> Self {
        self.failing.insert(path.as_ref().to_path_buf());
        self
    }

    /// Number of `read_dir` calls served so far
    pub fn listing_count(&self) -> usize {
        self.listings.load(Ordering::SeqCst)
    }

    fn insert_ancestors(&mut self, path: &Path) {
        for ancestor in path.ancestors().skip(1) {
            if ancestor.as_os_str().is_empty() {
                break;
            }
            self.entries
                .entry(ancestor.to_path_buf())
                .or_insert_with(MemoryEntry::folder);
        }
    }

    fn to_metadata(path: &Path, entry: &MemoryEntry) -> FileMetadata {
        FileMetadata {
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            path: path.to_path_buf(),
            size: entry.size,
            created_at: entry.created_at,
            modified_at: entry.modified_at,
            is_folder: entry.is_folder,
            is_system: entry.is_system,
        }
    }
}

impl Default for MemoryVfs {
    fn default() -> Self {
        Self::new()
    }
}

impl Vfs for MemoryVfs {
    fn instance_id(&self) -> &str {
        "memory"
    }

    fn metadata(&self, path: &Path) -> Result<FileMetadata, VfsError> {
        self.entries
            .get(path)
            .map(|entry| Self::to_metadata(path, entry))
            .ok_or_else(|| VfsError::NotFound(path.display().to_string()))
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<FileMetadata>, VfsError> {
        self.listings.fetch_add(1, Ordering::SeqCst);

        if self.denied.contains(path) {
            return Err(VfsError::PermissionDenied(path.display().to_string()));
        }
        if self.failing.contains(path) {
            return Err(VfsError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("simulated failure listing {}", path.display()),
            )));
        }

        match self.entries.get(path) {
            None => return Err(VfsError::NotFound(path.display().to_string())),
            Some(entry) if !entry.is_folder => {
                return Err(VfsError::NotADirectory(path.display().to_string()))
            }
            Some(_) => {}
        }

        Ok(self
            .entries
            .iter()
            .filter(|(child, _)| child.parent() == Some(path))
            .map(|(child, entry)| Self::to_metadata(child, entry))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_vfs_creates_ancestors() {
        let vfs = MemoryVfs::new().with_file("/r/a/b/c.txt", 3);

        assert!(vfs.exists(Path::new("/r")));
        assert!(vfs.exists(Path::new("/r/a/b")));
        assert!(vfs.metadata(Path::new("/r/a")).unwrap().is_folder);
        assert_eq!(vfs.metadata(Path::new("/r/a/b/c.txt")).unwrap().size, 3);
    }

    #[test]
    fn test_memory_vfs_lists_immediate_children_only() {
        let vfs = MemoryVfs::new()
            .with_file("/r/top.txt", 1)
            .with_file("/r/sub/deep.txt", 2)
            .with_dir("/r/empty");

        let names: Vec<String> = vfs
            .read_dir(Path::new("/r"))
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["empty", "sub", "top.txt"]);
        assert_eq!(vfs.listing_count(), 1);
    }

    #[test]
    fn test_memory_vfs_denied_and_failing() {
        let vfs = MemoryVfs::new()
            .with_dir("/r/locked")
            .with_dir("/r/broken")
            .deny("/r/locked")
            .fail("/r/broken");

        assert!(vfs
            .read_dir(Path::new("/r/locked"))
            .unwrap_err()
            .is_permission_denied());
        assert!(matches!(
            vfs.read_dir(Path::new("/r/broken")).unwrap_err(),
            VfsError::Io(_)
        ));
        assert!(matches!(
            vfs.read_dir(Path::new("/nope")).unwrap_err(),
            VfsError::NotFound(_)
        ));
    }
}
