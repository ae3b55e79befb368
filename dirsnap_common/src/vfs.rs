use crate::{FileMetadata, VfsError};
use std::path::Path;

/// Filesystem capability consumed by the snapshot builder and the walker
///
/// Only immediate listings are required: neither consumer asks the VFS to
/// recurse, so each call holds resources for one directory at most.
pub trait Vfs: Send + Sync {
    /// Uniquely identifies the VFS instance (e.g., "local", "memory")
    fn instance_id(&self) -> &str;

    /// Returns the metadata for a specific path
    fn metadata(&self, path: &Path) -> Result<FileMetadata, VfsError>;

    /// Lists the immediate entries of a directory
    fn read_dir(&self, path: &Path) -> Result<Vec<FileMetadata>, VfsError>;

    /// Immediate subdirectories of `path`
    fn subdirectories(&self, path: &Path) -> Result<Vec<FileMetadata>, VfsError> {
        Ok(self
            .read_dir(path)?
            .into_iter()
            .filter(|entry| entry.is_folder)
            .collect())
    }

    /// Immediate files of `path`
    fn files(&self, path: &Path) -> Result<Vec<FileMetadata>, VfsError> {
        Ok(self
            .read_dir(path)?
            .into_iter()
            .filter(|entry| !entry.is_folder)
            .collect())
    }

    /// Checks if a path exists
    fn exists(&self, path: &Path) -> bool {
        self.metadata(path).is_ok()
    }
}
