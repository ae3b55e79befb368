use dirsnap_common::{compare_names, FileMetadata, Vfs, VfsError};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Local filesystem VFS implementation
///
/// Paths are used as given; callers pass absolute paths so that every
/// resulting node carries its absolute location.
pub struct LocalVfs {
    instance_id: String,
}

impl LocalVfs {
    pub fn new() -> Self {
        Self {
            instance_id: "local".to_string(),
        }
    }
}

impl Default for LocalVfs {
    fn default() -> Self {
        Self::new()
    }
}

impl Vfs for LocalVfs {
    fn instance_id(&self) -> &str {
        &self.instance_id
    }

    fn metadata(&self, path: &Path) -> Result<FileMetadata, VfsError> {
        let meta = fs::metadata(path).map_err(|e| VfsError::from_io(path, e))?;
        Ok(to_file_metadata(path, &meta))
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<FileMetadata>, VfsError> {
        let meta = fs::metadata(path).map_err(|e| VfsError::from_io(path, e))?;
        if !meta.is_dir() {
            return Err(VfsError::NotADirectory(path.display().to_string()));
        }

        let canonical = fs::canonicalize(path).ok();

        // Entries that vanish or cannot be stat'ed between listing and
        // inspection are dropped rather than failing the whole directory.
        let mut entries: Vec<FileMetadata> = fs::read_dir(path)
            .map_err(|e| VfsError::from_io(path, e))?
            .filter_map(|entry| {
                let entry = entry.ok()?;
                let meta = entry_metadata(&entry, canonical.as_deref())?;
                Some(to_file_metadata(&entry.path(), &meta))
            })
            .collect();
        entries.sort_by(|a, b| compare_names(&a.name, &b.name));

        Ok(entries)
    }
}

/// Metadata of a listed entry, following symlinks.
///
/// A dangling link keeps its own metadata and is reported as a file. A link
/// to the listed folder or one of its ancestors is dropped so recursive
/// traversal terminates.
fn entry_metadata(entry: &fs::DirEntry, listed: Option<&Path>) -> Option<fs::Metadata> {
    let meta = entry.metadata().ok()?;
    if !meta.file_type().is_symlink() {
        return Some(meta);
    }

    let target = match fs::metadata(entry.path()) {
        Ok(target) => target,
        Err(_) => return Some(meta),
    };
    if target.is_dir() {
        let resolved = fs::canonicalize(entry.path()).ok();
        if let (Some(listed), Some(resolved)) = (listed, resolved) {
            if listed.starts_with(&resolved) {
                debug!("Skipping symlink cycle {}", entry.path().display());
                return None;
            }
        }
    }
    Some(target)
}

fn to_file_metadata(path: &Path, meta: &fs::Metadata) -> FileMetadata {
    FileMetadata {
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string()),
        path: path.to_path_buf(),
        size: if meta.is_dir() { 0 } else { meta.len() },
        created_at: meta.created().ok(),
        modified_at: meta.modified().ok(),
        is_folder: meta.is_dir(),
        is_system: has_system_attribute(meta),
    }
}

#[cfg(windows)]
fn has_system_attribute(meta: &fs::Metadata) -> bool {
    use std::os::windows::fs::MetadataExt;
    const FILE_ATTRIBUTE_SYSTEM: u32 = 0x4;
    meta.file_attributes() & FILE_ATTRIBUTE_SYSTEM != 0
}

#[cfg(not(windows))]
fn has_system_attribute(_meta: &fs::Metadata) -> bool {
    false
}
