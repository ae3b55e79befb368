use crate::vfs::LocalVfs;
use dirsnap_common::{DirsnapError, FileMetadata, FileNode, Vfs, VfsError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

/// Builds a complete in-memory [`FileNode`] tree for a folder
#[derive(Clone)]
pub struct SnapshotBuilder {
    vfs: Arc<dyn Vfs>,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self::with_vfs(Arc::new(LocalVfs::new()))
    }

    pub fn with_vfs(vfs: Arc<dyn Vfs>) -> Self {
        Self { vfs }
    }

    /// Snapshot `root` and everything below it.
    ///
    /// Unreadable folders below the root become partial nodes; only a root
    /// that is missing or not a folder is reported as an error.
    pub fn build(&self, root: &Path) -> Result<FileNode, DirsnapError> {
        let meta = self.vfs.metadata(root)?;
        if !meta.is_folder {
            return Err(VfsError::NotADirectory(root.display().to_string()).into());
        }

        let node = self.build_folder(meta);
        info!(
            "Snapshot of {} holds {} files ({} bytes)",
            root.display(),
            node.file_count,
            node.size.unwrap_or(0)
        );
        Ok(node)
    }

    /// Run [`SnapshotBuilder::build`] on a background thread
    pub fn spawn(&self, root: PathBuf) -> JoinHandle<Result<FileNode, DirsnapError>> {
        let builder = self.clone();
        std::thread::spawn(move || builder.build(&root))
    }

    fn build_folder(&self, entry: FileMetadata) -> FileNode {
        let mut node = FileNode::folder(entry.path).with_times(entry.created_at, entry.modified_at);

        if let Err(err) = self.collect_children(&mut node) {
            if err.is_permission_denied() {
                debug!("Access denied, keeping partial folder {}", node.path.display());
            } else {
                warn!("Failed to list {}: {}", node.path.display(), err);
            }
        }

        node.aggregate();
        node
    }

    /// Children collected before a listing failure stay attached to `node`.
    fn collect_children(&self, node: &mut FileNode) -> Result<(), VfsError> {
        for dir in self.vfs.subdirectories(&node.path)? {
            let child = self.build_folder(dir);
            node.children.push(child);
        }

        for file in self.vfs.files(&node.path)? {
            node.children.push(
                FileNode::file(file.path, file.size).with_times(file.created_at, file.modified_at),
            );
        }

        Ok(())
    }
}

impl Default for SnapshotBuilder {
    fn default() -> Self {
        Self::new()
    }
}
