use crate::comparator::FileComparator;
use dirsnap_common::{compare_names, DiffState, DirsnapError, FileNode};
use std::cmp::Ordering as NameOrdering;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Tree diff engine: merges a source (current) and a destination (baseline)
/// snapshot into one tree classifying every entry.
#[derive(Default)]
pub struct ComparisonEngine {
    comparator: Option<Box<dyn FileComparator>>,
    cancel: Option<Arc<AtomicBool>>,
}

impl ComparisonEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Without a comparator every same-named file pair is `Unchanged`.
    pub fn with_comparator(mut self, comparator: impl FileComparator + 'static) -> Self {
        self.comparator = Some(Box::new(comparator));
        self
    }

    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Diff two trees, taking ownership of both.
    ///
    /// Nodes of the inputs are moved into the result and relabelled in place;
    /// only the folder containers of matched pairs are newly built. A
    /// cancelled comparison yields `DirsnapError::Cancelled` and no tree.
    pub fn compare_folders(
        &self,
        source: FileNode,
        destination: FileNode,
    ) -> Result<FileNode, DirsnapError> {
        info!(
            "Comparing {} against {}",
            source.path.display(),
            destination.path.display()
        );
        let result = self.merge_folders(source, destination)?;
        debug!("Diff root state: {:?}", result.diff_state);
        Ok(result)
    }

    /// Diff two borrowed snapshots, cloning every node placed in the result
    pub fn compare_snapshots(
        &self,
        source: &FileNode,
        destination: &FileNode,
    ) -> Result<FileNode, DirsnapError> {
        self.compare_folders(source.clone(), destination.clone())
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map_or(false, |flag| flag.load(Ordering::Relaxed))
    }

    fn merge_folders(
        &self,
        mut source: FileNode,
        destination: FileNode,
    ) -> Result<FileNode, DirsnapError> {
        let source_children = std::mem::take(&mut source.children);

        let mut container = source;
        container.diff_state = DiffState::Unchanged;
        container.checksum = None;

        let (src_folders, src_files) = partition_sorted(source_children);
        let (dst_folders, dst_files) = partition_sorted(destination.children);

        self.merge_children(&mut container, src_folders, dst_folders, true)?;
        self.merge_children(&mut container, src_files, dst_files, false)?;

        Ok(container)
    }

    /// Two-pointer merge of one name-sorted partition into `container`
    fn merge_children(
        &self,
        container: &mut FileNode,
        source: Vec<FileNode>,
        destination: Vec<FileNode>,
        is_folder: bool,
    ) -> Result<(), DirsnapError> {
        let mut src = source.into_iter().peekable();
        let mut dst = destination.into_iter().peekable();

        loop {
            let ordering = match (src.peek(), dst.peek()) {
                (Some(s), Some(d)) => compare_names(&s.name, &d.name),
                _ => break,
            };

            if self.is_cancelled() {
                return Err(DirsnapError::Cancelled);
            }

            let item = match ordering {
                NameOrdering::Less => src.next().map(|node| relabel(node, DiffState::New)),
                NameOrdering::Greater => dst.next().map(|node| relabel(node, DiffState::Deleted)),
                NameOrdering::Equal => match (src.next(), dst.next()) {
                    (Some(s), Some(d)) => Some(self.merge_pair(s, d, is_folder)?),
                    _ => None,
                },
            };

            if let Some(item) = item {
                attach(container, item);
            }
        }

        // Which side ran out first decides the label of the leftovers.
        if src.peek().is_none() {
            for node in dst {
                attach(container, relabel(node, DiffState::Deleted));
            }
        } else {
            for node in src {
                attach(container, relabel(node, DiffState::New));
            }
        }

        Ok(())
    }

    fn merge_pair(
        &self,
        mut source: FileNode,
        mut destination: FileNode,
        is_folder: bool,
    ) -> Result<FileNode, DirsnapError> {
        if is_folder {
            return self.merge_folders(source, destination);
        }

        source.diff_state = match &self.comparator {
            Some(comparator) => comparator.compare(&mut source, &mut destination).diff_state(),
            None => DiffState::Unchanged,
        };
        Ok(source)
    }
}

fn partition_sorted(children: Vec<FileNode>) -> (Vec<FileNode>, Vec<FileNode>) {
    let (mut folders, mut files): (Vec<_>, Vec<_>) =
        children.into_iter().partition(|child| child.is_folder);
    folders.sort_by(|a, b| compare_names(&a.name, &b.name));
    files.sort_by(|a, b| compare_names(&a.name, &b.name));
    (folders, files)
}

fn relabel(mut node: FileNode, state: DiffState) -> FileNode {
    node.diff_state = state;
    node
}

/// Append a processed child; the first non-unchanged child marks the folder.
fn attach(container: &mut FileNode, child: FileNode) {
    if container.diff_state.is_unchanged() && !child.diff_state.is_unchanged() {
        container.diff_state = DiffState::Changed;
    }
    container.children.push(child);
}
