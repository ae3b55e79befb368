pub mod vfs;
pub mod snapshot;
pub mod walker;
pub mod comparator;
pub mod comparison;

pub use vfs::{LocalVfs, MemoryVfs};
pub use snapshot::SnapshotBuilder;
pub use walker::{DirectoryWalker, ProgressSink, PROGRESS_DEPTH, SkippedEntry, WalkEvent, WalkHandle, WalkReport, WalkSession};
pub use comparator::{ContentComparator, FileComparator, FileComparison, MetadataComparator};
pub use comparison::ComparisonEngine;
