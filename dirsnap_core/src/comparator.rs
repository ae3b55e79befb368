use dirsnap_common::{DiffState, FileNode};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Verdict of a file comparator for one matched pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileComparison {
    Equal,
    Differs,
    Unknown,
}

impl FileComparison {
    pub fn diff_state(self) -> DiffState {
        match self {
            FileComparison::Equal => DiffState::Unchanged,
            FileComparison::Differs => DiffState::Changed,
            FileComparison::Unknown => DiffState::Unknown,
        }
    }
}

/// Decides whether two same-named files differ.
///
/// Both leaves are handed over mutably so a comparator may record a
/// `checksum`; nothing else in the workspace writes that field.
pub trait FileComparator: Send + Sync {
    fn compare(&self, source: &mut FileNode, destination: &mut FileNode) -> FileComparison;
}

impl<F> FileComparator for F
where
    F: Fn(&mut FileNode, &mut FileNode) -> FileComparison + Send + Sync,
{
    fn compare(&self, source: &mut FileNode, destination: &mut FileNode) -> FileComparison {
        self(source, destination)
    }
}

/// Compares size, then modification time
#[derive(Debug, Clone, Copy, Default)]
pub struct MetadataComparator;

impl FileComparator for MetadataComparator {
    fn compare(&self, source: &mut FileNode, destination: &mut FileNode) -> FileComparison {
        if source.size != destination.size {
            return FileComparison::Differs;
        }
        match (source.modified_at, destination.modified_at) {
            (Some(a), Some(b)) if a == b => FileComparison::Equal,
            // Same size, different or unknown timestamps: only content can tell
            _ => FileComparison::Unknown,
        }
    }
}

/// Compares BLAKE3 digests of the file contents
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentComparator;

impl ContentComparator {
    fn digest(path: &Path) -> std::io::Result<String> {
        let mut file = File::open(path)?;
        let mut hasher = blake3::Hasher::new();
        let mut buffer = vec![0; 64 * 1024]; // 64KB buffer

        loop {
            let n = file.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }

        Ok(hex::encode(hasher.finalize().as_bytes()))
    }

    fn checksum(node: &mut FileNode) -> Option<String> {
        if node.checksum.is_none() {
            match Self::digest(&node.path) {
                Ok(hash) => node.checksum = Some(hash),
                Err(err) => debug!("Cannot hash {}: {}", node.path.display(), err),
            }
        }
        node.checksum.clone()
    }
}

impl FileComparator for ContentComparator {
    fn compare(&self, source: &mut FileNode, destination: &mut FileNode) -> FileComparison {
        if source.size.is_some() && destination.size.is_some() && source.size != destination.size {
            return FileComparison::Differs;
        }
        match (Self::checksum(source), Self::checksum(destination)) {
            (Some(a), Some(b)) if a == b => FileComparison::Equal,
            (Some(_), Some(_)) => FileComparison::Differs,
            _ => FileComparison::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};
    use tempfile::TempDir;

    fn leaf(path: &str, size: u64, modified: Option<SystemTime>) -> FileNode {
        FileNode::file(path, size).with_times(None, modified)
    }

    #[test]
    fn test_comparison_to_state() {
        assert_eq!(FileComparison::Equal.diff_state(), DiffState::Unchanged);
        assert_eq!(FileComparison::Differs.diff_state(), DiffState::Changed);
        assert_eq!(FileComparison::Unknown.diff_state(), DiffState::Unknown);
    }

    #[test]
    fn test_metadata_comparator() {
        let t = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let later = t + Duration::from_secs(60);

        let mut a = leaf("/a/f", 10, Some(t));
        let mut b = leaf("/b/f", 10, Some(t));
        assert_eq!(MetadataComparator.compare(&mut a, &mut b), FileComparison::Equal);

        let mut c = leaf("/b/f", 11, Some(t));
        assert_eq!(MetadataComparator.compare(&mut a, &mut c), FileComparison::Differs);

        let mut d = leaf("/b/f", 10, Some(later));
        assert_eq!(MetadataComparator.compare(&mut a, &mut d), FileComparison::Unknown);

        let mut e = leaf("/b/f", 10, None);
        assert_eq!(MetadataComparator.compare(&mut a, &mut e), FileComparison::Unknown);
        assert!(a.checksum.is_none());
    }

    #[test]
    fn test_closure_comparator() {
        let by_name = |s: &mut FileNode, d: &mut FileNode| {
            if s.name == d.name {
                FileComparison::Equal
            } else {
                FileComparison::Differs
            }
        };
        let mut a = leaf("/a/x", 1, None);
        let mut b = leaf("/b/x", 2, None);
        assert_eq!(by_name.compare(&mut a, &mut b), FileComparison::Equal);
    }

    #[test]
    fn test_content_comparator_records_checksums() {
        let temp = TempDir::new().unwrap();
        let left = temp.path().join("left.txt");
        let right = temp.path().join("right.txt");
        let other = temp.path().join("other.txt");
        fs::write(&left, b"same bytes").unwrap();
        fs::write(&right, b"same bytes").unwrap();
        fs::write(&other, b"diff bytes").unwrap();

        let mut a = FileNode::file(&left, 10);
        let mut b = FileNode::file(&right, 10);
        assert_eq!(ContentComparator.compare(&mut a, &mut b), FileComparison::Equal);
        assert_eq!(a.checksum, b.checksum);
        assert_eq!(a.checksum.as_ref().map(String::len), Some(64));

        let mut c = FileNode::file(&other, 10);
        assert_eq!(ContentComparator.compare(&mut a, &mut c), FileComparison::Differs);
    }

    #[test]
    fn test_content_comparator_size_shortcut_and_unreadable() {
        let temp = TempDir::new().unwrap();
        let present = temp.path().join("present.txt");
        fs::write(&present, b"abc").unwrap();

        let mut a = FileNode::file(&present, 3);
        let mut big = FileNode::file(temp.path().join("missing.txt"), 4);
        assert_eq!(ContentComparator.compare(&mut a, &mut big), FileComparison::Differs);
        assert!(big.checksum.is_none());

        let mut missing = FileNode::file(temp.path().join("missing.txt"), 3);
        assert_eq!(ContentComparator.compare(&mut a, &mut missing), FileComparison::Unknown);
    }
}
