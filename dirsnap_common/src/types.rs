use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use std::time::SystemTime;
use uuid::Uuid;

/// Extension sentinel that matches every file.
pub const WILDCARD_EXTENSION: &str = ".*";

/// Classification of a node in a diff-result tree
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiffState {
    /// Present on both sides with no detected difference
    #[default]
    Unchanged,
    /// Present only in the source (current) tree
    New,
    /// Present only in the destination (baseline) tree
    Deleted,
    /// Files differ, or a folder contains at least one non-unchanged descendant
    Changed,
    /// The comparator could not decide
    Unknown,
}

impl DiffState {
    pub fn is_unchanged(self) -> bool {
        self == DiffState::Unchanged
    }
}

/// One file or folder in a snapshot, walk result, or diff-result tree.
///
/// Children are owned by their folder. A node is reachable only through its
/// parent's `children`, so the parent relation is implied by the tree shape;
/// [`FileNode::walk`] yields every node together with its parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileNode {
    pub name: String,
    pub path: PathBuf,
    pub is_folder: bool,
    /// File length, or the aggregate of the children for folders
    pub size: Option<u64>,
    /// Files in this subtree (1 for a file)
    pub file_count: u64,
    pub created_at: Option<SystemTime>,
    pub modified_at: Option<SystemTime>,
    /// Only ever filled in by a file comparator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<FileNode>,
    #[serde(default)]
    pub diff_state: DiffState,
}

impl FileNode {
    /// Create an empty folder node. Aggregates stay unset until [`FileNode::aggregate`].
    pub fn folder(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            name: node_name(&path),
            path,
            is_folder: true,
            size: None,
            file_count: 0,
            created_at: None,
            modified_at: None,
            checksum: None,
            children: Vec::new(),
            diff_state: DiffState::Unchanged,
        }
    }

    /// Create a file leaf of the given length
    pub fn file(path: impl Into<PathBuf>, size: u64) -> Self {
        let path = path.into();
        Self {
            name: node_name(&path),
            path,
            is_folder: false,
            size: Some(size),
            file_count: 1,
            created_at: None,
            modified_at: None,
            checksum: None,
            children: Vec::new(),
            diff_state: DiffState::Unchanged,
        }
    }

    pub fn with_times(mut self, created_at: Option<SystemTime>, modified_at: Option<SystemTime>) -> Self {
        self.created_at = created_at;
        self.modified_at = modified_at;
        self
    }

    pub fn with_child(mut self, child: FileNode) -> Self {
        self.children.push(child);
        self
    }

    /// Set `size` and `file_count` from the direct children.
    pub fn aggregate(&mut self) {
        self.size = Some(self.children.iter().map(|c| c.size.unwrap_or(0)).sum());
        self.file_count = self.children.iter().map(|c| c.file_count).sum();
    }

    /// True if this node's own `diff_state` is not `Unchanged`.
    ///
    /// Matched folders are `Changed` whenever a descendant differs, but the
    /// descendants of a `New` or `Deleted` folder keep `Unchanged`.
    pub fn is_changed(&self) -> bool {
        !self.diff_state.is_unchanged()
    }

    /// Pre-order traversal yielding `(parent, node)`; the root has no parent.
    pub fn walk(&self) -> Walk<'_> {
        Walk {
            stack: vec![(None, self)],
        }
    }

    /// Look up a descendant by a path relative to this node, comparing names
    /// case-insensitively.
    pub fn find(&self, relative: impl AsRef<Path>) -> Option<&FileNode> {
        let mut current = self;
        for component in relative.as_ref().components() {
            let name = match component {
                Component::Normal(name) => name.to_string_lossy(),
                Component::CurDir => continue,
                _ => return None,
            };
            current = current
                .children
                .iter()
                .find(|child| compare_names(&child.name, &name) == Ordering::Equal)?;
        }
        Some(current)
    }

    /// Count every node in the tree by its `diff_state`
    pub fn summary(&self) -> DiffSummary {
        let mut summary = DiffSummary::default();
        for (_, node) in self.walk() {
            summary.record(node.diff_state);
        }
        summary
    }
}

/// Iterator returned by [`FileNode::walk`]
pub struct Walk<'a> {
    stack: Vec<(Option<&'a FileNode>, &'a FileNode)>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = (Option<&'a FileNode>, &'a FileNode);

    fn next(&mut self) -> Option<Self::Item> {
        let (parent, node) = self.stack.pop()?;
        self.stack
            .extend(node.children.iter().rev().map(|child| (Some(node), child)));
        Some((parent, node))
    }
}

fn node_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Case-insensitive name ordering used for sorting and merging children
pub fn compare_names(a: &str, b: &str) -> Ordering {
    a.chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase))
}

/// Per-state node counts of a diff-result tree
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub unchanged: usize,
    pub new: usize,
    pub deleted: usize,
    pub changed: usize,
    pub unknown: usize,
}

impl DiffSummary {
    pub fn record(&mut self, state: DiffState) {
        match state {
            DiffState::Unchanged => self.unchanged += 1,
            DiffState::New => self.new += 1,
            DiffState::Deleted => self.deleted += 1,
            DiffState::Changed => self.changed += 1,
            DiffState::Unknown => self.unknown += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.unchanged + self.new + self.deleted + self.changed + self.unknown
    }
}

/// Directory listing entry, also the payload of a matched-file walk event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    pub created_at: Option<SystemTime>,
    pub modified_at: Option<SystemTime>,
    pub is_folder: bool,
    /// Carries the platform "system" attribute (Windows only)
    pub is_system: bool,
}

impl FileMetadata {
    /// Extension including the leading dot, or an empty string.
    ///
    /// Dot-files such as `.profile` are treated as all extension.
    pub fn extension(&self) -> &str {
        match self.name.rfind('.') {
            Some(idx) => &self.name[idx..],
            None => "",
        }
    }
}

/// A folder to walk, optionally descending into subfolders
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRoot {
    pub path: PathBuf,
    #[serde(default = "default_true")]
    pub recursive: bool,
}

impl SearchRoot {
    pub fn recursive(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            recursive: true,
        }
    }

    pub fn flat(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            recursive: false,
        }
    }
}

/// Filters and roots for a directory walk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalkerConfig {
    #[serde(default)]
    pub roots: Vec<SearchRoot>,

    /// Folders skipped by exact path match
    #[serde(default)]
    pub excluded_folders: Vec<PathBuf>,

    /// Extension patterns such as ".txt"; ".*" matches everything
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Whether entries with the system attribute are reported
    #[serde(default = "default_true")]
    pub include_system: bool,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            excluded_folders: Vec::new(),
            extensions: default_extensions(),
            include_system: true,
        }
    }
}

impl WalkerConfig {
    pub fn with_root(mut self, root: SearchRoot) -> Self {
        self.roots.push(root);
        self
    }

    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_excluded(mut self, folder: impl Into<PathBuf>) -> Self {
        self.excluded_folders.push(folder.into());
        self
    }

    pub fn with_include_system(mut self, include: bool) -> Self {
        self.include_system = include;
        self
    }
}

/// Normalize a user-supplied extension pattern to the ".ext" form
pub fn normalize_extension(pattern: &str) -> String {
    let trimmed = pattern.trim();
    if trimmed == "*" || trimmed == WILDCARD_EXTENSION {
        WILDCARD_EXTENSION.to_string()
    } else if trimmed.starts_with('.') {
        trimmed.to_string()
    } else {
        format!(".{}", trimmed)
    }
}

/// How the CLI compares two files that exist on both sides
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareMode {
    /// No comparator: every matched pair is unchanged
    None,
    /// Size and modification time
    #[default]
    Metadata,
    /// BLAKE3 digest of the contents
    Content,
}

impl FromStr for CompareMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(CompareMode::None),
            "metadata" => Ok(CompareMode::Metadata),
            "content" => Ok(CompareMode::Content),
            other => Err(format!(
                "unknown compare mode '{}' (expected none, metadata or content)",
                other
            )),
        }
    }
}

impl fmt::Display for CompareMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CompareMode::None => "none",
            CompareMode::Metadata => "metadata",
            CompareMode::Content => "content",
        };
        f.write_str(name)
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Default extension filter for `walk`
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Folders never entered by `walk`
    #[serde(default)]
    pub excluded_folders: Vec<PathBuf>,

    /// Whether to report entries carrying the system attribute
    #[serde(default = "default_true")]
    pub include_system: bool,

    /// File comparison used by `diff`
    #[serde(default)]
    pub compare_mode: CompareMode,

    /// Enable portable mode (config alongside binary)
    #[serde(default)]
    pub portable_mode: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            excluded_folders: Vec::new(),
            include_system: true,
            compare_mode: CompareMode::default(),
            portable_mode: false,
        }
    }
}

impl AppConfig {
    /// Walker settings seeded from this configuration, without roots
    pub fn walker_config(&self) -> WalkerConfig {
        WalkerConfig {
            roots: Vec::new(),
            excluded_folders: self.excluded_folders.clone(),
            extensions: self.extensions.clone(),
            include_system: self.include_system,
        }
    }
}

fn default_extensions() -> Vec<String> {
    vec![WILDCARD_EXTENSION.to_string()]
}

fn default_true() -> bool {
    true
}

/// Identifier of one walk session, recorded in log spans
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> FileNode {
        let mut docs = FileNode::folder("/r/Docs")
            .with_child(FileNode::file("/r/Docs/a.txt", 3))
            .with_child(FileNode::file("/r/Docs/B.txt", 4));
        docs.aggregate();
        let mut root = FileNode::folder("/r")
            .with_child(docs)
            .with_child(FileNode::file("/r/readme.md", 10));
        root.aggregate();
        root
    }

    #[test]
    fn test_is_changed_reads_own_state_only() {
        let mut added = sample_tree();
        added.diff_state = DiffState::New;

        assert!(added.is_changed());
        assert!(!added.children[0].is_changed());
        assert!(!added.children[0].children[0].is_changed());
    }

    #[test]
    fn test_aggregate_sums_children() {
        let root = sample_tree();
        assert_eq!(root.size, Some(17));
        assert_eq!(root.file_count, 3);
        assert_eq!(root.children[0].size, Some(7));
    }

    #[test]
    fn test_empty_folder_aggregates_to_zero() {
        let mut empty = FileNode::folder("/r/empty");
        assert_eq!(empty.size, None);
        empty.aggregate();
        assert_eq!(empty.size, Some(0));
        assert_eq!(empty.file_count, 0);
    }

    #[test]
    fn test_walk_yields_parent_links() {
        let root = sample_tree();
        let visited: Vec<(Option<String>, String)> = root
            .walk()
            .map(|(parent, node)| (parent.map(|p| p.name.clone()), node.name.clone()))
            .collect();

        assert_eq!(visited[0], (None, "r".to_string()));
        assert_eq!(visited[1], (Some("r".to_string()), "Docs".to_string()));
        assert_eq!(visited[2], (Some("Docs".to_string()), "a.txt".to_string()));
        assert_eq!(visited[3], (Some("Docs".to_string()), "B.txt".to_string()));
        assert_eq!(visited[4], (Some("r".to_string()), "readme.md".to_string()));
    }

    #[test]
    fn test_find_is_case_insensitive() {
        let root = sample_tree();
        assert_eq!(root.find("docs/b.TXT").map(|n| n.size), Some(Some(4)));
        assert!(root.find("docs/missing.txt").is_none());
        assert_eq!(root.find("").map(|n| n.name.as_str()), Some("r"));
    }

    #[test]
    fn test_compare_names_ignores_case() {
        assert_eq!(compare_names("Alpha", "alpha"), Ordering::Equal);
        assert_eq!(compare_names("alpha", "Beta"), Ordering::Less);
        assert_eq!(compare_names("Zed", "apple"), Ordering::Greater);
    }

    #[test]
    fn test_metadata_extension() {
        let meta = |name: &str| FileMetadata {
            name: name.to_string(),
            path: PathBuf::from(name),
            size: 0,
            created_at: None,
            modified_at: None,
            is_folder: false,
            is_system: false,
        };
        assert_eq!(meta("report.TXT").extension(), ".TXT");
        assert_eq!(meta("archive.tar.gz").extension(), ".gz");
        assert_eq!(meta("Makefile").extension(), "");
        assert_eq!(meta(".profile").extension(), ".profile");
    }

    #[test]
    fn test_normalize_extension() {
        assert_eq!(normalize_extension("txt"), ".txt");
        assert_eq!(normalize_extension(".log"), ".log");
        assert_eq!(normalize_extension("*"), ".*");
        assert_eq!(normalize_extension(" .* "), ".*");
    }

    #[test]
    fn test_summary_counts_states() {
        let mut root = sample_tree();
        root.diff_state = DiffState::Changed;
        root.children[1].diff_state = DiffState::New;
        let summary = root.summary();
        assert_eq!(summary.changed, 1);
        assert_eq!(summary.new, 1);
        assert_eq!(summary.unchanged, 3);
        assert_eq!(summary.total(), 5);
    }

    #[test]
    fn test_compare_mode_parsing() {
        assert_eq!("Content".parse::<CompareMode>(), Ok(CompareMode::Content));
        assert_eq!("none".parse::<CompareMode>(), Ok(CompareMode::None));
        assert!("bytes".parse::<CompareMode>().is_err());
        assert_eq!(CompareMode::Metadata.to_string(), "metadata");
    }

    #[test]
    fn test_walker_config_defaults() {
        let config = WalkerConfig::default();
        assert!(config.roots.is_empty());
        assert_eq!(config.extensions, vec![".*".to_string()]);
        assert!(config.include_system);
    }
}
