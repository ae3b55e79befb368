//! Depth-first directory walker with cooperative pause and cancel
//!
//! Traversal is strictly sequential. A folder's own files are listed only
//! after every subfolder below it has been walked, so the matched-file events
//! of a folder always follow the events of its whole subtree. Pause and
//! cancel are honoured once per directory step, never in the middle of a
//! listing.

use crate::vfs::LocalVfs;
use crossbeam::channel::{self, Receiver, Sender};
use dirsnap_common::{
    normalize_extension, DirsnapError, FileMetadata, SessionId, Vfs, VfsError, WalkerConfig,
    WILDCARD_EXTENSION,
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::JoinHandle;
use tracing::{debug, info, info_span, warn};

/// Progress notification emitted by a walk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkEvent {
    FolderEntered(PathBuf),
    FileMatched(FileMetadata),
    /// Coarse progress: a folder within the top levels of a root is entered
    Progress { path: PathBuf, depth: usize },
    /// Always the last event, also after a cancelled walk
    Completed,
}

/// Synchronous receiver of walk progress
pub trait ProgressSink {
    fn folder_entered(&mut self, _path: &Path) {}
    fn file_matched(&mut self, _file: &FileMetadata) {}
    /// Called right after `folder_entered` for folders less than
    /// [`PROGRESS_DEPTH`] levels below a root.
    fn progress(&mut self, _path: &Path, _depth: usize) {}
    fn completed(&mut self) {}
}

/// Folders at this depth below a root and deeper report no progress
pub const PROGRESS_DEPTH: usize = 3;

/// Collects events in order; handy for callers that only want the list.
impl ProgressSink for Vec<WalkEvent> {
    fn folder_entered(&mut self, path: &Path) {
        self.push(WalkEvent::FolderEntered(path.to_path_buf()));
    }

    fn file_matched(&mut self, file: &FileMetadata) {
        self.push(WalkEvent::FileMatched(file.clone()));
    }

    fn progress(&mut self, path: &Path, depth: usize) {
        self.push(WalkEvent::Progress {
            path: path.to_path_buf(),
            depth,
        });
    }

    fn completed(&mut self) {
        self.push(WalkEvent::Completed);
    }
}

struct ChannelSink {
    tx: Sender<WalkEvent>,
}

impl ProgressSink for ChannelSink {
    // A dropped receiver only means nobody is listening; the walk still runs
    // to completion so `WalkHandle::join` can return the report.
    fn folder_entered(&mut self, path: &Path) {
        let _ = self.tx.send(WalkEvent::FolderEntered(path.to_path_buf()));
    }

    fn file_matched(&mut self, file: &FileMetadata) {
        let _ = self.tx.send(WalkEvent::FileMatched(file.clone()));
    }

    fn progress(&mut self, path: &Path, depth: usize) {
        let _ = self.tx.send(WalkEvent::Progress {
            path: path.to_path_buf(),
            depth,
        });
    }

    fn completed(&mut self) {
        let _ = self.tx.send(WalkEvent::Completed);
    }
}

/// Pause/cancel state of one walk, shared between the walker and its controller
#[derive(Debug)]
pub struct WalkSession {
    id: SessionId,
    paused: Mutex<bool>,
    resumed: Condvar,
    cancelled: AtomicBool,
}

impl WalkSession {
    pub fn new() -> Self {
        Self {
            id: SessionId::new(),
            paused: Mutex::new(false),
            resumed: Condvar::new(),
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn pause(&self) {
        *self.paused.lock().unwrap_or_else(PoisonError::into_inner) = true;
    }

    pub fn resume(&self) {
        *self.paused.lock().unwrap_or_else(PoisonError::into_inner) = false;
        self.resumed.notify_all();
    }

    /// Request termination; also lifts a pending pause so the walk notices.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.resume();
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Block while paused, then report whether the walk may continue
    fn checkpoint(&self) -> bool {
        let mut paused = self.paused.lock().unwrap_or_else(PoisonError::into_inner);
        while *paused {
            paused = self
                .resumed
                .wait(paused)
                .unwrap_or_else(PoisonError::into_inner);
        }
        !self.is_cancelled()
    }
}

impl Default for WalkSession {
    fn default() -> Self {
        Self::new()
    }
}

/// A listing failure other than access denied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of a finished walk
#[derive(Debug, Clone)]
pub struct WalkReport {
    pub session: SessionId,
    /// Matched files in event order
    pub files: Vec<FileMetadata>,
    pub folders_entered: usize,
    pub cancelled: bool,
    pub errors: Vec<SkippedEntry>,
}

/// Streams matching files from the configured roots
#[derive(Clone)]
pub struct DirectoryWalker {
    config: WalkerConfig,
    vfs: Arc<dyn Vfs>,
    extensions: Vec<String>,
    excluded: HashSet<PathBuf>,
}

impl DirectoryWalker {
    pub fn new(config: WalkerConfig) -> Self {
        Self::with_vfs(config, Arc::new(LocalVfs::new()))
    }

    pub fn with_vfs(config: WalkerConfig, vfs: Arc<dyn Vfs>) -> Self {
        let extensions = config
            .extensions
            .iter()
            .map(|ext| normalize_extension(ext).to_lowercase())
            .collect();
        let excluded = config.excluded_folders.iter().cloned().collect();
        Self {
            config,
            vfs,
            extensions,
            excluded,
        }
    }

    pub fn config(&self) -> &WalkerConfig {
        &self.config
    }

    /// Start walking on a background thread with a fresh session
    pub fn start(&self) -> Result<WalkHandle, DirsnapError> {
        self.start_with_session(Arc::new(WalkSession::new()))
    }

    /// Start walking on a background thread controlled by `session`.
    ///
    /// A session paused beforehand holds the walk before its first event.
    pub fn start_with_session(&self, session: Arc<WalkSession>) -> Result<WalkHandle, DirsnapError> {
        self.validate()?;

        let (tx, rx) = channel::unbounded();
        let walker = self.clone();
        let thread_session = Arc::clone(&session);
        let thread = std::thread::Builder::new()
            .name("dirsnap-walker".to_string())
            .spawn(move || {
                let mut sink = ChannelSink { tx };
                walker.run(&mut sink, &thread_session)
            })?;

        Ok(WalkHandle {
            session,
            events: rx,
            thread: Some(thread),
        })
    }

    /// Walk on the calling thread, reporting to `sink`
    pub fn walk_with(
        &self,
        sink: &mut dyn ProgressSink,
        session: &WalkSession,
    ) -> Result<WalkReport, DirsnapError> {
        self.validate()?;
        Ok(self.run(sink, session))
    }

    fn validate(&self) -> Result<(), DirsnapError> {
        if self.config.roots.is_empty() {
            return Err(DirsnapError::Config("no search roots configured".to_string()));
        }
        Ok(())
    }

    fn run(&self, sink: &mut dyn ProgressSink, session: &WalkSession) -> WalkReport {
        let span = info_span!("walk", session = %session.id());
        let _enter = span.enter();

        let mut run = WalkRun {
            walker: self,
            session,
            sink,
            report: WalkReport {
                session: session.id(),
                files: Vec::new(),
                folders_entered: 0,
                cancelled: false,
                errors: Vec::new(),
            },
        };

        for root in &self.config.roots {
            if root.recursive {
                run.walk_tree(&root.path, 0);
            } else {
                run.list_files(&root.path);
            }
        }

        let mut report = run.report;
        report.cancelled = session.is_cancelled();
        info!(
            "Walk finished: {} files matched in {} folders{}",
            report.files.len(),
            report.folders_entered,
            if report.cancelled { " (cancelled)" } else { "" }
        );
        run.sink.completed();
        report
    }

    fn matches_extension(&self, file: &FileMetadata) -> bool {
        let ext = file.extension().to_lowercase();
        self.extensions
            .iter()
            .any(|pattern| pattern == WILDCARD_EXTENSION || *pattern == ext)
    }

    fn passes_system_policy(&self, entry: &FileMetadata) -> bool {
        !entry.is_system || self.config.include_system
    }
}

struct WalkRun<'a> {
    walker: &'a DirectoryWalker,
    session: &'a WalkSession,
    sink: &'a mut dyn ProgressSink,
    report: WalkReport,
}

impl WalkRun<'_> {
    fn walk_tree(&mut self, path: &Path, depth: usize) {
        if !self.session.checkpoint() {
            return;
        }

        self.sink.folder_entered(path);
        self.report.folders_entered += 1;
        if depth < PROGRESS_DEPTH {
            debug!("Entering {}", path.display());
            self.sink.progress(path, depth);
        }

        let subdirs = match self.walker.vfs.subdirectories(path) {
            Ok(subdirs) => subdirs,
            Err(err) => {
                self.skip(path, err);
                return;
            }
        };

        for dir in subdirs {
            if !self.walker.passes_system_policy(&dir) || self.walker.excluded.contains(&dir.path) {
                continue;
            }
            self.walk_tree(&dir.path, depth + 1);
        }

        self.list_files(path);
    }

    fn list_files(&mut self, path: &Path) {
        if !self.session.checkpoint() {
            return;
        }

        let files = match self.walker.vfs.files(path) {
            Ok(files) => files,
            Err(err) => {
                self.skip(path, err);
                return;
            }
        };

        for file in files {
            if !self.walker.passes_system_policy(&file) || !self.walker.matches_extension(&file) {
                continue;
            }
            self.sink.file_matched(&file);
            self.report.files.push(file);
        }
    }

    fn skip(&mut self, path: &Path, err: VfsError) {
        if err.is_permission_denied() {
            debug!("Access denied, skipping {}", path.display());
            return;
        }
        warn!("Skipping {}: {}", path.display(), err);
        self.report.errors.push(SkippedEntry {
            path: path.to_path_buf(),
            reason: err.to_string(),
        });
    }
}

/// Controller for a walk running on a background thread
pub struct WalkHandle {
    session: Arc<WalkSession>,
    events: Receiver<WalkEvent>,
    thread: Option<JoinHandle<WalkReport>>,
}

impl WalkHandle {
    pub fn pause(&self) {
        self.session.pause();
    }

    pub fn resume(&self) {
        self.session.resume();
    }

    pub fn cancel(&self) {
        self.session.cancel();
    }

    pub fn session(&self) -> &Arc<WalkSession> {
        &self.session
    }

    /// Event stream; disconnects after `WalkEvent::Completed`
    pub fn events(&self) -> &Receiver<WalkEvent> {
        &self.events
    }

    /// Wait for the walk to finish and return its report
    pub fn join(mut self) -> Result<WalkReport, DirsnapError> {
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| DirsnapError::Walk("walker thread panicked".to_string())),
            None => Err(DirsnapError::Walk("walk already joined".to_string())),
        }
    }
}

impl Drop for WalkHandle {
    // Never leave a paused walker blocked forever behind a dropped handle.
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.session.cancel();
        }
    }
}
