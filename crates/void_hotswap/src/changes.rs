//! Source change detection
//!
//! A [`ChangeSource`] tells the reload layer which watched source files were
//! modified since the last poll. [`MemoryChangeSource`] is driven by hand;
//! [`NotifyChangeSource`] follows the file system.

use crate::error::Result;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Extensions treated as headers
const HEADER_EXTENSIONS: &[&str] = &["h", "hh", "hpp", "hxx", "inl", "ipp"];

/// Kind of source that changed.
///
/// Ordered by impact: a header change outranks an implementation change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SourceClass {
    /// Code only; object layout is unchanged
    Implementation,
    /// Declarations; object layout may have changed
    Header,
}

impl SourceClass {
    /// Classify a path by its extension
    pub fn of(path: &Path) -> Self {
        let is_header = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|ext| {
                HEADER_EXTENSIONS
                    .iter()
                    .any(|h| h.eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false);

        if is_header {
            SourceClass::Header
        } else {
            SourceClass::Implementation
        }
    }
}

/// One modified source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: PathBuf,
    pub class: SourceClass,
}

impl FileChange {
    /// Change of `path`, classified by extension
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let class = SourceClass::of(&path);
        Self { path, class }
    }
}

/// Options for [`ChangeSource::watch`]
#[derive(Debug, Clone, Copy, Default)]
pub struct WatchOptions {
    /// Report every path once right away, as if it had just changed
    pub replay_on_watch: bool,
}

/// Reports modified source files
pub trait ChangeSource {
    /// Start watching `paths`. Watching a path twice is harmless.
    fn watch(&mut self, paths: &[PathBuf], options: WatchOptions) -> Result<()>;

    /// Stop watching `path`
    fn unwatch(&mut self, path: &Path) -> Result<()>;

    /// Changes since the last poll
    fn poll(&mut self) -> Vec<FileChange>;

    fn is_watching(&self, path: &Path) -> bool;
}

#[derive(Default)]
struct MemoryState {
    watching: Vec<PathBuf>,
    pending: Vec<FileChange>,
}

/// Change source driven by hand.
///
/// Clones share state, so a test can keep one handle and give another to a
/// [`ReloadContext`](crate::ReloadContext).
#[derive(Clone, Default)]
pub struct MemoryChangeSource {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryChangeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report a modification of `path` if it is watched.
    /// Returns whether the change was queued.
    pub fn simulate_modify(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        let mut state = self.state.lock();
        if state.watching.iter().any(|p| p == path) {
            state.pending.push(FileChange::new(path));
            true
        } else {
            false
        }
    }

    /// Watched paths, in watch order
    pub fn watched(&self) -> Vec<PathBuf> {
        self.state.lock().watching.clone()
    }
}

impl ChangeSource for MemoryChangeSource {
    fn watch(&mut self, paths: &[PathBuf], options: WatchOptions) -> Result<()> {
        let mut state = self.state.lock();
        for path in paths {
            if !state.watching.contains(path) {
                state.watching.push(path.clone());
            }
            if options.replay_on_watch {
                state.pending.push(FileChange::new(path.clone()));
            }
        }
        Ok(())
    }

    fn unwatch(&mut self, path: &Path) -> Result<()> {
        let mut state = self.state.lock();
        state.watching.retain(|p| p != path);
        state.pending.retain(|c| c.path != path);
        Ok(())
    }

    fn poll(&mut self) -> Vec<FileChange> {
        std::mem::take(&mut self.state.lock().pending)
    }

    fn is_watching(&self, path: &Path) -> bool {
        self.state.lock().watching.iter().any(|p| p == path)
    }
}

#[cfg(feature = "file-watcher")]
pub use self::notify_source::NotifyChangeSource;

#[cfg(feature = "file-watcher")]
mod notify_source {
    use super::{ChangeSource, FileChange, WatchOptions};
    use crate::error::{ReloadError, Result};
    use crossbeam_channel::Receiver;
    use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::time::{Duration, Instant};

    /// Change source following the file system through `notify`.
    ///
    /// Parent directories are watched non-recursively; events are mapped
    /// back to the subscribed files. A file is reported once it has been
    /// quiet for the debounce period, so an editor's burst of writes turns
    /// into one change.
    pub struct NotifyChangeSource {
        watcher: RecommendedWatcher,
        events: Receiver<notify::Result<Event>>,
        /// Canonical path -> path as subscribed
        watched: HashMap<PathBuf, PathBuf>,
        /// Watched directory -> number of subscribed files in it
        directories: HashMap<PathBuf, usize>,
        /// Subscribed path -> time of the last event
        settling: HashMap<PathBuf, Instant>,
        replay: Vec<FileChange>,
        debounce: Duration,
    }

    impl NotifyChangeSource {
        pub fn new() -> Result<Self> {
            Self::with_debounce(Duration::from_millis(100))
        }

        pub fn with_debounce(debounce: Duration) -> Result<Self> {
            let (tx, rx) = crossbeam_channel::unbounded();
            let watcher = notify::recommended_watcher(move |res| {
                let _ = tx.send(res);
            })
            .map_err(|e| ReloadError::Watch(e.to_string()))?;

            Ok(Self {
                watcher,
                events: rx,
                watched: HashMap::new(),
                directories: HashMap::new(),
                settling: HashMap::new(),
                replay: Vec::new(),
                debounce,
            })
        }

        /// Absolute key for `path`. A file that does not exist yet resolves
        /// through its parent, so the key matches once it is created.
        fn canonical(path: &Path) -> PathBuf {
            if let Ok(canonical) = std::fs::canonicalize(path) {
                return canonical;
            }
            let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
            match (absolute.parent(), absolute.file_name()) {
                (Some(parent), Some(name)) => std::fs::canonicalize(parent)
                    .map(|parent| parent.join(name))
                    .unwrap_or(absolute),
                _ => absolute,
            }
        }

        fn handle_event(&mut self, event: Event) {
            if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                return;
            }
            let now = Instant::now();
            for path in &event.paths {
                if let Some(subscribed) = self.watched.get(&Self::canonical(path)) {
                    log::trace!("Source event for {}", subscribed.display());
                    self.settling.insert(subscribed.clone(), now);
                }
            }
        }
    }

    impl ChangeSource for NotifyChangeSource {
        fn watch(&mut self, paths: &[PathBuf], options: WatchOptions) -> Result<()> {
            for path in paths {
                let canonical = Self::canonical(path);
                if self.watched.contains_key(&canonical) {
                    continue;
                }
                let directory = canonical
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| PathBuf::from("."));

                if !self.directories.contains_key(&directory) {
                    self.watcher
                        .watch(&directory, RecursiveMode::NonRecursive)
                        .map_err(|e| ReloadError::Watch(format!("{}: {}", directory.display(), e)))?;
                    log::debug!("Watching directory {}", directory.display());
                }
                *self.directories.entry(directory).or_insert(0) += 1;
                self.watched.insert(canonical, path.clone());

                if options.replay_on_watch {
                    self.replay.push(FileChange::new(path.clone()));
                }
            }
            Ok(())
        }

        fn unwatch(&mut self, path: &Path) -> Result<()> {
            let canonical = Self::canonical(path);
            let Some(subscribed) = self.watched.remove(&canonical) else {
                return Ok(());
            };
            self.settling.remove(&subscribed);
            self.replay.retain(|c| c.path != subscribed);

            let Some(directory) = canonical.parent().map(Path::to_path_buf) else {
                return Ok(());
            };
            if let Some(count) = self.directories.get_mut(&directory) {
                *count -= 1;
                if *count == 0 {
                    self.directories.remove(&directory);
                    self.watcher
                        .unwatch(&directory)
                        .map_err(|e| ReloadError::Watch(e.to_string()))?;
                }
            }
            Ok(())
        }

        fn poll(&mut self) -> Vec<FileChange> {
            while let Ok(result) = self.events.try_recv() {
                match result {
                    Ok(event) => self.handle_event(event),
                    Err(e) => log::warn!("File watcher error: {}", e),
                }
            }

            let mut changes = std::mem::take(&mut self.replay);
            let now = Instant::now();
            let settled: Vec<PathBuf> = self
                .settling
                .iter()
                .filter(|(_, last)| now.duration_since(**last) >= self.debounce)
                .map(|(path, _)| path.clone())
                .collect();

            for path in settled {
                self.settling.remove(&path);
                changes.push(FileChange::new(path));
            }
            changes
        }

        fn is_watching(&self, path: &Path) -> bool {
            self.watched.contains_key(&Self::canonical(path))
        }
    }

}
