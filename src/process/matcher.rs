//! Matching registry paths against running processes.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use super::{ProcessInfo, ProcessTable};

/// Resolve a path to the form used for process matching.
///
/// Symlinks and relative segments are resolved via the filesystem. When the
/// file no longer exists (a binary replaced while running, for example) the
/// path is made absolute and normalized lexically instead.
#[must_use]
pub fn canonical_path(path: &Path) -> Option<PathBuf> {
    std::fs::canonicalize(path)
        .ok()
        .or_else(|| lexical_absolute(path))
}

/// Make `path` absolute and drop `.`/`..` segments without touching the disk.
#[must_use]
pub fn lexical_absolute(path: &Path) -> Option<PathBuf> {
    let absolute = std::path::absolute(path).ok()?;
    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    Some(normalized)
}

/// A point-in-time view of the process table with canonical image paths.
#[derive(Debug, Clone, Default)]
pub struct ProcessSnapshot {
    processes: Vec<(PathBuf, ProcessInfo)>,
}

impl ProcessSnapshot {
    /// Build a snapshot, skipping processes without a readable image path.
    #[must_use]
    pub fn from_processes(processes: Vec<ProcessInfo>) -> Self {
        let total = processes.len();
        let processes: Vec<_> = processes
            .into_iter()
            .filter_map(|info| {
                let canonical = canonical_path(info.exe.as_deref()?)?;
                Some((canonical, info))
            })
            .collect();

        tracing::trace!(
            total,
            inspectable = processes.len(),
            "Built process snapshot"
        );
        Self { processes }
    }

    /// Find the first process whose image resolves to `path`.
    #[must_use]
    pub fn find(&self, path: &Path) -> Option<&ProcessInfo> {
        let target = canonical_path(path)?;
        self.processes
            .iter()
            .find(|(exe, _)| *exe == target)
            .map(|(_, info)| info)
    }

    /// Whether any process image resolves to `path`.
    #[must_use]
    pub fn is_running(&self, path: &Path) -> bool {
        self.find(path).is_some()
    }

    /// Number of processes with an inspectable image path.
    #[must_use]
    pub fn len(&self) -> usize {
        self.processes.len()
    }

    /// Whether the snapshot holds no inspectable processes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }
}

/// Answers "is this executable running?" against a [`ProcessTable`].
#[derive(Clone)]
pub struct ProcessMatcher {
    table: Arc<dyn ProcessTable>,
}

impl std::fmt::Debug for ProcessMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessMatcher").finish_non_exhaustive()
    }
}

impl ProcessMatcher {
    /// Create a matcher over the given process table.
    #[must_use]
    pub fn new(table: Arc<dyn ProcessTable>) -> Self {
        Self { table }
    }

    /// The underlying process table.
    #[must_use]
    pub fn table(&self) -> &Arc<dyn ProcessTable> {
        &self.table
    }

    /// Enumerate the process table once and canonicalize every image path.
    pub async fn snapshot(&self) -> ProcessSnapshot {
        let processes = self.table.processes().await;
        match tokio::task::spawn_blocking(move || ProcessSnapshot::from_processes(processes))
            .await
        {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to build process snapshot");
                ProcessSnapshot::default()
            }
        }
    }

    /// Find a running process whose image is `path`.
    pub async fn find_process(&self, path: &Path) -> Option<ProcessInfo> {
        self.snapshot().await.find(path).cloned()
    }

    /// Whether a process whose image is `path` is running.
    pub async fn is_running(&self, path: &Path) -> bool {
        self.find_process(path).await.is_some()
    }
}
