//! Registry entry types.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

static NEXT_ENTRY_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of an entry for the lifetime of the process.
///
/// Indices shift when entries are removed; ids do not, so work computed
/// from a snapshot can be written back safely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(u64);

impl EntryId {
    fn next() -> Self {
        Self(NEXT_ENTRY_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Last observed state of an application.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Running,
    #[default]
    Stopped,
}

impl EntryStatus {
    #[must_use]
    pub fn from_running(running: bool) -> Self {
        if running {
            Self::Running
        } else {
            Self::Stopped
        }
    }

    #[must_use]
    pub fn is_running(self) -> bool {
        self == Self::Running
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => f.write_str("Running"),
            Self::Stopped => f.write_str("Stopped"),
        }
    }
}

/// One supervised application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SupervisedEntry {
    #[serde(skip)]
    id: EntryId,
    path: PathBuf,
    enabled: bool,
    status: EntryStatus,
}

impl SupervisedEntry {
    pub(crate) fn new(path: PathBuf, enabled: bool, status: EntryStatus) -> Self {
        Self {
            id: EntryId::next(),
            path,
            enabled,
            status,
        }
    }

    #[must_use]
    pub fn id(&self) -> EntryId {
        self.id
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the supervisor may start and stop this application.
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Cached status from the last probe; may be stale.
    #[must_use]
    pub fn status(&self) -> EntryStatus {
        self.status
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub(crate) fn set_status(&mut self, status: EntryStatus) {
        self.status = status;
    }

    /// Copy of the fields a batch acts on.
    #[must_use]
    pub fn snapshot(&self) -> EntrySnapshot {
        EntrySnapshot {
            id: self.id,
            path: self.path.clone(),
            enabled: self.enabled,
        }
    }
}

/// Consistent per-entry view taken under the registry lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySnapshot {
    pub id: EntryId,
    pub path: PathBuf,
    pub enabled: bool,
}

/// On-disk form of an entry. Status is never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedEntry {
    pub path: PathBuf,
    #[serde(default)]
    pub enabled: bool,
}

impl From<&SupervisedEntry> for PersistedEntry {
    fn from(entry: &SupervisedEntry) -> Self {
        Self {
            path: entry.path.clone(),
            enabled: entry.enabled,
        }
    }
}
