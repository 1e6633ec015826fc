//! In-memory registry and its TOML persistence.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::error::RegistryError;
use super::types::{EntryId, EntrySnapshot, EntryStatus, PersistedEntry, SupervisedEntry};

/// File name used when no registry path is configured.
pub const DEFAULT_REGISTRY_FILE: &str = "applications.toml";

/// On-disk layout: an array of `[[application]]` tables.
#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    #[serde(default, rename = "application")]
    applications: Vec<PersistedEntry>,
}

/// Ordered list of supervised applications.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: Vec<SupervisedEntry>,
}

impl Registry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a registry from a file.
    ///
    /// A missing file yields an empty registry. Entries whose executable no
    /// longer exists are dropped. Entries are marked `Stopped`; the
    /// supervisor probes real statuses after loading.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No application list, starting empty");
            return Ok(Self::new());
        }

        let content = fs::read_to_string(path).map_err(|e| RegistryError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let file: RegistryFile = toml::from_str(&content).map_err(|e| RegistryError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;

        let mut registry = Self::new();
        for persisted in file.applications {
            if persisted.path.exists() {
                registry.push(persisted.path, persisted.enabled, EntryStatus::Stopped);
            } else {
                tracing::debug!(path = %persisted.path.display(), "Dropping missing application");
            }
        }

        tracing::debug!(path = %path.display(), entries = registry.len(), "Loaded application list");
        Ok(registry)
    }

    /// Save the registry, keeping any previous file as a timestamped backup.
    ///
    /// The new content is written to a temporary file first. An existing
    /// file is then renamed to `<timestamp>_<file name>` in the same
    /// directory before the temporary file takes its place.
    ///
    /// Returns the backup path, if a previous file existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry is empty or any file operation fails.
    pub fn save(&self, path: &Path) -> Result<Option<PathBuf>, RegistryError> {
        if self.entries.is_empty() {
            return Err(RegistryError::Empty);
        }
        self.save_allow_empty(path)
    }

    /// Like [`Registry::save`], but an empty registry writes an empty list.
    ///
    /// # Errors
    ///
    /// Returns an error if any file operation fails.
    pub fn save_allow_empty(&self, path: &Path) -> Result<Option<PathBuf>, RegistryError> {
        let file = RegistryFile {
            applications: self.entries.iter().map(PersistedEntry::from).collect(),
        };
        let content = toml::to_string_pretty(&file)?;

        let write_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| RegistryError::Write { path, source }
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_err(parent))?;
        }

        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, content).map_err(write_err(&temp_path))?;

        let backup = if path.exists() {
            let backup = backup_path(path);
            fs::rename(path, &backup).map_err(write_err(&backup))?;
            Some(backup)
        } else {
            None
        };

        fs::rename(&temp_path, path).map_err(write_err(path))?;

        tracing::info!(
            path = %path.display(),
            backup = ?backup,
            entries = self.entries.len(),
            "Saved application list"
        );
        Ok(backup)
    }

    fn push(&mut self, path: PathBuf, enabled: bool, status: EntryStatus) -> &SupervisedEntry {
        let index = self.entries.len();
        self.entries
            .push(SupervisedEntry::new(path, enabled, status));
        &self.entries[index]
    }

    /// Append a new, disabled entry.
    pub fn add(&mut self, path: PathBuf, status: EntryStatus) -> &SupervisedEntry {
        self.push(path, false, status)
    }

    /// Remove the entries at `indices`.
    ///
    /// Every index refers to the registry as it was before the call, so
    /// removing `[0, 2]` from `[A, B, C]` leaves `[B]`. Duplicate indices
    /// are ignored. Nothing is removed if any index is out of range.
    ///
    /// # Errors
    ///
    /// Returns `IndexOutOfRange` for the first index past the end.
    pub fn remove(&mut self, indices: &[usize]) -> Result<Vec<SupervisedEntry>, RegistryError> {
        let len = self.entries.len();
        if let Some(&index) = indices.iter().find(|&&index| index >= len) {
            return Err(RegistryError::IndexOutOfRange { index, len });
        }

        let selected: BTreeSet<usize> = indices.iter().copied().collect();
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.entries)
            .into_iter()
            .enumerate()
            .partition(|(index, _)| selected.contains(index));

        self.entries = kept.into_iter().map(|(_, entry)| entry).collect();
        Ok(removed.into_iter().map(|(_, entry)| entry).collect())
    }

    /// Set whether the entry at `index` is managed by batch operations.
    ///
    /// # Errors
    ///
    /// Returns `IndexOutOfRange` if `index` is past the end.
    pub fn set_enabled(
        &mut self,
        index: usize,
        enabled: bool,
    ) -> Result<&SupervisedEntry, RegistryError> {
        let len = self.entries.len();
        let entry = self
            .entries
            .get_mut(index)
            .ok_or(RegistryError::IndexOutOfRange { index, len })?;
        entry.set_enabled(enabled);
        Ok(entry)
    }

    /// Write refreshed statuses back by entry id.
    ///
    /// Ids that are no longer present are skipped. Returns how many
    /// statuses changed.
    pub fn apply_statuses(&mut self, statuses: &[(EntryId, EntryStatus)]) -> usize {
        let mut changed = 0;
        for &(id, status) in statuses {
            if let Some(entry) = self.entries.iter_mut().find(|e| e.id() == id) {
                if entry.status() != status {
                    entry.set_status(status);
                    changed += 1;
                }
            }
        }
        changed
    }

    /// Per-entry copies of the fields batch operations act on.
    #[must_use]
    pub fn snapshot(&self) -> Vec<EntrySnapshot> {
        self.entries.iter().map(SupervisedEntry::snapshot).collect()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&SupervisedEntry> {
        self.entries.get(index)
    }

    /// Index of the first entry with exactly this path.
    #[must_use]
    pub fn find_by_path(&self, path: &Path) -> Option<usize> {
        self.entries.iter().position(|e| e.path() == path)
    }

    #[must_use]
    pub fn entries(&self) -> &[SupervisedEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &SupervisedEntry> {
        self.entries.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Unique, time-based backup name next to `path`.
fn backup_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map_or_else(|| DEFAULT_REGISTRY_FILE.into(), |n| n.to_string_lossy());
    let stamp = chrono::Local::now().format("%Y%m%d%H%M%S%f").to_string();

    let mut candidate = path.with_file_name(format!("{stamp}_{file_name}"));
    let mut attempt = 1u32;
    while candidate.exists() {
        candidate = path.with_file_name(format!("{stamp}-{attempt}_{file_name}"));
        attempt += 1;
    }
    candidate
}
