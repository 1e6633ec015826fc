//! Supervisor for starting, stopping and watching registered applications.
//!
//! The supervisor owns the registry behind an async `RwLock`. Batches and
//! refresh passes only hold the lock long enough to copy what they need
//! (or to write statuses back by entry id); process enumeration, launching
//! and killing happen outside it.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex, RwLock};

use crate::config::StarterConfig;
use crate::process::{
    canonical_path, launch_and_confirm, lexical_absolute, LaunchPolicy, ProcessMatcher,
    ProcessTable, SystemProcessTable,
};
use crate::registry::{EntrySnapshot, EntryStatus, Registry, RegistryError, SupervisedEntry};

use super::batch::BusyFlag;
use super::{
    BatchHandle, BatchKind, BatchReport, SupervisorEvent, DEFAULT_EVENT_CHANNEL_CAPACITY,
};

/// Error type for supervisor operations.
#[derive(thiserror::Error, Debug)]
pub enum SupervisorError {
    /// A batch was requested on an empty registry.
    #[error("There are no applications to {kind}")]
    NoEntries { kind: BatchKind },

    /// Another batch has not finished yet.
    #[error("Another start, stop or restart is still running")]
    BatchInProgress,

    /// The path to add is not an existing file.
    #[error("Not an executable file: {}", path.display())]
    InvalidPath { path: PathBuf },

    /// Loading, saving or editing the registry failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A background task panicked or was cancelled.
    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Result of asking for a status refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A pass ran; `changed` entries flipped status.
    Completed { changed: usize },
    /// Another pass was already in flight, so this request was dropped.
    Skipped,
}

/// Construction options for a [`Supervisor`].
#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    /// Where `load` and `save` read and write the application list.
    pub registry_path: PathBuf,
    pub launch: LaunchPolicy,
    /// Pause between the stop and start passes of a restart.
    pub restart_settle: Duration,
    pub event_capacity: usize,
}

impl SupervisorOptions {
    /// Default options for the given registry file.
    #[must_use]
    pub fn new(registry_path: impl Into<PathBuf>) -> Self {
        Self {
            registry_path: registry_path.into(),
            launch: LaunchPolicy::default(),
            restart_settle: Duration::ZERO,
            event_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
        }
    }

    #[must_use]
    pub fn launch_policy(mut self, launch: LaunchPolicy) -> Self {
        self.launch = launch;
        self
    }

    #[must_use]
    pub fn restart_settle(mut self, settle: Duration) -> Self {
        self.restart_settle = settle;
        self
    }
}

impl From<&StarterConfig> for SupervisorOptions {
    fn from(config: &StarterConfig) -> Self {
        Self::new(config.registry_path())
            .launch_policy(config.launch_policy())
            .restart_settle(config.restart_settle())
    }
}

struct Shared {
    registry: RwLock<Registry>,
    matcher: ProcessMatcher,
    options: SupervisorOptions,
    batch_busy: BusyFlag,
    refresh_busy: BusyFlag,
    refresh_passes: AtomicU64,
    save_lock: Mutex<()>,
    events: broadcast::Sender<SupervisorEvent>,
}

/// Handle to the supervisor. Clones share the same registry and state.
#[derive(Clone)]
pub struct Supervisor {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("registry_path", &self.shared.options.registry_path)
            .field("batch_running", &self.is_batch_running())
            .finish_non_exhaustive()
    }
}

impl Supervisor {
    /// Create a supervisor with an empty registry over the given process table.
    #[must_use]
    pub fn new(table: Arc<dyn ProcessTable>, options: SupervisorOptions) -> Self {
        let (events, _) = broadcast::channel(options.event_capacity.max(1));
        Self {
            shared: Arc::new(Shared {
                registry: RwLock::new(Registry::new()),
                matcher: ProcessMatcher::new(table),
                options,
                batch_busy: BusyFlag::default(),
                refresh_busy: BusyFlag::default(),
                refresh_passes: AtomicU64::new(0),
                save_lock: Mutex::new(()),
                events,
            }),
        }
    }

    /// Create a supervisor over the real operating system.
    #[must_use]
    pub fn with_system_table(options: SupervisorOptions) -> Self {
        Self::new(Arc::new(SystemProcessTable::new()), options)
    }

    #[must_use]
    pub fn registry_path(&self) -> &Path {
        &self.shared.options.registry_path
    }

    #[must_use]
    pub fn matcher(&self) -> &ProcessMatcher {
        &self.shared.matcher
    }

    /// Receive notifications about batches, refreshes and registry changes.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.shared.events.subscribe()
    }

    #[must_use]
    pub fn is_batch_running(&self) -> bool {
        self.shared.batch_busy.is_set()
    }

    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        self.shared.refresh_busy.is_set()
    }

    /// Number of refresh passes that have actually run.
    #[must_use]
    pub fn refresh_passes(&self) -> u64 {
        self.shared.refresh_passes.load(Ordering::Relaxed)
    }

    fn emit(&self, event: SupervisorEvent) {
        // No subscribers is fine.
        let _ = self.shared.events.send(event);
    }

    /// Current entries in display order.
    pub async fn list_entries(&self) -> Vec<SupervisedEntry> {
        self.shared.registry.read().await.entries().to_vec()
    }

    /// Append an application, probing whether it is already running.
    ///
    /// The new entry is disabled. A full refresh is triggered afterwards.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPath` if `path` does not name an existing file.
    pub async fn add_entry(&self, path: impl AsRef<Path>) -> Result<SupervisedEntry, SupervisorError> {
        let path = path.as_ref();
        let invalid = || SupervisorError::InvalidPath {
            path: path.to_path_buf(),
        };

        let absolute = lexical_absolute(path).ok_or_else(invalid)?;
        let metadata = tokio::fs::metadata(&absolute).await.map_err(|_| invalid())?;
        if !metadata.is_file() {
            return Err(invalid());
        }

        let status = EntryStatus::from_running(self.shared.matcher.is_running(&absolute).await);
        let entry = self
            .shared
            .registry
            .write()
            .await
            .add(absolute, status)
            .clone();

        tracing::info!(path = %entry.path().display(), %status, "Added application");
        self.emit(SupervisorEvent::EntryAdded {
            entry: entry.clone(),
        });
        self.trigger_refresh();
        Ok(entry)
    }

    /// Remove entries by their current positions.
    ///
    /// # Errors
    ///
    /// Returns `BatchInProgress` while a batch is running, or a registry
    /// error if any index is out of range. Nothing is removed in either case.
    pub async fn remove_entries(
        &self,
        indices: &[usize],
    ) -> Result<Vec<SupervisedEntry>, SupervisorError> {
        let removed = {
            let mut registry = self.shared.registry.write().await;
            self.ensure_no_batch()?;
            registry.remove(indices)?
        };
        tracing::info!(count = removed.len(), "Removed applications");
        self.emit(SupervisorEvent::EntriesRemoved {
            count: removed.len(),
        });
        Ok(removed)
    }

    /// Enable or disable batch management of one entry.
    ///
    /// # Errors
    ///
    /// Returns `BatchInProgress` while a batch is running, or a registry
    /// error if `index` is out of range.
    pub async fn set_enabled(
        &self,
        index: usize,
        enabled: bool,
    ) -> Result<SupervisedEntry, SupervisorError> {
        let entry = {
            let mut registry = self.shared.registry.write().await;
            self.ensure_no_batch()?;
            registry.set_enabled(index, enabled)?.clone()
        };
        tracing::debug!(index, enabled, path = %entry.path().display(), "Updated application");
        Ok(entry)
    }

    /// Batches take their targets under the registry lock, so checking the
    /// flag while holding the write lock keeps edits out of running passes.
    fn ensure_no_batch(&self) -> Result<(), SupervisorError> {
        if self.is_batch_running() {
            Err(SupervisorError::BatchInProgress)
        } else {
            Ok(())
        }
    }

    /// Replace the registry with the persisted application list.
    ///
    /// Returns the number of entries loaded. Each entry's status is probed
    /// against the process table before the registry is swapped in.
    ///
    /// # Errors
    ///
    /// Returns a registry error if the file is unreadable or malformed; the
    /// current registry is left unchanged.
    pub async fn load(&self) -> Result<usize, SupervisorError> {
        let path = self.shared.options.registry_path.clone();
        let mut loaded = tokio::task::spawn_blocking(move || Registry::load(&path)).await??;
        let count = loaded.len();

        if !loaded.is_empty() {
            let processes = self.shared.matcher.snapshot().await;
            let statuses: Vec<_> = loaded
                .snapshot()
                .iter()
                .map(|t| (t.id, EntryStatus::from_running(processes.is_running(&t.path))))
                .collect();
            loaded.apply_statuses(&statuses);
        }

        *self.shared.registry.write().await = loaded;

        tracing::info!(path = %self.registry_path().display(), count, "Loaded applications");
        self.emit(SupervisorEvent::RegistryLoaded { count });
        Ok(count)
    }

    /// Persist the registry, keeping the previous file as a backup.
    ///
    /// Returns the backup path, if there was a previous file.
    ///
    /// # Errors
    ///
    /// Returns a registry error if the registry is empty or writing fails.
    pub async fn save(&self) -> Result<Option<PathBuf>, SupervisorError> {
        self.persist(false).await
    }

    /// Like [`Supervisor::save`], but an empty registry is written as an
    /// empty list instead of being rejected.
    ///
    /// # Errors
    ///
    /// Returns a registry error if writing fails.
    pub async fn save_allow_empty(&self) -> Result<Option<PathBuf>, SupervisorError> {
        self.persist(true).await
    }

    async fn persist(&self, allow_empty: bool) -> Result<Option<PathBuf>, SupervisorError> {
        // One writer at a time; saves share the same temp file.
        let _save = self.shared.save_lock.lock().await;
        let registry = self.shared.registry.read().await.clone();
        let path = self.shared.options.registry_path.clone();

        let target = path.clone();
        let backup = tokio::task::spawn_blocking(move || {
            if allow_empty {
                registry.save_allow_empty(&target)
            } else {
                registry.save(&target)
            }
        })
        .await??;

        self.emit(SupervisorEvent::RegistrySaved {
            path,
            backup: backup.clone(),
        });
        Ok(backup)
    }

    /// Start every enabled application that is not running.
    ///
    /// # Errors
    ///
    /// Returns `NoEntries` for an empty registry and `BatchInProgress` if
    /// another batch has not finished.
    pub async fn start_all(&self) -> Result<BatchHandle, SupervisorError> {
        self.spawn_batch(BatchKind::Start).await
    }

    /// Kill every enabled application that is running.
    ///
    /// # Errors
    ///
    /// Same as [`Supervisor::start_all`].
    pub async fn stop_all(&self) -> Result<BatchHandle, SupervisorError> {
        self.spawn_batch(BatchKind::Stop).await
    }

    /// A stop pass followed by a start pass.
    ///
    /// # Errors
    ///
    /// Same as [`Supervisor::start_all`].
    pub async fn restart_all(&self) -> Result<BatchHandle, SupervisorError> {
        self.spawn_batch(BatchKind::Restart).await
    }

    async fn spawn_batch(&self, kind: BatchKind) -> Result<BatchHandle, SupervisorError> {
        if self.shared.registry.read().await.is_empty() {
            return Err(SupervisorError::NoEntries { kind });
        }
        let guard = self
            .shared
            .batch_busy
            .try_acquire()
            .ok_or(SupervisorError::BatchInProgress)?;

        tracing::info!(%kind, "Batch started");
        self.emit(SupervisorEvent::BatchStarted { kind });

        let this = self.clone();
        let join = tokio::spawn(async move {
            let report = this.run_batch(kind).await;
            drop(guard);

            tracing::info!(
                %kind,
                attempted = report.attempted,
                failed = report.failures.len(),
                "{}",
                report.summary()
            );
            this.emit(SupervisorEvent::BatchFinished {
                report: report.clone(),
            });
            this.trigger_refresh();
            report
        });

        Ok(BatchHandle::new(kind, join))
    }

    async fn run_batch(&self, kind: BatchKind) -> BatchReport {
        match kind {
            BatchKind::Start => self.start_pass().await,
            BatchKind::Stop => self.stop_pass().await,
            BatchKind::Restart => {
                let stop = self.stop_pass().await;
                let settle = self.shared.options.restart_settle;
                if !settle.is_zero() {
                    tokio::time::sleep(settle).await;
                }
                let start = self.start_pass().await;
                BatchReport::combine(BatchKind::Restart, stop, start)
            }
        }
    }

    async fn targets(&self) -> Vec<EntrySnapshot> {
        self.shared.registry.read().await.snapshot()
    }

    async fn start_pass(&self) -> BatchReport {
        let targets = self.targets().await;
        let processes = self.shared.matcher.snapshot().await;
        let table = self.shared.matcher.table();
        let mut report = BatchReport::new(BatchKind::Start, targets.len());
        // Duplicate entries for one executable launch it once per pass.
        let mut launched: HashSet<PathBuf> = HashSet::new();

        for target in targets.iter().filter(|t| t.enabled) {
            let key = canonical_path(&target.path).unwrap_or_else(|| target.path.clone());
            if launched.contains(&key) || processes.is_running(&target.path) {
                tracing::debug!(path = %target.path.display(), "Already running");
                continue;
            }

            report.record_attempt();
            match launch_and_confirm(table.as_ref(), &target.path, &self.shared.options.launch)
                .await
            {
                Ok(_) => {
                    launched.insert(key);
                }
                Err(e) => {
                    tracing::warn!(path = %target.path.display(), error = %e, "Failed to start application");
                    report.record_failure(&target.path, e.to_string());
                }
            }
        }

        report
    }

    async fn stop_pass(&self) -> BatchReport {
        let targets = self.targets().await;
        let processes = self.shared.matcher.snapshot().await;
        let table = self.shared.matcher.table();
        let mut report = BatchReport::new(BatchKind::Stop, targets.len());

        for target in targets.iter().filter(|t| t.enabled) {
            let Some(process) = processes.find(&target.path) else {
                continue;
            };

            report.record_attempt();
            match table.terminate(process.pid).await {
                Ok(()) => {
                    tracing::info!(path = %target.path.display(), pid = process.pid, "Application stopped");
                }
                Err(e) => {
                    tracing::warn!(path = %target.path.display(), error = %e, "Failed to stop application");
                    report.record_failure(&target.path, e.to_string());
                }
            }
        }

        report
    }

    /// Re-scan the process table and update every entry's status.
    ///
    /// Only one pass runs at a time; a call made while another pass is in
    /// flight returns [`RefreshOutcome::Skipped`] without scanning.
    pub async fn refresh_status(&self) -> RefreshOutcome {
        let Some(_guard) = self.shared.refresh_busy.try_acquire() else {
            tracing::trace!("Status refresh already in flight");
            return RefreshOutcome::Skipped;
        };
        self.shared.refresh_passes.fetch_add(1, Ordering::Relaxed);

        let targets = self.targets().await;
        let processes = self.shared.matcher.snapshot().await;
        let statuses: Vec<_> = targets
            .iter()
            .map(|t| (t.id, EntryStatus::from_running(processes.is_running(&t.path))))
            .collect();

        let (changed, entries) = {
            let mut registry = self.shared.registry.write().await;
            let changed = registry.apply_statuses(&statuses);
            (changed, registry.entries().to_vec())
        };

        tracing::debug!(entries = entries.len(), changed, "Status refreshed");
        self.emit(SupervisorEvent::StatusRefreshed { entries, changed });
        RefreshOutcome::Completed { changed }
    }

    /// Start a refresh in the background unless one is already running.
    fn trigger_refresh(&self) {
        if self.is_refreshing() {
            return;
        }
        let this = self.clone();
        tokio::spawn(async move {
            this.refresh_status().await;
        });
    }
}
