//! Batch operations and their aggregated outcome.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinHandle;

use super::SupervisorError;

/// A start, stop or restart applied across the whole registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchKind {
    Start,
    Stop,
    Restart,
}

impl BatchKind {
    /// Infinitive verb, e.g. "start".
    #[must_use]
    pub fn verb(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
        }
    }

    /// Past tense, e.g. "started".
    #[must_use]
    pub fn past_tense(self) -> &'static str {
        match self {
            Self::Start => "started",
            Self::Stop => "stopped",
            Self::Restart => "restarted",
        }
    }
}

impl fmt::Display for BatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

/// One application that could not be started or stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryFailure {
    pub path: PathBuf,
    pub reason: String,
}

/// Terminal outcome of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchOutcome {
    Success,
    PartialFailure { failed: usize, total: usize },
}

/// Result of a completed batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub kind: BatchKind,
    /// Entries in the registry when the batch began.
    pub entries: usize,
    /// Launches and kills actually attempted.
    pub attempted: usize,
    pub failures: Vec<EntryFailure>,
}

impl BatchReport {
    #[must_use]
    pub fn new(kind: BatchKind, entries: usize) -> Self {
        Self {
            kind,
            entries,
            attempted: 0,
            failures: Vec::new(),
        }
    }

    pub(crate) fn record_attempt(&mut self) {
        self.attempted += 1;
    }

    pub(crate) fn record_failure(&mut self, path: &Path, reason: impl Into<String>) {
        self.failures.push(EntryFailure {
            path: path.to_path_buf(),
            reason: reason.into(),
        });
    }

    /// Fold the passes of a restart into one report.
    #[must_use]
    pub(crate) fn combine(kind: BatchKind, stop: Self, start: Self) -> Self {
        let mut failures = stop.failures;
        failures.extend(start.failures);
        Self {
            kind,
            entries: stop.entries.max(start.entries),
            attempted: stop.attempted + start.attempted,
            failures,
        }
    }

    #[must_use]
    pub fn outcome(&self) -> BatchOutcome {
        if self.failures.is_empty() {
            BatchOutcome::Success
        } else {
            BatchOutcome::PartialFailure {
                failed: self.failures.len(),
                total: self.attempted,
            }
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// One-line human readable summary.
    #[must_use]
    pub fn summary(&self) -> String {
        match self.outcome() {
            BatchOutcome::Success => format!("Applications {}", self.kind.past_tense()),
            BatchOutcome::PartialFailure { failed, total } => format!(
                "{failed} of {total} applications failed to {}",
                self.kind.verb()
            ),
        }
    }
}

/// A batch running in the background.
#[derive(Debug)]
pub struct BatchHandle {
    kind: BatchKind,
    join: JoinHandle<BatchReport>,
}

impl BatchHandle {
    pub(crate) fn new(kind: BatchKind, join: JoinHandle<BatchReport>) -> Self {
        Self { kind, join }
    }

    #[must_use]
    pub fn kind(&self) -> BatchKind {
        self.kind
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the batch to finish.
    ///
    /// # Errors
    ///
    /// Returns `SupervisorError::Join` if the batch task panicked.
    pub async fn wait(self) -> Result<BatchReport, SupervisorError> {
        Ok(self.join.await?)
    }
}

/// Single-holder flag used to reject overlapping work.
#[derive(Debug, Default)]
pub(crate) struct BusyFlag(Arc<AtomicBool>);

impl BusyFlag {
    pub(crate) fn try_acquire(&self) -> Option<BusyGuard> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard(Arc::clone(&self.0)))
    }

    pub(crate) fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Clears its flag when dropped.
#[derive(Debug)]
pub(crate) struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
