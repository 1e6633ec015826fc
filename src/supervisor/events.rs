//! Notifications for front ends.

use std::path::PathBuf;

use crate::registry::SupervisedEntry;

use super::{BatchKind, BatchReport};

/// Default capacity for the event broadcast channel.
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 64;

/// Something a front end may want to redraw for.
#[derive(Debug, Clone)]
pub enum SupervisorEvent {
    /// A batch was accepted and is running in the background.
    BatchStarted { kind: BatchKind },
    /// A batch attempted every entry.
    BatchFinished { report: BatchReport },
    /// A status refresh pass completed.
    StatusRefreshed {
        entries: Vec<SupervisedEntry>,
        changed: usize,
    },
    /// An application was appended to the registry.
    EntryAdded { entry: SupervisedEntry },
    /// Applications were removed from the registry.
    EntriesRemoved { count: usize },
    /// The registry was replaced from disk.
    RegistryLoaded { count: usize },
    /// The registry was written to disk.
    RegistrySaved {
        path: PathBuf,
        backup: Option<PathBuf>,
    },
}
