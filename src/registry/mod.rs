//! The ordered list of supervised applications.
//!
//! This module holds the in-memory registry of applications and its
//! persistence to a TOML file with timestamped backups.

mod error;
mod store;
mod types;

pub use error::RegistryError;
pub use store::{Registry, DEFAULT_REGISTRY_FILE};
pub use types::{EntryId, EntrySnapshot, EntryStatus, PersistedEntry, SupervisedEntry};
