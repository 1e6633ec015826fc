//! Supervisor module: batch operations, status polling and notifications.

mod batch;
mod events;
mod poller;
mod runner;

pub use batch::{BatchHandle, BatchKind, BatchOutcome, BatchReport, EntryFailure};
pub use events::*;
pub use poller::*;
pub use runner::*;
