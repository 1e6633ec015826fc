//! Host process table access, path matching and launching.
//!
//! Everything that touches the operating system goes through the
//! [`ProcessTable`] trait so the supervisor can be driven against a scripted
//! table in tests.

mod error;
mod launcher;
mod matcher;
mod table;

pub use error::{LaunchError, TerminateError};
pub use launcher::*;
pub use matcher::*;
pub use table::*;
