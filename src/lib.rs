//! App Starter - start, stop, restart and watch a list of applications.
//!
//! Applications are registered by executable path. Enabled entries are
//! launched or killed in batches, and a poller keeps each entry's running
//! status in sync with the host process table.

pub mod config;
pub mod display;
pub mod process;
pub mod registry;
pub mod supervisor;
