//! Process error types.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Errors that can occur while launching an application.
#[derive(thiserror::Error, Debug)]
pub enum LaunchError {
    /// The executable does not exist.
    #[error("Executable not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// The executable could not be run by this user.
    #[error("Permission denied: {}", path.display())]
    PermissionDenied { path: PathBuf },

    /// Other I/O error while spawning.
    #[error("Failed to launch {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The process was spawned but exited before the OS reported an id.
    #[error("Process for {} exited immediately after launch", path.display())]
    Exited { path: PathBuf },

    /// The process never became queryable within the confirmation window.
    #[error("Launch of {} (pid {pid}) not confirmed within {timeout:?}", path.display())]
    Unconfirmed {
        path: PathBuf,
        pid: u32,
        timeout: Duration,
    },
}

impl LaunchError {
    /// Create a `LaunchError` from an I/O error, classifying common cases.
    #[must_use]
    pub fn from_io(path: &Path, err: std::io::Error) -> Self {
        let path = path.to_path_buf();
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            _ => Self::Io { path, source: err },
        }
    }
}

/// Errors that can occur while force-terminating a process.
#[derive(thiserror::Error, Debug)]
pub enum TerminateError {
    /// The pid does not fit the platform's pid type.
    #[error("Invalid pid: {0}")]
    InvalidPid(u32),

    /// Sending the kill signal failed.
    #[error("Failed to kill process {pid}: {source}")]
    Signal {
        pid: u32,
        source: std::io::Error,
    },

    /// The platform refused to terminate the process.
    #[error("Process {pid} could not be terminated")]
    Refused { pid: u32 },
}
