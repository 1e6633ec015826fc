//! The host process table.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use sysinfo::{Pid, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System, UpdateKind};
use tokio::process::Command;

use super::{LaunchError, TerminateError};

/// A live process as seen during one enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    /// Process ID.
    pub pid: u32,
    /// Executable image path, `None` when it could not be read.
    pub exe: Option<PathBuf>,
}

/// Operations the supervisor needs from the operating system.
#[async_trait]
pub trait ProcessTable: Send + Sync {
    /// Enumerate currently running processes.
    ///
    /// Processes whose image path cannot be read are reported with
    /// `exe: None` rather than failing the enumeration.
    async fn processes(&self) -> Vec<ProcessInfo>;

    /// Launch the executable with no arguments and return its pid.
    async fn launch(&self, path: &Path) -> Result<u32, LaunchError>;

    /// Start time of the process, or `None` if it cannot be queried yet.
    async fn start_time(&self, pid: u32) -> Option<u64>;

    /// Forcibly terminate the process.
    ///
    /// A process that is already gone counts as terminated.
    async fn terminate(&self, pid: u32) -> Result<(), TerminateError>;
}

/// [`ProcessTable`] backed by the real operating system.
#[derive(Debug, Clone)]
pub struct SystemProcessTable {
    system: Arc<Mutex<System>>,
}

impl SystemProcessTable {
    /// Create a new table. No processes are loaded until first use.
    #[must_use]
    pub fn new() -> Self {
        Self {
            system: Arc::new(Mutex::new(System::new())),
        }
    }

    /// Run `f` against the shared `System` on the blocking pool.
    async fn with_system<F, R>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&mut System) -> R + Send + 'static,
        R: Send + 'static,
    {
        let system = Arc::clone(&self.system);
        let result = tokio::task::spawn_blocking(move || {
            let mut sys = system.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut sys)
        })
        .await;

        match result {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(error = %e, "Process table query failed");
                None
            }
        }
    }
}

impl Default for SystemProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessTable for SystemProcessTable {
    async fn processes(&self) -> Vec<ProcessInfo> {
        self.with_system(|sys| {
            sys.refresh_processes_specifics(
                ProcessesToUpdate::All,
                true,
                ProcessRefreshKind::new().with_exe(UpdateKind::Always),
            );
            sys.processes()
                .iter()
                // Killed children linger as zombies until reaped.
                .filter(|(_, process)| process.status() != ProcessStatus::Zombie)
                .map(|(pid, process)| ProcessInfo {
                    pid: pid.as_u32(),
                    exe: process.exe().map(Path::to_path_buf),
                })
                .collect()
        })
        .await
        .unwrap_or_default()
    }

    async fn launch(&self, path: &Path) -> Result<u32, LaunchError> {
        let mut cmd = Command::new(path);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        if let Some(dir) = path.parent() {
            cmd.current_dir(dir);
        }

        // Keep supervised apps out of the front end's process group so a
        // terminal Ctrl-C does not take them down with it.
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn().map_err(|e| LaunchError::from_io(path, e))?;

        // Dropping the handle detaches the child; tokio reaps it on exit.
        child.id().ok_or_else(|| LaunchError::Exited {
            path: path.to_path_buf(),
        })
    }

    async fn start_time(&self, pid: u32) -> Option<u64> {
        self.with_system(move |sys| {
            let pid = Pid::from_u32(pid);
            sys.refresh_processes_specifics(
                ProcessesToUpdate::Some(&[pid]),
                true,
                ProcessRefreshKind::new(),
            );
            sys.process(pid).map(sysinfo::Process::start_time)
        })
        .await
        .flatten()
    }

    async fn terminate(&self, pid: u32) -> Result<(), TerminateError> {
        #[cfg(unix)]
        {
            use nix::errno::Errno;
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid as NixPid;

            let raw = i32::try_from(pid).map_err(|_| TerminateError::InvalidPid(pid))?;
            match kill(NixPid::from_raw(raw), Signal::SIGKILL) {
                Ok(()) | Err(Errno::ESRCH) => Ok(()),
                Err(e) => Err(TerminateError::Signal {
                    pid,
                    source: e.into(),
                }),
            }
        }

        #[cfg(not(unix))]
        {
            let killed = self
                .with_system(move |sys| {
                    let pid = Pid::from_u32(pid);
                    sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
                    sys.process(pid).map_or(true, sysinfo::Process::kill)
                })
                .await
                .unwrap_or(false);

            if killed {
                Ok(())
            } else {
                Err(TerminateError::Refused { pid })
            }
        }
    }
}
