//! In-memory process table for driving the supervisor in tests.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use app_starter::process::{LaunchError, ProcessInfo, ProcessTable, TerminateError};
use app_starter::registry::{EntryStatus, Registry};
use app_starter::supervisor::{Supervisor, SupervisorOptions};
use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::Notify;

#[derive(Default)]
struct State {
    next_pid: u32,
    processes: Vec<ProcessInfo>,
    failing: HashSet<PathBuf>,
}

/// Process table whose processes only exist in memory.
#[derive(Default)]
pub struct FakeProcessTable {
    state: Mutex<State>,
    gate: Mutex<Option<Arc<Notify>>>,
    enumerations: AtomicUsize,
    launches: AtomicUsize,
    terminations: AtomicUsize,
}

impl FakeProcessTable {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Pretend `path` is already running; returns its pid.
    pub fn spawn(&self, path: &Path) -> u32 {
        let mut state = self.state.lock().unwrap();
        state.next_pid += 1;
        let pid = 1000 + state.next_pid;
        state.processes.push(ProcessInfo {
            pid,
            exe: Some(path.to_path_buf()),
        });
        pid
    }

    /// Make every launch of `path` fail.
    pub fn fail_launches_of(&self, path: &Path) {
        self.state
            .lock()
            .unwrap()
            .failing
            .insert(path.to_path_buf());
    }

    pub fn pids_of(&self, path: &Path) -> Vec<u32> {
        self.state
            .lock()
            .unwrap()
            .processes
            .iter()
            .filter(|p| p.exe.as_deref() == Some(path))
            .map(|p| p.pid)
            .collect()
    }

    /// Block every enumeration until [`FakeProcessTable::release`].
    pub fn hold(&self) {
        *self.gate.lock().unwrap() = Some(Arc::new(Notify::new()));
    }

    pub fn release(&self) {
        if let Some(gate) = self.gate.lock().unwrap().take() {
            gate.notify_waiters();
            gate.notify_one();
        }
    }

    pub fn enumerations(&self) -> usize {
        self.enumerations.load(Ordering::SeqCst)
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn terminations(&self) -> usize {
        self.terminations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProcessTable for FakeProcessTable {
    async fn processes(&self) -> Vec<ProcessInfo> {
        self.enumerations.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.state.lock().unwrap().processes.clone()
    }

    async fn launch(&self, path: &Path) -> Result<u32, LaunchError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        if self.state.lock().unwrap().failing.contains(path) {
            return Err(LaunchError::NotFound {
                path: path.to_path_buf(),
            });
        }
        Ok(self.spawn(path))
    }

    async fn start_time(&self, pid: u32) -> Option<u64> {
        let state = self.state.lock().unwrap();
        state.processes.iter().any(|p| p.pid == pid).then_some(1)
    }

    async fn terminate(&self, pid: u32) -> Result<(), TerminateError> {
        self.terminations.fetch_add(1, Ordering::SeqCst);
        self.state.lock().unwrap().processes.retain(|p| p.pid != pid);
        Ok(())
    }
}

/// A scratch directory holding fake executables and the registry file.
pub struct Fixture {
    pub dir: TempDir,
    pub table: Arc<FakeProcessTable>,
    pub supervisor: Supervisor,
}

impl Fixture {
    /// Create executables `names` with the given enabled flags, persist them
    /// and load them into a fresh supervisor.
    pub async fn with_entries(entries: &[(&str, bool)]) -> Self {
        let dir = TempDir::new().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        let registry_path = root.join("apps.toml");

        if !entries.is_empty() {
            let mut registry = Registry::new();
            for (index, (name, enabled)) in entries.iter().enumerate() {
                let path = root.join(name);
                fs::write(&path, b"").unwrap();
                registry.add(path, EntryStatus::Stopped);
                registry.set_enabled(index, *enabled).unwrap();
            }
            registry.save(&registry_path).unwrap();
        }

        let table = FakeProcessTable::new();
        let supervisor = Supervisor::new(table.clone(), SupervisorOptions::new(registry_path));
        supervisor.load().await.unwrap();

        Self {
            dir,
            table,
            supervisor,
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        fs::canonicalize(self.dir.path()).unwrap().join(name)
    }
}
