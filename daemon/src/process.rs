use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use sysinfo::{Pid, Process, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System, UpdateKind};

use crate::error::ProbeError;

/// Opaque reference to an OS process.
///
/// Equality and hashing use the pid alone. The start time is kept so
/// liveness checks can tell a recycled pid from the original process.
#[derive(Debug, Clone, Copy)]
pub struct ProcessHandle {
    pid: u32,
    started_at: u64,
}

impl ProcessHandle {
    pub fn new(pid: u32, started_at: u64) -> Self {
        Self { pid, started_at }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn started_at(&self) -> u64 {
        self.started_at
    }
}

impl PartialEq for ProcessHandle {
    fn eq(&self, other: &Self) -> bool {
        self.pid == other.pid
    }
}

impl Eq for ProcessHandle {}

impl Hash for ProcessHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.pid.hash(state);
    }
}

/// Read-only view of the OS process table.
pub trait ProcessTable {
    /// Refreshes and lists every process in the table.
    fn snapshot(&mut self) -> Vec<ProcessHandle>;

    /// Lists the children of `root`, or all descendants when `recursive`.
    fn children(
        &mut self,
        root: &ProcessHandle,
        recursive: bool,
    ) -> Result<Vec<ProcessHandle>, ProbeError>;

    /// Resolves the executable path of `process`.
    fn exe(&mut self, process: &ProcessHandle) -> Result<PathBuf, ProbeError>;

    /// True while `process` exists and is not a zombie.
    fn is_running(&mut self, process: &ProcessHandle) -> bool;
}

/// [`ProcessTable`] backed by `sysinfo`. The owned [`System`] is the
/// OS-level cache used by full scans; it keeps resolved exe paths per pid
/// and drops entries for processes that disappear between refreshes.
pub struct SysinfoTable {
    system: System,
}

impl SysinfoTable {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }

    fn live(&self, handle: &ProcessHandle) -> Option<&Process> {
        self.system
            .process(Pid::from_u32(handle.pid))
            .filter(|p| p.start_time() == handle.started_at)
    }
}

impl Default for SysinfoTable {
    fn default() -> Self {
        Self::new()
    }
}

fn handle_of(pid: Pid, process: &Process) -> ProcessHandle {
    ProcessHandle::new(pid.as_u32(), process.start_time())
}

impl ProcessTable for SysinfoTable {
    fn snapshot(&mut self) -> Vec<ProcessHandle> {
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::new().with_exe(UpdateKind::OnlyIfNotSet),
        );
        self.system
            .processes()
            .iter()
            .map(|(pid, p)| handle_of(*pid, p))
            .collect()
    }

    fn children(
        &mut self,
        root: &ProcessHandle,
        recursive: bool,
    ) -> Result<Vec<ProcessHandle>, ProbeError> {
        // Parent links only; exe paths are resolved lazily for descendants.
        self.system
            .refresh_processes_specifics(ProcessesToUpdate::All, true, ProcessRefreshKind::new());
        if self.live(root).is_none() {
            return Err(ProbeError::NoSuchProcess(root.pid));
        }

        let mut by_parent: HashMap<Pid, Vec<Pid>> = HashMap::new();
        for (pid, process) in self.system.processes() {
            if let Some(parent) = process.parent() {
                by_parent.entry(parent).or_default().push(*pid);
            }
        }

        let mut found = Vec::new();
        let mut queue = VecDeque::from([Pid::from_u32(root.pid)]);
        while let Some(parent) = queue.pop_front() {
            for child in by_parent.get(&parent).into_iter().flatten() {
                if let Some(process) = self.system.process(*child) {
                    found.push(handle_of(*child, process));
                    if recursive {
                        queue.push_back(*child);
                    }
                }
            }
        }
        Ok(found)
    }

    fn exe(&mut self, process: &ProcessHandle) -> Result<PathBuf, ProbeError> {
        let pid = Pid::from_u32(process.pid);
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::new().with_exe(UpdateKind::OnlyIfNotSet),
        );
        let live = self
            .live(process)
            .ok_or(ProbeError::NoSuchProcess(process.pid))?;
        live.exe()
            .map(Path::to_path_buf)
            .ok_or(ProbeError::AccessDenied(process.pid))
    }

    fn is_running(&mut self, process: &ProcessHandle) -> bool {
        let pid = Pid::from_u32(process.pid);
        self.system
            .refresh_processes_specifics(ProcessesToUpdate::Some(&[pid]), true, ProcessRefreshKind::new());
        self.live(process)
            .is_some_and(|p| p.status() != ProcessStatus::Zombie)
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! In-memory process table shared between a test and the code under test.

    use super::*;
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone)]
    struct FakeProcess {
        exe: Option<PathBuf>,
        parent: Option<u32>,
        started_at: u64,
        zombie: bool,
    }

    #[derive(Debug, Default)]
    struct Inner {
        processes: BTreeMap<u32, FakeProcess>,
        snapshots: usize,
        exe_lookups: usize,
    }

    #[derive(Debug, Clone, Default)]
    pub struct FakeProcessTable {
        inner: Arc<Mutex<Inner>>,
    }

    impl FakeProcessTable {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn spawn(&self, pid: u32, exe: &str, parent: Option<u32>) -> ProcessHandle {
            self.spawn_at(pid, exe, parent, 1)
        }

        pub fn spawn_at(&self, pid: u32, exe: &str, parent: Option<u32>, started_at: u64) -> ProcessHandle {
            let mut inner = self.inner.lock().unwrap();
            inner.processes.insert(
                pid,
                FakeProcess {
                    exe: Some(PathBuf::from(exe)),
                    parent,
                    started_at,
                    zombie: false,
                },
            );
            ProcessHandle::new(pid, started_at)
        }

        /// A process whose exe path cannot be read.
        pub fn spawn_denied(&self, pid: u32, parent: Option<u32>) {
            let mut inner = self.inner.lock().unwrap();
            inner.processes.insert(
                pid,
                FakeProcess {
                    exe: None,
                    parent,
                    started_at: 1,
                    zombie: false,
                },
            );
        }

        pub fn kill(&self, pid: u32) {
            self.inner.lock().unwrap().processes.remove(&pid);
        }

        pub fn zombify(&self, pid: u32) {
            if let Some(p) = self.inner.lock().unwrap().processes.get_mut(&pid) {
                p.zombie = true;
            }
        }

        pub fn snapshots(&self) -> usize {
            self.inner.lock().unwrap().snapshots
        }

        pub fn exe_lookups(&self) -> usize {
            self.inner.lock().unwrap().exe_lookups
        }
    }

    impl Inner {
        fn live(&self, handle: &ProcessHandle) -> Option<&FakeProcess> {
            self.processes
                .get(&handle.pid())
                .filter(|p| p.started_at == handle.started_at())
        }
    }

    impl ProcessTable for FakeProcessTable {
        fn snapshot(&mut self) -> Vec<ProcessHandle> {
            let mut inner = self.inner.lock().unwrap();
            inner.snapshots += 1;
            inner
                .processes
                .iter()
                .map(|(pid, p)| ProcessHandle::new(*pid, p.started_at))
                .collect()
        }

        fn children(
            &mut self,
            root: &ProcessHandle,
            recursive: bool,
        ) -> Result<Vec<ProcessHandle>, ProbeError> {
            let inner = self.inner.lock().unwrap();
            if inner.live(root).is_none() {
                return Err(ProbeError::NoSuchProcess(root.pid()));
            }
            let mut found = Vec::new();
            let mut queue = VecDeque::from([root.pid()]);
            while let Some(parent) = queue.pop_front() {
                for (pid, p) in &inner.processes {
                    if p.parent == Some(parent) {
                        found.push(ProcessHandle::new(*pid, p.started_at));
                        if recursive {
                            queue.push_back(*pid);
                        }
                    }
                }
            }
            Ok(found)
        }

        fn exe(&mut self, process: &ProcessHandle) -> Result<PathBuf, ProbeError> {
            let mut inner = self.inner.lock().unwrap();
            inner.exe_lookups += 1;
            let live = inner
                .live(process)
                .ok_or(ProbeError::NoSuchProcess(process.pid()))?;
            live.exe
                .clone()
                .ok_or(ProbeError::AccessDenied(process.pid()))
        }

        fn is_running(&mut self, process: &ProcessHandle) -> bool {
            let inner = self.inner.lock().unwrap();
            inner.live(process).is_some_and(|p| !p.zombie)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FakeProcessTable;
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn handles_compare_by_pid_only() {
        let a = ProcessHandle::new(42, 100);
        let b = ProcessHandle::new(42, 200);
        assert_eq!(a, b);

        let set: HashSet<_> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn recycled_pid_reads_as_not_running() {
        let mut table = FakeProcessTable::new();
        let original = table.spawn_at(7, "/games/a/run", None, 10);
        table.kill(7);
        table.spawn_at(7, "/usr/bin/other", None, 20);

        assert!(!table.is_running(&original));
        assert_eq!(table.exe(&original), Err(ProbeError::NoSuchProcess(7)));
    }

    #[test]
    fn sysinfo_sees_current_process() {
        let mut table = SysinfoTable::new();
        let me = std::process::id();
        let handle = table
            .snapshot()
            .into_iter()
            .find(|h| h.pid() == me)
            .expect("current process in snapshot");
        assert!(table.is_running(&handle));
        assert!(table.exe(&handle).is_ok());
    }
}
