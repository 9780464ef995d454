use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

use crate::manifest::InstalledGames;
use crate::process::{ProcessHandle, ProcessTable};
use crate::search::{SearchStep, StartSearch};

/// Watch-table key of the launcher pseudo-app.
pub const LAUNCHER_ID: &str = "__launcher__";

/// An application whose running state is tracked. Two apps with the same id
/// are the same app, whatever their directory.
#[derive(Debug, Clone)]
pub struct WatchedApp {
    pub id: String,
    /// Matched as a substring of process executable paths.
    pub dir: String,
    pub is_game: bool,
}

impl PartialEq for WatchedApp {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for WatchedApp {}

impl std::hash::Hash for WatchedApp {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

#[derive(Debug)]
struct WatchEntry {
    app: WatchedApp,
    processes: HashSet<ProcessHandle>,
}

/// Watched apps keyed by identifier, kept in registration order.
///
/// The launcher entry is registered first and never removed.
#[derive(Debug)]
pub struct WatchTable {
    entries: Vec<WatchEntry>,
}

impl WatchTable {
    pub fn new(launcher_identifier: &str) -> Self {
        Self {
            entries: vec![WatchEntry {
                app: WatchedApp {
                    id: LAUNCHER_ID.to_string(),
                    dir: launcher_identifier.to_string(),
                    is_game: false,
                },
                processes: HashSet::new(),
            }],
        }
    }

    pub fn get(&self, id: &str) -> Option<&WatchedApp> {
        self.entry(id).map(|e| &e.app)
    }

    fn entry(&self, id: &str) -> Option<&WatchEntry> {
        self.entries.iter().find(|e| e.app.id == id)
    }

    pub fn processes(&self, id: &str) -> Vec<ProcessHandle> {
        self.entry(id)
            .map(|e| e.processes.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn games(&self) -> impl Iterator<Item = &WatchedApp> {
        self.entries.iter().filter(|e| e.app.is_game).map(|e| &e.app)
    }

    /// Replaces every game entry with `games`. Entries whose id survives keep
    /// their matched processes and their position.
    pub fn set_games(&mut self, games: &InstalledGames) {
        self.entries
            .retain(|e| !e.app.is_game || games.contains_key(&e.app.id));
        for (id, dir) in games.iter() {
            match self.entries.iter_mut().find(|e| e.app.id == id) {
                Some(entry) => {
                    if entry.app.is_game {
                        entry.app.dir = dir.to_string();
                    }
                }
                None => self.entries.push(WatchEntry {
                    app: WatchedApp {
                        id: id.to_string(),
                        dir: dir.to_string(),
                        is_game: true,
                    },
                    processes: HashSet::new(),
                }),
            }
        }
    }

    /// Credits `process` to the first registered app whose directory is
    /// contained in `exe`. Returns the id of that app.
    pub fn credit(&mut self, process: ProcessHandle, exe: &str) -> Option<&str> {
        if exe.is_empty() {
            return None;
        }
        let entry = self
            .entries
            .iter_mut()
            .find(|e| !e.app.dir.is_empty() && exe.contains(e.app.dir.as_str()))?;
        entry.processes.insert(process);
        Some(entry.app.id.as_str())
    }

    fn has_unmatched_game(&self) -> bool {
        self.entries
            .iter()
            .any(|e| e.app.is_game && e.processes.is_empty())
    }

    fn has_matched_game(&self) -> bool {
        self.entries
            .iter()
            .any(|e| e.app.is_game && !e.processes.is_empty())
    }

    fn running_game_ids(&self) -> HashSet<String> {
        self.entries
            .iter()
            .filter(|e| e.app.is_game && !e.processes.is_empty())
            .map(|e| e.app.id.clone())
            .collect()
    }
}

/// A child process whose executable path has already been resolved.
#[derive(Debug, Clone)]
struct ResolvedProcess {
    handle: ProcessHandle,
    exe: PathBuf,
}

/// Tracks which watched apps are running by matching process executable
/// paths against installation directories.
///
/// Children scans memoize resolved exe paths per pid. Full scans never read
/// that cache so freshly spawned processes are always resolved anew. A cache
/// entry is dropped as soon as its process is observed not running.
pub struct ProcessWatcher<T> {
    table: T,
    watched: WatchTable,
    children_cache: HashMap<ProcessHandle, ResolvedProcess>,
}

impl<T: ProcessTable> ProcessWatcher<T> {
    pub fn new(table: T, launcher_identifier: &str) -> Self {
        Self {
            table,
            watched: WatchTable::new(launcher_identifier),
            children_cache: HashMap::new(),
        }
    }

    pub fn watched(&self) -> &WatchTable {
        &self.watched
    }

    pub fn set_watched_games(&mut self, games: &InstalledGames) {
        self.watched.set_games(games);
    }

    /// Matches every process in the OS table.
    pub fn full_scan(&mut self) -> bool {
        debug!("scanning all processes");
        let mut found = false;
        for process in self.table.snapshot() {
            found |= self.match_uncached(process);
        }
        found
    }

    /// Like [`full_scan`](Self::full_scan) but sleeps `interval` after each
    /// process to spread the cost.
    pub async fn full_scan_throttled(&mut self, interval: Duration) -> bool {
        debug!(interval_ms = interval.as_millis() as u64, "scanning all processes slowly");
        let mut found = false;
        for process in self.table.snapshot() {
            found |= self.match_uncached(process);
            tokio::time::sleep(interval).await;
        }
        found
    }

    /// Matches the children (all descendants when `recursive`) of `roots`.
    pub fn children_scan(&mut self, roots: &[ProcessHandle], recursive: bool) -> bool {
        let mut found = false;
        for root in roots {
            let children = match self.table.children(root, recursive) {
                Ok(children) => children,
                Err(e) => {
                    warn!(pid = root.pid(), error = %e, "listing children failed");
                    continue;
                }
            };
            for child in children {
                let cached = self
                    .children_cache
                    .get(&child)
                    .filter(|r| r.handle.started_at() == child.started_at())
                    .map(|r| r.exe.clone());
                let exe = match cached {
                    Some(exe) => exe,
                    None => match self.table.exe(&child) {
                        Ok(exe) => {
                            self.children_cache.insert(
                                child,
                                ResolvedProcess {
                                    handle: child,
                                    exe: exe.clone(),
                                },
                            );
                            exe
                        }
                        Err(e) => {
                            debug!(error = %e, "skipping child process");
                            continue;
                        }
                    },
                };
                found |= self.watched.credit(child, &exe.to_string_lossy()).is_some();
            }
        }
        found
    }

    fn match_uncached(&mut self, process: ProcessHandle) -> bool {
        match self.table.exe(&process) {
            Ok(exe) => self.watched.credit(process, &exe.to_string_lossy()).is_some(),
            Err(e) => {
                debug!(error = %e, "skipping process");
                false
            }
        }
    }

    /// True when `id` is watched and at least one matched process is alive.
    pub fn is_running(&mut self, id: &str) -> bool {
        let Some(entry) = self.watched.entry(id) else {
            return false;
        };
        let table = &mut self.table;
        entry.processes.iter().any(|p| table.is_running(p))
    }

    pub fn is_launcher_running(&mut self) -> bool {
        self.is_running(LAUNCHER_ID)
    }

    pub fn is_matched(&self, id: &str) -> bool {
        self.watched
            .entry(id)
            .is_some_and(|e| !e.processes.is_empty())
    }

    /// Ids of games with a live matched process. With `check_under_launcher`
    /// the launcher's descendants are scanned first.
    pub fn running_game_ids(&mut self, check_under_launcher: bool) -> HashSet<String> {
        if !self.watched.has_unmatched_game() && !self.watched.has_matched_game() {
            debug!("no games to watch; skipping process checks");
            return HashSet::new();
        }
        self.remove_dead_processes();
        if check_under_launcher && self.is_launcher_running() {
            let roots = self.watched.processes(LAUNCHER_ID);
            self.children_scan(&roots, true);
        }
        self.watched.running_game_ids()
    }

    fn remove_dead_processes(&mut self) {
        let table = &mut self.table;
        for entry in &mut self.watched.entries {
            entry.processes.retain(|p| {
                let alive = table.is_running(p);
                if !alive {
                    debug!(app = %entry.app.id, pid = p.pid(), "process is dead");
                }
                alive
            });
        }
        self.children_cache
            .retain(|_, resolved| table.is_running(&resolved.handle));
    }

    /// Polls until `app_id` is matched or `timeout` elapses, then tries one
    /// last full scan. Used right after a launch command is issued.
    pub async fn wait_for_start(
        &mut self,
        app_id: &str,
        timeout: Duration,
        short_interval: Duration,
        long_interval: Duration,
    ) -> bool {
        let mut search = StartSearch::new(
            app_id,
            tokio::time::Instant::now(),
            timeout,
            short_interval,
            long_interval,
        );
        loop {
            match search.step(self, tokio::time::Instant::now()) {
                SearchStep::Found => return true,
                SearchStep::Exhausted => return false,
                SearchStep::Pending(at) => tokio::time::sleep_until(at).await,
            }
        }
    }
}
