use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::process::ProcessTable;
use crate::watcher::{ProcessWatcher, LAUNCHER_ID};

/// Outcome of one [`StartSearch::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStep {
    /// The target app has a live matched process.
    Found,
    /// The deadline passed and the fallback full scan found nothing.
    Exhausted,
    /// Call `step` again at this instant.
    Pending(Instant),
}

/// Bounded search for a freshly launched app.
///
/// While the launcher is not yet seen, every step runs a full scan and the
/// next step is `long_interval` away. Once the launcher is seen, steps scan
/// its descendants every `short_interval`. The first step at or past the
/// deadline runs one last full scan and ends the search.
#[derive(Debug, Clone)]
pub struct StartSearch {
    app_id: String,
    started: Instant,
    deadline: Instant,
    short_interval: Duration,
    long_interval: Duration,
}

impl StartSearch {
    pub fn new(
        app_id: impl Into<String>,
        now: Instant,
        timeout: Duration,
        short_interval: Duration,
        long_interval: Duration,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            started: now,
            deadline: now + timeout,
            short_interval,
            long_interval,
        }
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn step<T: ProcessTable>(&mut self, watcher: &mut ProcessWatcher<T>, now: Instant) -> SearchStep {
        if now >= self.deadline {
            watcher.full_scan();
            if watcher.is_running(&self.app_id) {
                debug!(app = %self.app_id, "game process found by fallback scan");
                return SearchStep::Found;
            }
            debug!(app = %self.app_id, "game process not found before timeout");
            return SearchStep::Exhausted;
        }

        if !watcher.is_launcher_running() {
            watcher.full_scan();
            if watcher.is_running(&self.app_id) {
                return self.found(now);
            }
            if !watcher.is_launcher_running() {
                return SearchStep::Pending(self.clamp(now + self.long_interval));
            }
        }

        let roots = watcher.watched().processes(LAUNCHER_ID);
        watcher.children_scan(&roots, true);
        if watcher.is_running(&self.app_id) {
            return self.found(now);
        }
        SearchStep::Pending(self.clamp(now + self.short_interval))
    }

    fn found(&self, now: Instant) -> SearchStep {
        debug!(
            app = %self.app_id,
            elapsed_ms = now.duration_since(self.started).as_millis() as u64,
            "game process found"
        );
        SearchStep::Found
    }

    fn clamp(&self, at: Instant) -> Instant {
        at.min(self.deadline)
    }
}
