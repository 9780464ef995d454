use std::collections::{BTreeMap, HashSet};
use std::future::pending;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::error::ManifestError;
use crate::event::TrackerCommand;
use crate::launcher::Launcher;
use crate::local::LocalGames;
use crate::process::ProcessTable;
use crate::search::{SearchStep, StartSearch};
use crate::state::LocalGameState;

pub const DEFAULT_SEARCH_SHORT_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_SEARCH_LONG_INTERVAL: Duration = Duration::from_secs(2);

/// Polling intervals of `search_process`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchIntervals {
    /// Between launcher children scans once the launcher is seen.
    pub short: Duration,
    /// Between full scans while waiting for the launcher.
    pub long: Duration,
}

impl Default for SearchIntervals {
    fn default() -> Self {
        Self {
            short: DEFAULT_SEARCH_SHORT_INTERVAL,
            long: DEFAULT_SEARCH_LONG_INTERVAL,
        }
    }
}

enum Stage<T> {
    /// Before `setup`: the handle owns the state and answers directly.
    Idle(LocalGames<T>),
    /// The status checker task owns the state.
    Running {
        commands: mpsc::Sender<TrackerCommand>,
        task: JoinHandle<()>,
    },
    Stopped,
}

/// Handle to the local game tracker.
///
/// After [`setup`](Self::setup) all state lives in one task that
/// multiplexes scheduled ticks, pending process searches, and commands from
/// this handle, so scans never run concurrently.
pub struct Tracker<T> {
    launcher: Launcher,
    search: SearchIntervals,
    stage: Stage<T>,
}

impl<T: ProcessTable + Send + 'static> Tracker<T> {
    pub fn new(games: LocalGames<T>, launcher: Launcher, search: SearchIntervals) -> Self {
        Self {
            launcher,
            search,
            stage: Stage::Idle(games),
        }
    }

    pub fn is_launcher_installed(&self) -> bool {
        self.launcher.is_installed()
    }

    pub fn is_running(&self) -> bool {
        matches!(self.stage, Stage::Running { .. })
    }

    /// Records the baseline status and starts the status checker. Later
    /// calls do nothing.
    ///
    /// A failed setup leaves the tracker idle. The manifest's modification
    /// time is already recorded by then, so a retry only reparses it after
    /// the file changes again.
    pub fn setup(&mut self) -> Result<(), ManifestError> {
        match std::mem::replace(&mut self.stage, Stage::Stopped) {
            Stage::Idle(mut games) => {
                if let Err(e) = games.setup() {
                    self.stage = Stage::Idle(games);
                    return Err(e);
                }
                let (commands, rx) = mpsc::channel(32);
                let task = tokio::spawn(run(games, rx, self.search));
                self.stage = Stage::Running { commands, task };
                Ok(())
            }
            other => {
                debug!("tracker already set up");
                self.stage = other;
                Ok(())
            }
        }
    }

    pub async fn games(&mut self) -> BTreeMap<String, LocalGameState> {
        if let Stage::Idle(games) = &self.stage {
            return games.games().clone();
        }
        self.request(TrackerCommand::Games).await.unwrap_or_default()
    }

    pub async fn consume_updated_games(&mut self) -> HashSet<String> {
        if let Stage::Idle(games) = &mut self.stage {
            return games.consume_updated_games();
        }
        self.request(TrackerCommand::ConsumeUpdated)
            .await
            .unwrap_or_default()
    }

    pub async fn is_game_running(&mut self, app_id: &str) -> bool {
        if let Stage::Idle(games) = &mut self.stage {
            return games.is_game_running(app_id);
        }
        let app_id = app_id.to_string();
        self.request(|reply| TrackerCommand::IsRunning { app_id, reply })
            .await
            .unwrap_or(false)
    }

    /// Waits up to `timeout` for `app_id` to start. Call right after the
    /// launch command is issued.
    pub async fn search_process(&mut self, app_id: &str, timeout: Duration) -> bool {
        let intervals = self.search;
        if let Stage::Idle(games) = &mut self.stage {
            return games
                .watcher_mut()
                .wait_for_start(app_id, timeout, intervals.short, intervals.long)
                .await;
        }
        let app_id = app_id.to_string();
        self.request(|reply| TrackerCommand::SearchProcess {
            app_id,
            timeout,
            reply,
        })
        .await
        .unwrap_or(false)
    }

    /// Cancels the status checker. Safe to call before `setup`.
    pub async fn shutdown(&mut self) {
        if let Stage::Running { task, .. } = std::mem::replace(&mut self.stage, Stage::Stopped) {
            info!("stopping status checker");
            task.abort();
            let _ = task.await;
        }
    }

    async fn request<R>(&self, make: impl FnOnce(oneshot::Sender<R>) -> TrackerCommand) -> Option<R> {
        let Stage::Running { commands, .. } = &self.stage else {
            return None;
        };
        let (reply, rx) = oneshot::channel();
        commands.send(make(reply)).await.ok()?;
        rx.await.ok()
    }
}

struct PendingSearch {
    search: StartSearch,
    next_poll: Instant,
    reply: oneshot::Sender<bool>,
}

async fn run<T: ProcessTable>(
    mut games: LocalGames<T>,
    mut commands: mpsc::Receiver<TrackerCommand>,
    intervals: SearchIntervals,
) {
    info!("starting status checker");
    let mut ticker = interval(games.schedule().tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut tick: u64 = 0;
    let mut searches: Vec<PendingSearch> = Vec::new();

    loop {
        let next_search = searches.iter().map(|s| s.next_poll).min();
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = games.tick(tick).await {
                    error!(tick, error = %e, "status check failed");
                }
                tick = tick.wrapping_add(1);
            }
            _ = wait_until(next_search) => {
                poll_searches(&mut games, &mut searches);
            }
            command = commands.recv() => match command {
                Some(command) => handle(&mut games, &mut searches, command, intervals),
                None => break,
            },
        }
    }
    debug!("status checker finished");
}

async fn wait_until(at: Option<Instant>) {
    match at {
        Some(at) => sleep_until(at).await,
        None => pending().await,
    }
}

fn handle<T: ProcessTable>(
    games: &mut LocalGames<T>,
    searches: &mut Vec<PendingSearch>,
    command: TrackerCommand,
    intervals: SearchIntervals,
) {
    match command {
        TrackerCommand::Games(reply) => {
            let _ = reply.send(games.games().clone());
        }
        TrackerCommand::ConsumeUpdated(reply) => {
            let _ = reply.send(games.consume_updated_games());
        }
        TrackerCommand::IsRunning { app_id, reply } => {
            let _ = reply.send(games.is_game_running(&app_id));
        }
        TrackerCommand::SearchProcess {
            app_id,
            timeout,
            reply,
        } => {
            debug!(app = %app_id, "waiting for game process");
            let now = Instant::now();
            let pending = PendingSearch {
                search: StartSearch::new(app_id, now, timeout, intervals.short, intervals.long),
                next_poll: now,
                reply,
            };
            if let Some(pending) = advance(games, pending, now) {
                searches.push(pending);
            }
        }
    }
}

fn poll_searches<T: ProcessTable>(games: &mut LocalGames<T>, searches: &mut Vec<PendingSearch>) {
    let now = Instant::now();
    let mut still_pending = Vec::with_capacity(searches.len());
    for pending in searches.drain(..) {
        if pending.next_poll > now {
            still_pending.push(pending);
        } else if let Some(pending) = advance(games, pending, now) {
            still_pending.push(pending);
        }
    }
    *searches = still_pending;
}

/// Runs one search step; returns the search back while it is still pending.
fn advance<T: ProcessTable>(
    games: &mut LocalGames<T>,
    mut pending: PendingSearch,
    now: Instant,
) -> Option<PendingSearch> {
    if pending.reply.is_closed() {
        debug!(app = %pending.search.app_id(), "search abandoned");
        return None;
    }
    match pending.search.step(games.watcher_mut(), now) {
        SearchStep::Found => {
            let _ = pending.reply.send(true);
            None
        }
        SearchStep::Exhausted => {
            let _ = pending.reply.send(false);
            None
        }
        SearchStep::Pending(at) => {
            pending.next_poll = at;
            Some(pending)
        }
    }
}
