use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info};

use crate::error::ManifestError;
use crate::launcher::Launcher;
use crate::manifest::ManifestReader;
use crate::process::ProcessTable;
use crate::schedule::Schedule;
use crate::state::{Facet, LocalGameState};
use crate::watcher::ProcessWatcher;

/// Authoritative installed/running status of every known game.
///
/// Status bits flip only on transitions between consecutive observations,
/// and each flip marks the id as updated until the next
/// [`consume_updated_games`](Self::consume_updated_games). The baseline
/// pass in [`setup`](Self::setup) marks nothing.
pub struct LocalGames<T> {
    manifest: ManifestReader,
    watcher: ProcessWatcher<T>,
    launcher: Launcher,
    schedule: Schedule,
    games: BTreeMap<String, LocalGameState>,
    was_installed: HashSet<String>,
    was_running: HashSet<String>,
    updated: HashSet<String>,
    first_run: bool,
}

impl<T: ProcessTable> LocalGames<T> {
    pub fn new(manifest: ManifestReader, table: T, launcher: Launcher, schedule: Schedule) -> Self {
        let watcher = ProcessWatcher::new(table, &launcher.process_identifier);
        Self {
            manifest,
            watcher,
            launcher,
            schedule,
            games: BTreeMap::new(),
            was_installed: HashSet::new(),
            was_running: HashSet::new(),
            updated: HashSet::new(),
            first_run: true,
        }
    }

    pub fn is_launcher_installed(&self) -> bool {
        self.launcher.is_installed()
    }

    pub fn first_run(&self) -> bool {
        self.first_run
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn games(&self) -> &BTreeMap<String, LocalGameState> {
        &self.games
    }

    /// Status of `id`; `NONE` for ids never seen.
    pub fn state(&self, id: &str) -> LocalGameState {
        self.games.get(id).copied().unwrap_or_default()
    }

    pub fn watcher_mut(&mut self) -> &mut ProcessWatcher<T> {
        &mut self.watcher
    }

    /// Records the baseline without marking anything updated. A decode error
    /// still consumes the manifest change.
    pub fn setup(&mut self) -> Result<(), ManifestError> {
        info!("running local games setup");
        self.check_for_installed()?;
        self.check_for_running(false);
        self.first_run = false;
        Ok(())
    }

    /// Reparses the manifest when it changed and refreshes the watched games.
    pub fn check_for_installed(&mut self) -> Result<(), ManifestError> {
        if !self.manifest.has_changed()? {
            return Ok(());
        }
        debug!(path = %self.manifest.path().display(), "manifest changed; parsing");
        let installed = self.manifest.parse()?;
        let current: HashSet<String> = installed.keys().map(str::to_string).collect();
        let previous = std::mem::take(&mut self.was_installed);
        self.update_statuses(&previous, &current, Facet::Installed);
        self.watcher.set_watched_games(&installed);
        self.was_installed = current;
        Ok(())
    }

    pub fn check_for_running(&mut self, check_under_launcher: bool) {
        let current = self.watcher.running_game_ids(check_under_launcher);
        let previous = std::mem::take(&mut self.was_running);
        self.update_statuses(&previous, &current, Facet::Running);
        self.was_running = current;
    }

    /// Slow full scan, only while games are installed and none is running.
    pub async fn catch_up_if_needed(&mut self) {
        if !self.was_installed.is_empty() && self.was_running.is_empty() {
            self.watcher
                .full_scan_throttled(self.schedule.throttled_scan_interval)
                .await;
        }
    }

    /// One pass of the recurring status check. Skipped entirely while the
    /// launcher is not installed.
    pub async fn tick(&mut self, tick: u64) -> Result<(), ManifestError> {
        if !self.launcher.is_installed() {
            return Ok(());
        }
        self.check_for_installed()?;
        let plan = self.schedule.plan(tick);
        if plan.catch_up {
            self.catch_up_if_needed().await;
        } else if plan.children_scan {
            self.check_for_running(true);
        }
        self.check_for_running(false);
        Ok(())
    }

    pub fn is_game_running(&mut self, id: &str) -> bool {
        self.watcher.is_running(id)
    }

    /// Ids whose status changed since the previous call.
    pub fn consume_updated_games(&mut self) -> HashSet<String> {
        std::mem::take(&mut self.updated)
    }

    fn update_statuses(&mut self, previous: &HashSet<String>, current: &HashSet<String>, facet: Facet) {
        for id in current.difference(previous) {
            self.games.entry(id.clone()).or_default().insert(facet.bit());
            if !self.first_run {
                self.updated.insert(id.clone());
            }
        }
        for id in previous.difference(current) {
            self.games.entry(id.clone()).or_default().remove(facet.bit());
            if !self.first_run {
                self.updated.insert(id.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launcher::InstallMarker;
    use crate::process::fake::FakeProcessTable;
    use std::fs::{File, FileTimes};
    use std::path::{Path, PathBuf};
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    const LAUNCHER_EXE: &str = "/opt/epic/EpicGamesLauncher.exe";

    struct Fixture {
        _dir: TempDir,
        manifest_path: PathBuf,
        table: FakeProcessTable,
        games: LocalGames<FakeProcessTable>,
        mtime: u64,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let manifest_path = dir.path().join("LauncherInstalled.dat");
            let marker = dir.path().join("Launcher.app");
            std::fs::create_dir(&marker).unwrap();

            let table = FakeProcessTable::new();
            let launcher = Launcher {
                process_identifier: "EpicGamesLauncher.exe".to_string(),
                install_marker: Some(InstallMarker::Path(marker)),
            };
            let schedule = Schedule {
                throttled_scan_interval: Duration::ZERO,
                ..Schedule::default()
            };
            let games = LocalGames::new(
                ManifestReader::new(&manifest_path),
                table.clone(),
                launcher,
                schedule,
            );
            Self {
                _dir: dir,
                manifest_path,
                table,
                games,
                mtime: 1_000,
            }
        }

        fn write_manifest(&mut self, entries: &[(&str, &str)]) {
            let list: Vec<_> = entries
                .iter()
                .map(|(id, dir)| serde_json::json!({"AppName": id, "InstallLocation": dir}))
                .collect();
            let body = serde_json::json!({ "InstallationList": list }).to_string();
            std::fs::write(&self.manifest_path, body).unwrap();
            self.mtime += 10;
            set_mtime(&self.manifest_path, self.mtime);
        }

        fn uninstall_launcher(&self) {
            if let Some(InstallMarker::Path(path)) = &self.games.launcher.install_marker {
                std::fs::remove_dir(path).unwrap();
            }
        }
    }

    fn set_mtime(path: &Path, secs: u64) {
        let time = SystemTime::UNIX_EPOCH + Duration::from_secs(secs);
        let file = File::options().write(true).open(path).unwrap();
        file.set_times(FileTimes::new().set_modified(time)).unwrap();
    }

    fn ids(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    // ── setup ─────────────────────────────────────────────────────────────────

    #[test]
    fn setup_populates_baseline_without_updates() {
        let mut fx = Fixture::new();
        fx.write_manifest(&[("AppA", "/games/a"), ("AppB", "/games/b")]);
        fx.table.spawn(1, "/games/a/run", None);
        // full scans happen on ticks; make AppA matched before setup
        fx.games.watcher_mut().set_watched_games(
            &[("AppA".to_string(), "/games/a".to_string())].into_iter().collect(),
        );
        fx.games.watcher_mut().full_scan();

        fx.games.setup().unwrap();

        assert!(!fx.games.first_run());
        assert_eq!(
            fx.games.state("AppA"),
            LocalGameState::INSTALLED | LocalGameState::RUNNING
        );
        assert_eq!(fx.games.state("AppB"), LocalGameState::INSTALLED);
        assert!(fx.games.consume_updated_games().is_empty());
    }

    #[test]
    fn setup_propagates_decode_errors() {
        let mut fx = Fixture::new();
        std::fs::write(&fx.manifest_path, "][").unwrap();
        let err = fx.games.setup().unwrap_err();
        assert!(matches!(err, ManifestError::Decode { .. }));
    }

    #[test]
    fn setup_without_manifest_is_empty() {
        let mut fx = Fixture::new();
        fx.games.setup().unwrap();
        assert!(fx.games.games().is_empty());
    }

    // ── installed facet ───────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn installed_set_follows_latest_manifest() {
        let mut fx = Fixture::new();
        fx.write_manifest(&[("AppA", "/games/a")]);
        fx.games.setup().unwrap();

        fx.write_manifest(&[("AppB", "/games/b"), ("UE_5.2", "/engine"), ("", "/x")]);
        fx.games.tick(1).await.unwrap();

        assert_eq!(fx.games.state("AppA"), LocalGameState::NONE);
        assert_eq!(fx.games.state("AppB"), LocalGameState::INSTALLED);
        assert!(!fx.games.games().contains_key("UE_5.2"));
        assert_eq!(fx.games.consume_updated_games(), ids(&["AppA", "AppB"]));

        let watched: Vec<_> = fx.games.watcher.watched().games().map(|g| g.id.clone()).collect();
        assert_eq!(watched, ["AppB"]);
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_manifest_is_not_reparsed() {
        let mut fx = Fixture::new();
        fx.write_manifest(&[("AppA", "/games/a")]);
        fx.games.setup().unwrap();

        // Corrupt the content but keep the modification time.
        std::fs::write(&fx.manifest_path, "garbage").unwrap();
        set_mtime(&fx.manifest_path, fx.mtime);

        fx.games.tick(1).await.unwrap();
        assert_eq!(fx.games.state("AppA"), LocalGameState::INSTALLED);
    }

    // ── running facet ─────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn game_start_and_exit_are_reported_once_each() {
        let mut fx = Fixture::new();
        fx.write_manifest(&[("AppA", "/games/a")]);
        fx.games.setup().unwrap();

        fx.table.spawn(42, "/games/a/run", None);
        // tick 0 runs the catch-up full scan
        fx.games.tick(0).await.unwrap();
        assert!(fx.games.is_game_running("AppA"));
        assert_eq!(fx.games.consume_updated_games(), ids(&["AppA"]));

        fx.games.tick(1).await.unwrap();
        assert!(fx.games.consume_updated_games().is_empty());

        fx.table.kill(42);
        fx.games.tick(2).await.unwrap();
        assert!(!fx.games.is_game_running("AppA"));
        assert_eq!(fx.games.state("AppA"), LocalGameState::INSTALLED);
        assert_eq!(fx.games.consume_updated_games(), ids(&["AppA"]));
    }

    #[test]
    fn repeated_running_checks_add_no_updates() {
        let mut fx = Fixture::new();
        fx.write_manifest(&[("AppA", "/games/a")]);
        fx.table.spawn(42, "/games/a/run", None);
        fx.games.setup().unwrap();
        fx.games.watcher_mut().full_scan();

        fx.games.check_for_running(false);
        assert_eq!(fx.games.consume_updated_games(), ids(&["AppA"]));
        fx.games.check_for_running(false);
        assert!(fx.games.consume_updated_games().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn children_scan_cadence_finds_games_under_launcher() {
        let mut fx = Fixture::new();
        fx.write_manifest(&[("AppA", "/games/a"), ("AppB", "/games/b")]);
        fx.table.spawn(100, LAUNCHER_EXE, None);
        fx.table.spawn(1, "/games/a/run", None);
        fx.games.setup().unwrap();

        // Catch-up at tick 0 matches the launcher and AppA.
        fx.games.tick(0).await.unwrap();
        assert_eq!(fx.games.consume_updated_games(), ids(&["AppA"]));

        // AppA keeps the catch-up from running again; AppB appears under the launcher.
        fx.table.spawn(2, "/games/b/run", Some(100));
        for tick in 1..7 {
            fx.games.tick(tick).await.unwrap();
        }
        assert!(!fx.games.state("AppB").is_running());

        fx.games.tick(7).await.unwrap();
        assert!(fx.games.state("AppB").is_running());
        assert_eq!(fx.games.consume_updated_games(), ids(&["AppB"]));
    }

    #[tokio::test(start_paused = true)]
    async fn catch_up_skipped_while_something_runs() {
        let mut fx = Fixture::new();
        fx.write_manifest(&[("AppA", "/games/a"), ("AppB", "/games/b")]);
        fx.table.spawn(1, "/games/a/run", None);
        fx.games.setup().unwrap();
        fx.games.tick(0).await.unwrap();
        let snapshots = fx.table.snapshots();

        fx.games.tick(21).await.unwrap();
        assert_eq!(fx.table.snapshots(), snapshots);
    }

    #[tokio::test(start_paused = true)]
    async fn interrupted_catch_up_can_run_again() {
        let mut fx = Fixture::new();
        fx.games.schedule.throttled_scan_interval = Duration::from_millis(100);
        fx.write_manifest(&[("AppA", "/games/a"), ("AppB", "/games/b")]);
        fx.table.spawn(1, "/games/a/run", None);
        fx.table.spawn(2, "/usr/bin/bash", None);
        fx.table.spawn(3, "/games/b/run", None);
        fx.games.setup().unwrap();

        let cut =
            tokio::time::timeout(Duration::from_millis(150), fx.games.catch_up_if_needed()).await;
        assert!(cut.is_err());
        assert_eq!(fx.games.watcher.watched().processes("AppA").len(), 1);
        assert!(fx.games.watcher.watched().processes("AppB").is_empty());

        fx.games.catch_up_if_needed().await;
        fx.games.check_for_running(false);
        assert_eq!(fx.games.watcher.watched().processes("AppA").len(), 1);
        assert_eq!(fx.games.consume_updated_games(), ids(&["AppA", "AppB"]));
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_directories_credit_earlier_manifest_entry() {
        let mut fx = Fixture::new();
        fx.write_manifest(&[("Zed", "/games"), ("Abe", "/games/abe")]);
        fx.table.spawn(1, "/games/abe/run", None);
        fx.games.setup().unwrap();

        fx.games.tick(0).await.unwrap();
        assert!(fx.games.is_game_running("Zed"));
        assert!(!fx.games.is_game_running("Abe"));
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_are_skipped_without_launcher() {
        let mut fx = Fixture::new();
        fx.games.setup().unwrap();
        fx.uninstall_launcher();

        fx.write_manifest(&[("AppA", "/games/a")]);
        for tick in 0..30 {
            fx.games.tick(tick).await.unwrap();
        }
        assert!(fx.games.games().is_empty());
        assert_eq!(fx.table.snapshots(), 0);
    }

    #[test]
    fn unseen_game_defaults_to_none() {
        let fx = Fixture::new();
        assert_eq!(fx.games.state("Unknown"), LocalGameState::NONE);
    }
}
