use anyhow::{Context, Result};
use clap::Parser;
use tokio::time::interval;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use launcher_presence::config::{self, Config};
use launcher_presence::status::{self, DaemonStatus};
use launcher_presence::{paths, LocalGames, ManifestReader, SysinfoTable, Tracker};

#[derive(Parser, Debug)]
#[command(name = "launcher-presence")]
#[command(about = "Tracks installed and running launcher games")]
#[command(version)]
struct Cli {
    /// Wait for this game to start right after startup, as a launcher
    /// integration does after issuing a launch command
    #[arg(long, value_name = "APP_ID")]
    wait_for: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    // ── Configuration ─────────────────────────────────────────────────────────
    let config_path = paths::config_file_path();
    let config = config::load_or_default(&config_path).unwrap_or_else(|e| {
        warn!(error = %e, "config error; using defaults");
        Config::default()
    });

    // ── Tracker ───────────────────────────────────────────────────────────────
    let launcher = config.launcher.launcher();
    let manifest = ManifestReader::new(config.launcher.manifest_path());
    info!(manifest = %manifest.path().display(), "watching launcher manifest");
    let games = LocalGames::new(
        manifest,
        SysinfoTable::new(),
        launcher.clone(),
        config.tracker.schedule(),
    );
    let mut tracker = Tracker::new(games, launcher, config.search.intervals());
    if !tracker.is_launcher_installed() {
        warn!("launcher is not installed; status checks are paused until it is");
    }
    tracker
        .setup()
        .context("Failed to establish local game status")?;

    // ── Initial status ────────────────────────────────────────────────────────
    let status_path = paths::status_file_path();
    let mut current_status = DaemonStatus::new(tracker.is_launcher_installed());
    current_status.update(&tracker.games().await);
    status::write_status(&status_path, &current_status);

    info!("launcher-presence v{} started", env!("CARGO_PKG_VERSION"));

    if let Some(app_id) = cli.wait_for {
        let started = tracker.search_process(&app_id, config.search.timeout()).await;
        info!(app = %app_id, started, "finished waiting for game process");
    }

    // ── Drain loop ────────────────────────────────────────────────────────────
    let mut drain = interval(config.tracker.drain_interval());
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = drain.tick() => {
                let updated = tracker.consume_updated_games().await;
                let launcher_installed = tracker.is_launcher_installed();
                if updated.is_empty() && launcher_installed == current_status.launcher_installed {
                    continue;
                }

                let games = tracker.games().await;
                let mut updated: Vec<_> = updated.into_iter().collect();
                updated.sort();
                for id in &updated {
                    let state = games.get(id).copied().unwrap_or_default();
                    info!(app = %id, %state, "game status changed");
                }
                current_status.launcher_installed = launcher_installed;
                current_status.update(&games);
                status::write_status(&status_path, &current_status);
            }
        }
    }

    info!("shutting down");
    tracker.shutdown().await;
    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
