use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::error;

use crate::state::LocalGameState;

/// Status of one game as written to the status file.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Copy)]
pub struct GameStatus {
    pub installed: bool,
    pub running: bool,
}

impl From<LocalGameState> for GameStatus {
    fn from(state: LocalGameState) -> Self {
        Self {
            installed: state.is_installed(),
            running: state.is_running(),
        }
    }
}

/// Runtime status written by the daemon to status.toml.
/// Other local tools read this file (read-only) to learn which games are
/// installed and running.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DaemonStatus {
    /// Daemon binary version (set from Cargo.toml at compile time).
    pub version: String,
    pub launcher_installed: bool,
    /// RFC 3339 timestamp of the last update, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub games: BTreeMap<String, GameStatus>,
}

impl DaemonStatus {
    /// Constructs the initial status on daemon startup.
    pub fn new(launcher_installed: bool) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            launcher_installed,
            updated_at: None,
            games: BTreeMap::new(),
        }
    }

    /// Replaces the game table and stamps the update time.
    pub fn update(&mut self, games: &BTreeMap<String, LocalGameState>) {
        self.games = games
            .iter()
            .map(|(id, state)| (id.clone(), GameStatus::from(*state)))
            .collect();
        self.updated_at = Some(chrono::Local::now().to_rfc3339());
    }
}

/// Serializes `status` to TOML and writes it to `path`.
/// Creates the parent directory if it does not exist.
/// Logs errors rather than panicking; a status write failure should
/// never crash the daemon.
pub fn write_status(path: &Path, status: &DaemonStatus) {
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            error!(dir = %parent.display(), error = %e, "failed to create status directory");
            return;
        }
    }
    match toml::to_string_pretty(status) {
        Ok(content) => {
            if let Err(e) = std::fs::write(path, content) {
                error!(error = %e, "failed to write status file");
            }
        }
        Err(e) => error!(error = %e, "failed to serialize status"),
    }
}
