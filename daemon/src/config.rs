use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::launcher::{InstallMarker, Launcher};
use crate::paths;
use crate::schedule::{
    Schedule, DEFAULT_CHILDREN_SCAN_EVERY, DEFAULT_FULL_SCAN_EVERY,
};
use crate::tracker::SearchIntervals;

pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_THROTTLED_SCAN_INTERVAL_MS: u64 = 15;
pub const DEFAULT_DRAIN_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_SEARCH_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_SEARCH_SHORT_INTERVAL_MS: u64 = 500;
pub const DEFAULT_SEARCH_LONG_INTERVAL_MS: u64 = 2000;

/// Root configuration structure. Deserialized from the daemon's config.toml.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub launcher: LauncherConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

/// Cadence of the recurring status check.
#[derive(Debug, Deserialize)]
pub struct TrackerConfig {
    /// Length of one tick in milliseconds.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Ticks between catch-up full scans.
    #[serde(default = "default_full_scan_every")]
    pub full_scan_every: u64,
    /// Ticks between launcher children scans.
    #[serde(default = "default_children_scan_every")]
    pub children_scan_every: u64,
    /// Pause between processes during a catch-up full scan.
    #[serde(default = "default_throttled_scan_interval_ms")]
    pub throttled_scan_interval_ms: u64,
    /// How often the daemon drains status changes and rewrites the status file.
    #[serde(default = "default_drain_interval_secs")]
    pub drain_interval_secs: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            full_scan_every: DEFAULT_FULL_SCAN_EVERY,
            children_scan_every: DEFAULT_CHILDREN_SCAN_EVERY,
            throttled_scan_interval_ms: DEFAULT_THROTTLED_SCAN_INTERVAL_MS,
            drain_interval_secs: DEFAULT_DRAIN_INTERVAL_SECS,
        }
    }
}

/// Overrides of the platform launcher defaults.
#[derive(Debug, Default, Deserialize)]
pub struct LauncherConfig {
    /// Substring of the launcher executable path.
    pub process_identifier: Option<String>,
    /// Location of LauncherInstalled.dat.
    pub manifest_path: Option<PathBuf>,
    /// A path whose existence means the launcher is installed.
    pub install_marker_path: Option<PathBuf>,
}

/// Defaults for waiting on a just-launched game.
#[derive(Debug, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_search_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_search_short_interval_ms")]
    pub short_interval_ms: u64,
    #[serde(default = "default_search_long_interval_ms")]
    pub long_interval_ms: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_SEARCH_TIMEOUT_SECS,
            short_interval_ms: DEFAULT_SEARCH_SHORT_INTERVAL_MS,
            long_interval_ms: DEFAULT_SEARCH_LONG_INTERVAL_MS,
        }
    }
}

impl TrackerConfig {
    /// Cadences are clamped to at least one tick, intervals to at least 1 ms.
    pub fn schedule(&self) -> Schedule {
        Schedule {
            tick_interval: Duration::from_millis(self.tick_interval_ms.max(1)),
            full_scan_every: self.full_scan_every.max(1),
            children_scan_every: self.children_scan_every.max(1),
            throttled_scan_interval: Duration::from_millis(
                self.throttled_scan_interval_ms.max(1),
            ),
        }
    }

    pub fn drain_interval(&self) -> Duration {
        Duration::from_secs(self.drain_interval_secs.max(1))
    }
}

impl LauncherConfig {
    /// The platform launcher with any configured overrides applied.
    pub fn launcher(&self) -> Launcher {
        let mut launcher = Launcher::platform_default();
        if let Some(identifier) = &self.process_identifier {
            launcher.process_identifier = identifier.clone();
        }
        if let Some(marker) = &self.install_marker_path {
            launcher.install_marker = Some(InstallMarker::Path(marker.clone()));
        }
        launcher
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.manifest_path.clone().unwrap_or_else(paths::manifest_path)
    }
}

impl SearchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn intervals(&self) -> SearchIntervals {
        SearchIntervals {
            short: Duration::from_millis(self.short_interval_ms.max(1)),
            long: Duration::from_millis(self.long_interval_ms.max(1)),
        }
    }
}

/// Loads the config file at `path`, returning `Config::default()` if the file does not exist.
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

fn default_tick_interval_ms() -> u64 {
    DEFAULT_TICK_INTERVAL_MS
}

fn default_full_scan_every() -> u64 {
    DEFAULT_FULL_SCAN_EVERY
}

fn default_children_scan_every() -> u64 {
    DEFAULT_CHILDREN_SCAN_EVERY
}

fn default_throttled_scan_interval_ms() -> u64 {
    DEFAULT_THROTTLED_SCAN_INTERVAL_MS
}

fn default_drain_interval_secs() -> u64 {
    DEFAULT_DRAIN_INTERVAL_SECS
}

fn default_search_timeout_secs() -> u64 {
    DEFAULT_SEARCH_TIMEOUT_SECS
}

fn default_search_short_interval_ms() -> u64 {
    DEFAULT_SEARCH_SHORT_INTERVAL_MS
}

fn default_search_long_interval_ms() -> u64 {
    DEFAULT_SEARCH_LONG_INTERVAL_MS
}
