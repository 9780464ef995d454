//! Canonical file paths.
//!
//! The launcher manifest lives where the launcher writes it:
//!   - Windows  %PROGRAMDATA%\Epic\UnrealEngineLauncher\LauncherInstalled.dat
//!   - macOS    ~/Library/Application Support/Epic/UnrealEngineLauncher/LauncherInstalled.dat
//!
//! The daemon's own files live under the per-user data directory:
//!   - config.toml  Written by the user, read by the daemon.
//!   - status.toml  Written by the daemon, read by other local tools.

use std::path::PathBuf;

const APP_DIR_NAME: &str = "LauncherPresence";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const STATUS_FILE_NAME: &str = "status.toml";
pub const MANIFEST_FILE_NAME: &str = "LauncherInstalled.dat";

#[cfg(windows)]
fn launcher_data_root() -> PathBuf {
    std::env::var_os("PROGRAMDATA")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(r"C:\ProgramData"))
}

#[cfg(not(windows))]
fn launcher_data_root() -> PathBuf {
    dirs::data_dir().unwrap_or_else(|| PathBuf::from("."))
}

/// Returns the default launcher manifest path for this platform.
pub fn manifest_path() -> PathBuf {
    launcher_data_root()
        .join("Epic")
        .join("UnrealEngineLauncher")
        .join(MANIFEST_FILE_NAME)
}

/// Returns the daemon data directory, e.g. %APPDATA%\LauncherPresence\
pub fn app_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

/// Returns the full path to the config file.
pub fn config_file_path() -> PathBuf {
    app_data_dir().join(CONFIG_FILE_NAME)
}

/// Returns the full path to the status file.
pub fn status_file_path() -> PathBuf {
    app_data_dir().join(STATUS_FILE_NAME)
}
