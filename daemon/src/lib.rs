//! Local presence tracking for launcher-managed games.
//!
//! Installed games come from the launcher's manifest file; running games
//! are found by matching OS process executable paths against their install
//! directories. [`Tracker`] reconciles both into a per-game
//! [`LocalGameState`] and buffers the ids whose state changed.

pub mod config;
pub mod error;
pub mod event;
pub mod launcher;
pub mod local;
pub mod manifest;
pub mod paths;
pub mod process;
pub mod schedule;
pub mod search;
pub mod state;
pub mod status;
pub mod tracker;
pub mod watcher;

pub use error::{ManifestError, ProbeError};
pub use launcher::Launcher;
pub use local::LocalGames;
pub use manifest::ManifestReader;
pub use process::{ProcessHandle, ProcessTable, SysinfoTable};
pub use schedule::Schedule;
pub use state::{Facet, LocalGameState};
pub use tracker::{SearchIntervals, Tracker};
pub use watcher::{ProcessWatcher, WatchedApp};
