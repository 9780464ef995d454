use std::collections::{BTreeMap, HashSet};
use std::time::Duration;
use tokio::sync::oneshot;

use crate::state::LocalGameState;

/// Requests handled by the tracker task, each answered on its own
/// `oneshot` channel.
pub enum TrackerCommand {
    /// Snapshot of every known game's status.
    Games(oneshot::Sender<BTreeMap<String, LocalGameState>>),
    /// Read and clear the ids updated since the previous drain.
    ConsumeUpdated(oneshot::Sender<HashSet<String>>),
    /// Whether the game has a live matched process.
    IsRunning {
        app_id: String,
        reply: oneshot::Sender<bool>,
    },
    /// Wait for a just-launched game to show up in the process table.
    SearchProcess {
        app_id: String,
        timeout: Duration,
        reply: oneshot::Sender<bool>,
    },
}
