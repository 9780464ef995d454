use serde::Deserialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};

use crate::error::ManifestError;

/// Identifier prefix of engine tooling installs (editor, plugins). These are
/// not user-visible games.
pub const ENGINE_TOOLING_PREFIX: &str = "UE";

/// Installed application id → installation directory, in manifest order.
/// A repeated id keeps its first position and takes the last directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstalledGames {
    entries: Vec<(String, String)>,
}

impl InstalledGames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, dir: impl Into<String>) {
        let id = id.into();
        let dir = dir.into();
        match self.entries.iter_mut().find(|(known, _)| *known == id) {
            Some((_, existing)) => *existing = dir,
            None => self.entries.push((id, dir)),
        }
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(known, _)| known == id)
            .map(|(_, dir)| dir.as_str())
    }

    pub fn contains_key(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(id, _)| id.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(id, dir)| (id.as_str(), dir.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for InstalledGames {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut games = Self::new();
        for (id, dir) in iter {
            games.insert(id, dir);
        }
        games
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Manifest {
    #[serde(default)]
    installation_list: Vec<ManifestEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ManifestEntry {
    #[serde(default)]
    app_name: Option<String>,
    #[serde(default)]
    install_location: Option<String>,
}

/// Polls the launcher-maintained manifest for modification and decodes it.
#[derive(Debug)]
pub struct ManifestReader {
    path: PathBuf,
    last_modified: Option<SystemTime>,
}

impl ManifestReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_modified: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true when the manifest's modification time differs from the
    /// last observed one, remembering the new value. A missing file reports
    /// no change.
    pub fn has_changed(&mut self) -> Result<bool, ManifestError> {
        let modified = match std::fs::metadata(&self.path).and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "manifest not found");
                return Ok(false);
            }
            Err(source) => {
                return Err(ManifestError::Stat {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        if self.last_modified == Some(modified) {
            return Ok(false);
        }
        self.last_modified = Some(modified);
        Ok(true)
    }

    /// Decodes the manifest into installed game ids and their directories.
    /// A missing file yields an empty map.
    pub fn parse(&self) -> Result<InstalledGames, ManifestError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "manifest not found");
                return Ok(InstalledGames::new());
            }
            Err(source) => {
                return Err(ManifestError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        decode(&content).map_err(|source| ManifestError::Decode {
            path: self.path.clone(),
            source,
        })
    }
}

fn decode(content: &str) -> Result<InstalledGames, serde_json::Error> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let manifest: Manifest = serde_json::from_str(content)?;

    let mut installed = InstalledGames::new();
    for entry in manifest.installation_list {
        let Some(app_name) = entry.app_name.filter(|name| !name.is_empty()) else {
            continue;
        };
        if app_name.starts_with(ENGINE_TOOLING_PREFIX) {
            continue;
        }
        match entry.install_location {
            Some(location) => {
                installed.insert(app_name, location);
            }
            None => warn!(app = %app_name, "manifest entry has no install location; skipping"),
        }
    }
    Ok(installed)
}
