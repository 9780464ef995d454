use serde::{Serialize, Serializer};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Installed/running status of a single application, stored as two
/// independent bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LocalGameState(u8);

impl LocalGameState {
    pub const NONE: Self = Self(0);
    pub const INSTALLED: Self = Self(1);
    pub const RUNNING: Self = Self(1 << 1);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    pub fn is_installed(self) -> bool {
        self.contains(Self::INSTALLED)
    }

    pub fn is_running(self) -> bool {
        self.contains(Self::RUNNING)
    }

    /// Lowercase labels of the set bits, e.g. `["installed", "running"]`.
    pub fn labels(self) -> Vec<&'static str> {
        let mut labels = Vec::new();
        if self.is_installed() {
            labels.push("installed");
        }
        if self.is_running() {
            labels.push("running");
        }
        labels
    }
}

impl BitOr for LocalGameState {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for LocalGameState {
    fn bitor_assign(&mut self, rhs: Self) {
        self.insert(rhs);
    }
}

impl fmt::Display for LocalGameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels = self.labels();
        if labels.is_empty() {
            f.write_str("none")
        } else {
            f.write_str(&labels.join("|"))
        }
    }
}

impl Serialize for LocalGameState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.labels().serialize(serializer)
    }
}

/// One of the two independent dimensions of a [`LocalGameState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facet {
    Installed,
    Running,
}

impl Facet {
    pub fn bit(self) -> LocalGameState {
        match self {
            Facet::Installed => LocalGameState::INSTALLED,
            Facet::Running => LocalGameState::RUNNING,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_none() {
        assert_eq!(LocalGameState::default(), LocalGameState::NONE);
        assert!(!LocalGameState::NONE.is_installed());
        assert!(!LocalGameState::NONE.is_running());
    }

    #[test]
    fn facets_are_independent() {
        let mut state = LocalGameState::NONE;
        state.insert(Facet::Installed.bit());
        state.insert(Facet::Running.bit());
        assert_eq!(state, LocalGameState::INSTALLED | LocalGameState::RUNNING);

        state.remove(Facet::Installed.bit());
        assert!(!state.is_installed());
        assert!(state.is_running());
    }

    #[test]
    fn remove_of_unset_bit_is_noop() {
        let mut state = LocalGameState::INSTALLED;
        state.remove(LocalGameState::RUNNING);
        assert_eq!(state, LocalGameState::INSTALLED);
    }

    #[test]
    fn display_joins_labels() {
        assert_eq!(LocalGameState::NONE.to_string(), "none");
        assert_eq!(
            (LocalGameState::INSTALLED | LocalGameState::RUNNING).to_string(),
            "installed|running"
        );
    }
}
