//! Launcher identity and install detection.
//!
//! The launcher counts as installed when its install marker exists: a
//! registry key under `HKLM` on Windows, an application bundle on macOS.
//! Other platforms have no default marker and report "not installed"
//! unless one is configured.

use std::path::PathBuf;

#[cfg(windows)]
pub const LAUNCHER_PROCESS_IDENTIFIER: &str = "EpicGamesLauncher.exe";
#[cfg(not(windows))]
pub const LAUNCHER_PROCESS_IDENTIFIER: &str = "Epic Games Launcher";

pub const LAUNCHER_REGISTRY_KEY: &str = r"SOFTWARE\WOW6432Node\Epic Games\EpicGamesLauncher";
pub const LAUNCHER_MAC_BUNDLE: &str = "/Applications/Epic Games Launcher.app";

// ── Windows implementation ─────────────────────────────────────────────────────

#[cfg(windows)]
mod imp {
    use windows::core::PCWSTR;
    use windows::Win32::Foundation::ERROR_SUCCESS;
    use windows::Win32::System::Registry::{RegCloseKey, RegOpenKeyExW, HKEY, HKEY_LOCAL_MACHINE, KEY_READ};

    /// Converts a Rust `&str` to a null-terminated UTF-16 `Vec<u16>`.
    fn to_wide(s: &str) -> Vec<u16> {
        s.encode_utf16().chain(std::iter::once(0)).collect()
    }

    /// True when `HKLM\<subkey>` can be opened for reading.
    pub fn key_exists(subkey: &str) -> bool {
        let key_w = to_wide(subkey);
        let mut hkey = HKEY::default();
        let err = unsafe {
            RegOpenKeyExW(
                HKEY_LOCAL_MACHINE,
                PCWSTR::from_raw(key_w.as_ptr()),
                0,
                KEY_READ,
                &mut hkey,
            )
        };
        if err != ERROR_SUCCESS {
            return false;
        }
        unsafe { let _ = RegCloseKey(hkey); };
        true
    }
}

// ── Public API ─────────────────────────────────────────────────────────────────

/// Evidence that the launcher is installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallMarker {
    /// Subkey of `HKEY_LOCAL_MACHINE`. Never present off Windows.
    RegistryKey(String),
    Path(PathBuf),
}

impl InstallMarker {
    pub fn exists(&self) -> bool {
        match self {
            InstallMarker::Path(path) => path.exists(),
            #[cfg(windows)]
            InstallMarker::RegistryKey(key) => imp::key_exists(key),
            #[cfg(not(windows))]
            InstallMarker::RegistryKey(_) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Launcher {
    /// Matched against process executable paths to find the launcher itself.
    pub process_identifier: String,
    pub install_marker: Option<InstallMarker>,
}

impl Launcher {
    pub fn platform_default() -> Self {
        let install_marker = if cfg!(windows) {
            Some(InstallMarker::RegistryKey(LAUNCHER_REGISTRY_KEY.to_string()))
        } else if cfg!(target_os = "macos") {
            Some(InstallMarker::Path(PathBuf::from(LAUNCHER_MAC_BUNDLE)))
        } else {
            None
        };
        Self {
            process_identifier: LAUNCHER_PROCESS_IDENTIFIER.to_string(),
            install_marker,
        }
    }

    pub fn is_installed(&self) -> bool {
        self.install_marker
            .as_ref()
            .is_some_and(InstallMarker::exists)
    }
}
