use std::path::PathBuf;

/// Failures reading the launcher manifest.
///
/// A missing manifest is never an error; these variants mean the file exists
/// but the install environment is broken.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("failed to stat manifest {path}: {source}")]
    Stat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read manifest {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode manifest {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Per-process query failures. Scans treat every variant as soft and skip
/// the process.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    #[error("process {0} no longer exists")]
    NoSuchProcess(u32),

    #[error("access denied to process {0}")]
    AccessDenied(u32),
}
