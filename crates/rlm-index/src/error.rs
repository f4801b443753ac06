use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the inverted index: load/persist failures and the
/// schema-version mismatch that triggers a wipe-and-rebuild.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("IO error accessing index at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt index at {path}: {reason}")]
    Corruption { path: PathBuf, reason: String },

    #[error("index schema version {found} does not match binary's {expected}; index must be rebuilt")]
    SchemaMismatch { found: u32, expected: u32 },
}

impl IndexError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
