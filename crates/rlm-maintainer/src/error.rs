use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MaintainerError {
    #[error("timed out after {timeout_secs}s waiting for exclusive lock on {path}")]
    LockTimeout { path: PathBuf, timeout_secs: u64 },

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse session transcript: {0}")]
    Parse(#[from] rlm_core::error::ParseError),

    #[error("index error: {0}")]
    Index(#[from] rlm_index::IndexError),

    #[error("background lock task panicked: {0}")]
    Join(#[from] tokio::task::JoinError),
}
