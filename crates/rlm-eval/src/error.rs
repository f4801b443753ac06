use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("IO error reading/writing report at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed report JSON: {0}")]
    Json(#[from] serde_json::Error),
}
