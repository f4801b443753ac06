use thiserror::Error;

/// Internal expansion failures; callers see these folded into a per-ref
/// `rlm_core::types::ExpandError` rather than surfaced directly, since one
/// bad ref in a batch must not fail its siblings.
#[derive(Debug, Error)]
pub enum ExpandFailure {
    #[error("file not found: {0}")]
    NotFound(String),

    #[error("path traversal rejected: {0}")]
    PathTraversal(String),

    #[error("invalid UTF-8 in {0}")]
    InvalidUtf8(String),

    #[error("line range out of bounds: {0}")]
    OutOfRange(String),

    #[error("IO error: {0}")]
    Io(String),
}
