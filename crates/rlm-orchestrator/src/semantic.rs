//! The Semantic Searcher capability: embedding providers and any other
//! semantic scorer are treated as an opaque trait object. This crate ships
//! only the `Disabled` implementation — a real embedding-backed searcher is
//! explicitly out of scope here and plugs in behind this seam.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticHit {
    pub path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub score: f64,
    pub snippet: String,
    pub session_id: Option<String>,
}

#[derive(Debug, Error)]
pub enum SemanticError {
    #[error("semantic searcher is disabled")]
    Disabled,

    #[error("semantic searcher error: {0}")]
    Provider(String),
}

/// An opaque semantic-search capability. The orchestrator calls this
/// alongside (not instead of) the lexical inverted-index engine.
pub trait SemanticSearcher: Send + Sync {
    fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> impl std::future::Future<Output = Result<Vec<SemanticHit>, SemanticError>> + Send;
}

/// The no-op implementation: always reports itself disabled. Used when no
/// embedding provider is configured, which is the default.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledSearcher;

impl SemanticSearcher for DisabledSearcher {
    async fn search(
        &self,
        _query: &str,
        _max_results: usize,
    ) -> Result<Vec<SemanticHit>, SemanticError> {
        Err(SemanticError::Disabled)
    }
}
