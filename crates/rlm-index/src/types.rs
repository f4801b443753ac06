use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Bumped whenever the on-disk shape of [`IndexDocument`] changes in a way
/// that is not backward-readable. A persisted index whose `schemaVersion`
/// disagrees is wiped and rebuilt on open rather than partially migrated.
pub const SCHEMA_VERSION: u32 = 1;

/// An ordered, deduplicated set of session ids — the value type of the
/// `tokens` map. Stored as a `Vec` (not a `HashSet`) so JSON serialization is
/// deterministic and the posting list keeps a stable iteration order for
/// "ties broken by posting rank".
pub type PostingList = Vec<String>;

/// Per-session bookkeeping the indexer maintains incrementally.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEntry {
    pub last_indexed_line: usize,
    pub topics: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    pub path: String,
}

/// The on-disk / in-memory inverted index document, `{schemaVersion, tokens,
/// sessions, lastUpdated}` per the data model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexDocument {
    pub schema_version: u32,
    pub tokens: BTreeMap<String, PostingList>,
    pub sessions: BTreeMap<String, SessionEntry>,
    pub last_updated: i64,
}

impl IndexDocument {
    pub fn new() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            tokens: BTreeMap::new(),
            sessions: BTreeMap::new(),
            last_updated: 0,
        }
    }
}

impl Default for IndexDocument {
    fn default() -> Self {
        Self::new()
    }
}

/// An inclusive date range used to restrict Tier 3 candidates before the
/// enhanced matcher runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemporalFilter {
    pub from: String,
    pub to: String,
}

/// Which path produced a [`SearchResponse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchPath {
    Index,
    Fallback,
    Hybrid,
}

/// A single line-level hit within a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchHit {
    pub line_number: usize,
    pub snippet: String,
    pub match_score: f64,
}

/// A session-level search result: all matching lines plus the best score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResult {
    pub session_id: String,
    pub path: String,
    pub modified_at: i64,
    pub match_score: f64,
    pub matches: Vec<MatchHit>,
}

/// Response from the inverted-index engine's [`crate::query::search`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SessionResult>,
    pub search_path: SearchPath,
    pub query_time_ms: f64,
    pub total_time_ms: f64,
}
