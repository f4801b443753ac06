use serde::{Deserialize, Serialize};

/// Serializes a Unix timestamp (seconds) as an ISO-8601 / RFC3339 string.
///
/// Accepts either form on deserialization so older persisted documents
/// (numeric timestamps) keep loading.
pub mod unix_to_iso {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(timestamp: &i64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let dt = DateTime::<Utc>::from_timestamp(*timestamp, 0)
            .unwrap_or_else(|| DateTime::<Utc>::from_timestamp(0, 0).unwrap());
        serializer.serialize_str(&dt.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<i64, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum StringOrNumber {
            String(String),
            Number(i64),
        }

        match StringOrNumber::deserialize(deserializer)? {
            StringOrNumber::Number(n) => Ok(n),
            StringOrNumber::String(s) => DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.timestamp())
                .map_err(serde::de::Error::custom),
        }
    }
}

/// Role of a message within a transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single parsed line of a session transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub role: Role,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    pub line_number: usize,
}

/// A reference into a memory file or session transcript: a compact pointer
/// the caller may later expand into a bounded text window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ref {
    pub path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub score: f64,
    pub source: String,
    pub preview: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hop: Option<u32>,
}

impl Ref {
    /// `1 <= start_line <= end_line` is an invariant of every ref the core returns.
    pub fn is_well_formed(&self) -> bool {
        self.start_line >= 1 && self.start_line <= self.end_line
    }

    pub fn merge_key(&self) -> (String, usize, usize) {
        (self.path.clone(), self.start_line, self.end_line)
    }
}

/// The literal marker appended when a window is truncated by a byte budget.
pub const TRUNCATION_MARKER: &str = "\n…TRUNCATED…";

/// A bounded text window produced by expanding a [`Ref`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpandedWindow {
    pub path: String,
    pub from: usize,
    pub lines: usize,
    pub text: String,
}

/// Per-ref expansion failure; siblings in the same batch still succeed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpandError {
    pub path: String,
    pub error: String,
}

/// Budget bookkeeping returned alongside expand results.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpandBudget {
    pub max_refs: usize,
    pub default_lines: usize,
    pub max_chars: usize,
}

/// Configuration for the bounded multi-hop recursive retrieval loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecursiveConfig {
    pub enabled: bool,
    pub max_hops: u32,
    pub max_refs_per_hop: usize,
    pub expand_top_k: usize,
    pub default_lines: usize,
    pub max_chars_per_ref: usize,
    pub max_total_expanded_chars: usize,
    pub derived_query_max_terms: usize,
    pub early_stop: bool,
}

impl Default for RecursiveConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_hops: 1,
            max_refs_per_hop: 8,
            expand_top_k: 2,
            default_lines: 20,
            max_chars_per_ref: 8000,
            max_total_expanded_chars: 12_000,
            derived_query_max_terms: 12,
            early_stop: true,
        }
    }
}

/// Per-hop bookkeeping surfaced in a recursive search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecursiveHop {
    pub hop: u32,
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub derived_query: Option<String>,
    pub new_refs: usize,
}

/// Summary of a recursive run, attached to `searchRefs` output when
/// `recursive` was requested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecursiveMeta {
    pub enabled: bool,
    pub budget: RecursiveConfig,
    pub hops: Vec<RecursiveHop>,
    pub total_expanded_chars: usize,
}

/// A known session transcript on disk, as tracked by discovery/the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: String,
    pub path: String,
    #[serde(with = "unix_to_iso")]
    pub modified_at: i64,
    pub line_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

// ============================================================================
// JSONL parsing types (internal, for deserializing Claude Code transcripts)
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum JsonlEntry {
    User {
        message: Option<JsonlMessage>,
        timestamp: Option<String>,
        #[serde(rename = "isMeta")]
        is_meta: Option<bool>,
    },
    Assistant {
        message: Option<JsonlMessage>,
        timestamp: Option<String>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonlMessage {
    pub role: Option<String>,
    pub content: JsonlContent,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum JsonlContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        name: String,
        #[serde(default)]
        input: Option<serde_json::Value>,
    },
    ToolResult {
        #[serde(default)]
        content: Option<serde_json::Value>,
    },
    #[serde(other)]
    Other,
}

impl JsonlContent {
    /// Flatten to plain text the way the tokenizer and previews consume it:
    /// text blocks concatenated with a space, non-text blocks dropped.
    pub fn to_plain_text(&self) -> String {
        match self {
            JsonlContent::Text(s) => s.clone(),
            JsonlContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}
