//! Async JSONL parser for session transcripts.
//!
//! Streams a transcript line by line, skipping malformed or meta lines rather
//! than failing the whole parse — the indexer and the orchestrator must both
//! be able to make progress on a transcript with the occasional bad line.

use crate::error::ParseError;
use crate::types::{JsonlEntry, Role, TranscriptMessage};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

/// Parse a session transcript into its messages, starting at 1-based line
/// `from_line` (use 1 to parse the whole file). Used by both a full index
/// build and the Index Maintainer's incremental update, which resumes from
/// `sessions[sessionId].lastIndexedLine`.
pub async fn parse_session_from(
    file_path: &Path,
    from_line: usize,
) -> Result<Vec<TranscriptMessage>, ParseError> {
    let file = File::open(file_path)
        .await
        .map_err(|e| ParseError::io(file_path, e))?;

    let reader = BufReader::new(file);
    let mut lines = reader.lines();
    let mut messages = Vec::new();
    let mut line_number = 0usize;

    while let Some(line_result) = lines
        .next_line()
        .await
        .map_err(|e| ParseError::io(file_path, e))?
    {
        line_number += 1;
        if line_number < from_line {
            continue;
        }

        let line = line_result.trim();
        if line.is_empty() {
            continue;
        }

        let entry: JsonlEntry = match serde_json::from_str(line) {
            Ok(e) => e,
            Err(e) => {
                debug!(path = %file_path.display(), line_number, error = %e, "skipping malformed JSON line");
                continue;
            }
        };

        let (role, message, timestamp, is_meta) = match entry {
            JsonlEntry::User {
                message,
                timestamp,
                is_meta,
            } => (Role::User, message, timestamp, is_meta.unwrap_or(false)),
            JsonlEntry::Assistant { message, timestamp } => {
                (Role::Assistant, message, timestamp, false)
            }
            JsonlEntry::Other => continue,
        };

        if is_meta {
            continue;
        }

        let Some(message) = message else { continue };
        let text = message.content.to_plain_text();
        if text.trim().is_empty() {
            continue;
        }

        messages.push(TranscriptMessage {
            role,
            text,
            timestamp,
            line_number,
        });
    }

    Ok(messages)
}

/// Parse a full transcript from the start.
pub async fn parse_session(file_path: &Path) -> Result<Vec<TranscriptMessage>, ParseError> {
    parse_session_from(file_path, 1).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    async fn write_fixture(lines: &[&str]) -> tempfile::NamedTempFile {
        let f = tempfile::NamedTempFile::new().unwrap();
        let mut file = tokio::fs::File::create(f.path()).await.unwrap();
        for line in lines {
            file.write_all(line.as_bytes()).await.unwrap();
            file.write_all(b"\n").await.unwrap();
        }
        file.flush().await.unwrap();
        f
    }

    #[tokio::test]
    async fn parses_user_and_assistant_lines() {
        let f = write_fixture(&[
            r#"{"type":"user","message":{"content":"hello"},"timestamp":"2026-01-01T00:00:00Z"}"#,
            r#"{"type":"assistant","message":{"content":[{"type":"text","text":"hi there"}]}}"#,
        ])
        .await;

        let messages = parse_session(f.path()).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].text, "hello");
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].text, "hi there");
    }

    #[tokio::test]
    async fn skips_malformed_and_meta_lines() {
        let f = write_fixture(&[
            r#"not json at all"#,
            r#"{"type":"user","message":{"content":"real"},"isMeta":true}"#,
            r#"{"type":"user","message":{"content":"kept"}}"#,
        ])
        .await;

        let messages = parse_session(f.path()).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, "kept");
        assert_eq!(messages[0].line_number, 3);
    }

    #[tokio::test]
    async fn resumes_from_line() {
        let f = write_fixture(&[
            r#"{"type":"user","message":{"content":"one"}}"#,
            r#"{"type":"user","message":{"content":"two"}}"#,
            r#"{"type":"user","message":{"content":"three"}}"#,
        ])
        .await;

        let messages = parse_session_from(f.path(), 2).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].text, "two");
        assert_eq!(messages[1].text, "three");
    }

    #[tokio::test]
    async fn not_found_is_classified() {
        let err = parse_session(Path::new("/nonexistent/session.jsonl"))
            .await
            .unwrap_err();
        assert!(matches!(err, ParseError::NotFound { .. }));
    }
}
