//! Pure index-mutation logic: applying a batch of newly-parsed transcript
//! messages to an [`IndexDocument`]. Kept separate from [`crate::SearchIndex`]
//! (which owns load/persist) so `rlm-maintainer` can mutate a document
//! in-memory under its own file lock without this crate knowing anything
//! about locking.

use crate::tokenize::tokenize;
use crate::types::{IndexDocument, SessionEntry};
use rlm_core::types::TranscriptMessage;
use std::collections::HashMap;

/// How many of a session's most frequent tokens are retained as its
/// `topics` set — the "lightweight representation" Tier 2 scores against.
const TOPICS_TOP_K: usize = 20;

/// Apply `new_messages` (already sliced to start after
/// `sessions[sessionId].lastIndexedLine`) to `doc`, updating posting lists
/// and the session's bookkeeping entry. Returns the number of messages
/// applied.
///
/// Idempotent with respect to `lastIndexedLine`: callers must only pass
/// messages strictly after the previously recorded line, which the caller
/// (the Index Maintainer) guarantees by construction.
pub fn apply_messages(
    doc: &mut IndexDocument,
    session_id: &str,
    session_path: &str,
    session_date: Option<String>,
    new_messages: &[TranscriptMessage],
) -> usize {
    if new_messages.is_empty() {
        // Still make sure the session is registered, e.g. a session with
        // zero indexable messages yet should not count as "missing".
        doc.sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionEntry {
                last_indexed_line: 0,
                topics: Vec::new(),
                date: session_date,
                path: session_path.to_string(),
            });
        return 0;
    }

    let mut term_freq: HashMap<String, usize> = HashMap::new();
    let mut max_line = new_messages
        .iter()
        .map(|m| m.line_number)
        .max()
        .unwrap_or(0);

    for message in new_messages {
        for token in tokenize(&message.text) {
            *term_freq.entry(token.clone()).or_insert(0) += 1;

            let posting = doc.tokens.entry(token).or_default();
            // Posting lists are sorted and duplicate-free (SPEC_FULL §8);
            // insert at the binary-search position rather than appending.
            if let Err(idx) = posting.binary_search_by(|s| s.as_str().cmp(session_id)) {
                posting.insert(idx, session_id.to_string());
            }
        }
    }

    let mut ranked: Vec<(String, usize)> = term_freq.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    let topics: Vec<String> = ranked.into_iter().take(TOPICS_TOP_K).map(|(t, _)| t).collect();

    let entry = doc
        .sessions
        .entry(session_id.to_string())
        .or_insert_with(|| SessionEntry {
            last_indexed_line: 0,
            topics: Vec::new(),
            date: None,
            path: session_path.to_string(),
        });

    // lastIndexedLine is monotonically non-decreasing (§3 invariant ii).
    if max_line < entry.last_indexed_line {
        max_line = entry.last_indexed_line;
    }
    entry.last_indexed_line = max_line;
    entry.topics = topics;
    entry.path = session_path.to_string();
    if session_date.is_some() {
        entry.date = session_date;
    }

    new_messages.len()
}

/// Remove a session from the index entirely: drop it from `sessions`, and
/// prune it out of every posting list that references it. Used by an
/// explicit rebuild when a session file has been deleted from disk.
pub fn remove_session(doc: &mut IndexDocument, session_id: &str) {
    doc.sessions.remove(session_id);
    for posting in doc.tokens.values_mut() {
        posting.retain(|s| s != session_id);
    }
    doc.tokens.retain(|_, posting| !posting.is_empty());
}
