//! The three-tier query pipeline: posting-list intersection, coarse
//! substring ranking, then the enhanced lexical matcher — falling back to a
//! full scan when any tier comes up empty.

use crate::tokenize::tokenize_unique;
use crate::types::{
    IndexDocument, MatchHit, SearchPath, SearchResponse, SessionEntry, SessionResult,
    TemporalFilter,
};
use rlm_core::parser::parse_session;
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Instant;

/// Tier 2's coarse-ranking candidate cap.
pub const DEFAULT_TIER2_CANDIDATES: usize = 40;

/// Tier 3 content caps, in words.
pub const DEFAULT_SCAN_WORDS: usize = 2000;
pub const DEFAULT_SUBSTRING_SCAN_WORDS: usize = 1000;
pub const DEFAULT_FUZZY_SCAN_WORDS: usize = 500;

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub max_results: usize,
    pub temporal_filter: Option<TemporalFilter>,
    pub tier2_candidates: usize,
    pub scan_words: usize,
    pub substring_scan_words: usize,
    pub fuzzy_scan_words: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            max_results: 20,
            temporal_filter: None,
            tier2_candidates: DEFAULT_TIER2_CANDIDATES,
            scan_words: DEFAULT_SCAN_WORDS,
            substring_scan_words: DEFAULT_SUBSTRING_SCAN_WORDS,
            fuzzy_scan_words: DEFAULT_FUZZY_SCAN_WORDS,
        }
    }
}

/// Run the full pipeline: Tier 1 → Tier 2 → Tier 3, falling back to a full
/// scan when the index is absent, Tier 1's intersection is empty, or Tier 3
/// yields nothing. `workspace_root` is where `sessions/<id>.jsonl` paths in
/// the index resolve relative to.
pub async fn search(
    doc: &IndexDocument,
    workspace_root: &Path,
    query: &str,
    opts: &SearchOptions,
) -> SearchResponse {
    let total_start = Instant::now();
    let query_tokens = tokenize_unique(query);

    if doc.sessions.is_empty() {
        let query_start = Instant::now();
        let results = full_scan(doc.sessions.keys().map(|s| s.as_str()), doc, workspace_root, &query_tokens, opts).await;
        return finish(query, results, SearchPath::Fallback, query_start, total_start, opts.max_results);
    }

    let candidates = tier1_intersect(doc, &query_tokens);
    if candidates.is_empty() {
        let query_start = Instant::now();
        let results = full_scan(doc.sessions.keys().map(|s| s.as_str()), doc, workspace_root, &query_tokens, opts).await;
        return finish(query, results, SearchPath::Fallback, query_start, total_start, opts.max_results);
    }

    let query_start = Instant::now();
    let narrowed = tier2_coarse_filter(doc, &candidates, &query_tokens, opts.tier2_candidates);
    let restricted = apply_temporal_filter(doc, narrowed, opts.temporal_filter.as_ref());

    let results = tier3_enhanced_match(doc, workspace_root, &restricted, &query_tokens, opts).await;

    if results.is_empty() {
        let fallback_start = Instant::now();
        let fb = full_scan(doc.sessions.keys().map(|s| s.as_str()), doc, workspace_root, &query_tokens, opts).await;
        return finish(query, fb, SearchPath::Fallback, fallback_start, total_start, opts.max_results);
    }

    finish(query, results, SearchPath::Index, query_start, total_start, opts.max_results)
}

fn finish(
    query: &str,
    mut results: Vec<SessionResult>,
    path: SearchPath,
    query_start: Instant,
    total_start: Instant,
    max_results: usize,
) -> SearchResponse {
    results.sort_by(|a, b| {
        b.match_score
            .partial_cmp(&a.match_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.modified_at.cmp(&a.modified_at))
    });
    results.truncate(max_results);

    SearchResponse {
        query: query.to_string(),
        results,
        search_path: path,
        query_time_ms: query_start.elapsed().as_secs_f64() * 1000.0,
        total_time_ms: total_start.elapsed().as_secs_f64() * 1000.0,
    }
}

/// Tier 1: posting-list intersection, sorted by ascending posting-list
/// length, intersected from smallest outward, early-exiting on an empty
/// intermediate result.
fn tier1_intersect(doc: &IndexDocument, query_tokens: &[String]) -> Vec<String> {
    if query_tokens.is_empty() {
        return Vec::new();
    }

    let mut postings: Vec<&Vec<String>> = Vec::new();
    for token in query_tokens {
        match doc.tokens.get(token) {
            Some(p) => postings.push(p),
            None => return Vec::new(), // a missing token means zero docs contain all tokens
        }
    }

    postings.sort_by_key(|p| p.len());

    let mut acc: std::collections::HashSet<&str> =
        postings[0].iter().map(|s| s.as_str()).collect();

    for posting in &postings[1..] {
        if acc.is_empty() {
            break;
        }
        let next: std::collections::HashSet<&str> = posting.iter().map(|s| s.as_str()).collect();
        acc = acc.intersection(&next).copied().collect();
    }

    acc.into_iter().map(|s| s.to_string()).collect()
}

/// Tier 2: coarse score = fraction of query tokens occurring as a substring
/// in the session's lightweight `topics` representation. Keeps the top `Kc`.
fn tier2_coarse_filter(
    doc: &IndexDocument,
    candidates: &[String],
    query_tokens: &[String],
    kc: usize,
) -> Vec<String> {
    if query_tokens.is_empty() {
        return Vec::new();
    }

    let mut scored: Vec<(String, f64)> = candidates
        .iter()
        .filter_map(|sid| doc.sessions.get(sid).map(|entry| (sid.clone(), entry)))
        .map(|(sid, entry)| {
            let topics_blob = entry.topics.join(" ");
            let hits = query_tokens
                .iter()
                .filter(|t| topics_blob.contains(t.as_str()))
                .count();
            (sid, hits as f64 / query_tokens.len() as f64)
        })
        .collect();

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(kc);
    scored.into_iter().map(|(sid, _)| sid).collect()
}

fn apply_temporal_filter(
    doc: &IndexDocument,
    candidates: Vec<String>,
    filter: Option<&TemporalFilter>,
) -> Vec<String> {
    let Some(filter) = filter else {
        return candidates;
    };

    candidates
        .into_iter()
        .filter(|sid| {
            doc.sessions
                .get(sid)
                .and_then(|e| e.date.as_deref())
                .map(|date| date >= filter.from.as_str() && date <= filter.to.as_str())
                .unwrap_or(false)
        })
        .collect()
}

/// Tier 3: run the enhanced matcher against each restricted candidate,
/// reading its transcript from disk (capped by `opts`' content caps).
async fn tier3_enhanced_match(
    doc: &IndexDocument,
    workspace_root: &Path,
    candidates: &[String],
    query_tokens: &[String],
    opts: &SearchOptions,
) -> Vec<SessionResult> {
    let mut results = Vec::new();
    for sid in candidates {
        let Some(entry) = doc.sessions.get(sid) else {
            continue;
        };
        if let Some(result) = score_session(sid, entry, workspace_root, query_tokens, opts).await {
            results.push(result);
        }
    }
    results
}

/// The fallback full-scan path: runs the enhanced matcher against every
/// known session, ignoring the index's posting lists entirely.
async fn full_scan<'a>(
    session_ids: impl Iterator<Item = &'a str>,
    doc: &IndexDocument,
    workspace_root: &Path,
    query_tokens: &[String],
    opts: &SearchOptions,
) -> Vec<SessionResult> {
    let mut results = Vec::new();
    for sid in session_ids {
        let Some(entry) = doc.sessions.get(sid) else {
            continue;
        };
        if let Some(result) = score_session(sid, entry, workspace_root, query_tokens, opts).await {
            results.push(result);
        }
    }
    results
}

async fn score_session(
    session_id: &str,
    entry: &SessionEntry,
    workspace_root: &Path,
    query_tokens: &[String],
    opts: &SearchOptions,
) -> Option<SessionResult> {
    if query_tokens.is_empty() {
        return None;
    }

    let session_path = workspace_root.join(&entry.path);
    let messages = parse_session(&session_path).await.ok()?;

    let mut matches = Vec::new();
    let mut best_score = 0.0f64;
    let mut words_scanned = 0usize;

    for message in &messages {
        if words_scanned >= opts.scan_words {
            break;
        }
        let word_count = message.text.split_whitespace().count();
        words_scanned += word_count;

        let score = enhanced_match_score(&message.text, query_tokens, opts);
        if score > 0.0 {
            if score > best_score {
                best_score = score;
            }
            matches.push(MatchHit {
                line_number: message.line_number,
                snippet: message.text.clone(),
                match_score: score,
            });
        }
    }

    if matches.is_empty() {
        return None;
    }

    Some(SessionResult {
        session_id: session_id.to_string(),
        path: entry.path.clone(),
        modified_at: session_modified_at(entry),
        match_score: best_score,
        matches,
    })
}

/// Parse `entry.date` (RFC3339) to a unix timestamp for the "ties broken by
/// recency" ordering in [`finish`]. A missing or unparseable date sorts as
/// the oldest possible session rather than panicking or excluding it.
fn session_modified_at(entry: &SessionEntry) -> i64 {
    entry
        .date
        .as_deref()
        .and_then(|d| chrono::DateTime::parse_from_rfc3339(d).ok())
        .map(|dt| dt.timestamp())
        .unwrap_or(i64::MIN)
}

/// The enhanced matcher: combines substring containment, compound
/// splitting, Levenshtein ≤ 2 fuzzy matching, and concept expansion.
fn enhanced_match_score(text: &str, query_tokens: &[String], opts: &SearchOptions) -> f64 {
    let lower = text.to_lowercase();
    let content_tokens: Vec<&str> = lower
        .split_whitespace()
        .take(opts.scan_words)
        .collect();

    let mut hits = 0.0f64;

    for (i, token) in query_tokens.iter().enumerate() {
        // (i) substring containment, capped scan.
        let substring_scope: String = content_tokens
            .iter()
            .take(opts.substring_scan_words)
            .copied()
            .collect::<Vec<_>>()
            .join(" ");
        if substring_scope.contains(token.as_str()) {
            hits += 1.0;
            continue;
        }

        // (iv) concept expansion — checked before the costlier fuzzy scan.
        if let Some(expansions) = concept_expansions(token) {
            if expansions.iter().any(|e| substring_scope.contains(e)) {
                hits += 0.75;
                continue;
            }
        }

        // (iii) Levenshtein <= 2 fuzzy match, capped scan.
        let fuzzy_hit = content_tokens
            .iter()
            .take(opts.fuzzy_scan_words)
            .any(|ct| levenshtein(token, ct) <= 2);
        if fuzzy_hit {
            hits += 0.5;
            continue;
        }

        let _ = i;
    }

    hits / query_tokens.len() as f64
}

/// A small static map from a closed vocabulary of concept keys to related
/// term sets, e.g. `glicko → {rating, chess, elo, leaderboard}`.
fn concept_expansions(token: &str) -> Option<&'static [&'static str]> {
    static MAP: OnceLock<HashMap<&'static str, &'static [&'static str]>> = OnceLock::new();
    let map = MAP.get_or_init(|| {
        let mut m: HashMap<&'static str, &'static [&'static str]> = HashMap::new();
        m.insert("glicko", &["rating", "chess", "elo", "leaderboard"]);
        m.insert("elo", &["rating", "glicko", "chess", "leaderboard"]);
        m.insert("auth", &["login", "session", "token", "oauth"]);
        m.insert("index", &["posting", "inverted", "tokenize", "search"]);
        m.insert("cache", &["evict", "invalidate", "ttl", "stale"]);
        m
    });
    map.get(token).copied()
}

/// Classic O(len(a) * len(b)) edit distance, sufficient for short tokens.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (la, lb) = (a.len(), b.len());

    if la == 0 {
        return lb;
    }
    if lb == 0 {
        return la;
    }

    let mut row: Vec<usize> = (0..=lb).collect();
    for i in 1..=la {
        let mut prev_diag = row[0];
        row[0] = i;
        for j in 1..=lb {
            let temp = row[j];
            row[j] = if a[i - 1] == b[j - 1] {
                prev_diag
            } else {
                1 + prev_diag.min(row[j]).min(row[j - 1])
            };
            prev_diag = temp;
        }
    }
    row[lb]
}
