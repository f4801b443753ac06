//! The Refs-First Orchestrator: the single entry point above the Semantic
//! Searcher and the Inverted-Index engine. Maps raw hits to [`Ref`]s,
//! applies the binary-blob safety filter, and optionally runs the bounded
//! multi-hop recursive retrieval loop.

pub mod semantic;

use regex_lite::Regex;
use rlm_core::types::{Ref, RecursiveConfig, RecursiveHop, RecursiveMeta};
use rlm_index::types::IndexDocument;
use semantic::{DisabledSearcher, SemanticError, SemanticSearcher};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::OnceLock;

#[derive(Debug, Clone)]
pub struct SearchRefsOptions {
    pub max_results: usize,
    pub min_score: Option<f64>,
    pub preview_chars: usize,
    pub recursive: Option<RecursiveConfig>,
}

impl Default for SearchRefsOptions {
    fn default() -> Self {
        Self {
            max_results: 20,
            min_score: None,
            preview_chars: 200,
            recursive: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchRefsResult {
    pub query: String,
    pub refs: Vec<Ref>,
    pub provider: String,
    pub model: Option<String>,
    pub semantic_error: Option<String>,
    pub recursive: Option<RecursiveMeta>,
}

/// The orchestrator itself, generic over whichever [`SemanticSearcher`] is
/// configured — [`DisabledSearcher`] by default, meaning only the lexical
/// inverted-index engine contributes refs.
pub struct Orchestrator<S: SemanticSearcher = DisabledSearcher> {
    workspace_root: PathBuf,
    semantic: S,
}

impl Orchestrator<DisabledSearcher> {
    pub fn new(workspace_root: PathBuf) -> Self {
        Self {
            workspace_root,
            semantic: DisabledSearcher,
        }
    }
}

impl<S: SemanticSearcher> Orchestrator<S> {
    pub fn with_semantic_searcher(workspace_root: PathBuf, semantic: S) -> Self {
        Self { workspace_root, semantic }
    }

    pub async fn search_refs(
        &self,
        index: &IndexDocument,
        query: &str,
        opts: &SearchRefsOptions,
    ) -> SearchRefsResult {
        match &opts.recursive {
            Some(cfg) if cfg.enabled && cfg.max_hops > 0 => {
                self.search_refs_recursive(index, query, opts, cfg).await
            }
            _ => self.search_refs_once(index, query, opts).await,
        }
    }

    async fn search_refs_once(
        &self,
        index: &IndexDocument,
        query: &str,
        opts: &SearchRefsOptions,
    ) -> SearchRefsResult {
        let mut refs = Vec::new();
        let mut provider_parts = Vec::new();
        let mut semantic_error = None;

        match self.semantic.search(query, opts.max_results).await {
            Ok(hits) => {
                if !hits.is_empty() {
                    provider_parts.push("semantic");
                }
                for hit in hits {
                    refs.push(Ref {
                        path: hit.path,
                        start_line: hit.start_line,
                        end_line: hit.end_line,
                        score: hit.score,
                        source: "semantic".to_string(),
                        preview: make_preview(&hit.snippet, opts.preview_chars),
                        session_id: hit.session_id,
                        hop: None,
                    });
                }
            }
            Err(SemanticError::Disabled) => {}
            Err(e) => semantic_error = Some(e.to_string()),
        }

        let index_opts = rlm_index::query::SearchOptions {
            max_results: opts.max_results,
            ..Default::default()
        };
        let response = rlm_index::query::search(index, &self.workspace_root, query, &index_opts).await;
        if !response.results.is_empty() {
            provider_parts.push("index");
        }
        for session_result in &response.results {
            for hit in &session_result.matches {
                refs.push(Ref {
                    path: session_result.path.clone(),
                    start_line: hit.line_number,
                    end_line: hit.line_number,
                    score: hit.match_score,
                    source: "sessions".to_string(),
                    preview: make_preview(&hit.snippet, opts.preview_chars),
                    session_id: Some(session_result.session_id.clone()),
                    hop: None,
                });
            }
        }

        refs.retain(|r| !is_binary_blob(&r.preview));
        if let Some(min_score) = opts.min_score {
            refs.retain(|r| r.score >= min_score);
        }
        refs.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        refs.truncate(opts.max_results);

        let provider = if provider_parts.is_empty() {
            "disabled".to_string()
        } else {
            provider_parts.join("+")
        };

        SearchRefsResult {
            query: query.to_string(),
            refs,
            provider,
            model: None,
            semantic_error,
            recursive: None,
        }
    }

    async fn search_refs_recursive(
        &self,
        index: &IndexDocument,
        query: &str,
        opts: &SearchRefsOptions,
        cfg: &RecursiveConfig,
    ) -> SearchRefsResult {
        let mut accumulator: HashMap<(String, usize, usize), Ref> = HashMap::new();
        let mut hops_meta = Vec::new();
        let mut total_expanded_chars = 0usize;
        let mut provider = "disabled".to_string();
        let mut semantic_error = None;

        let hop_opts = SearchRefsOptions {
            max_results: cfg.max_refs_per_hop,
            min_score: opts.min_score,
            preview_chars: opts.preview_chars,
            recursive: None,
        };

        let hop0 = self.search_refs_once(index, query, &hop_opts).await;
        provider = hop0.provider.clone();
        semantic_error = hop0.semantic_error.clone();
        let mut new_refs_count = merge_refs(&mut accumulator, hop0.refs, 0);
        hops_meta.push(RecursiveHop {
            hop: 0,
            query: query.to_string(),
            derived_query: None,
            new_refs: new_refs_count,
        });

        let mut current_query = query.to_string();

        for h in 0..cfg.max_hops {
            let mut ranked: Vec<Ref> = accumulator.values().cloned().collect();
            ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
            let top_k: Vec<Ref> = ranked.into_iter().take(cfg.expand_top_k).collect();

            let remaining = cfg.max_total_expanded_chars.saturating_sub(total_expanded_chars);
            let expand_opts = rlm_expand::ExpandOptions {
                default_lines: cfg.default_lines,
                max_refs: top_k.len().max(1),
                max_chars: cfg.max_chars_per_ref,
                max_total_chars: Some(remaining),
            };
            let outcome = rlm_expand::expand(&self.workspace_root, &top_k, &expand_opts).await;
            total_expanded_chars += outcome.total_chars_used;

            let concatenated = outcome
                .results
                .iter()
                .map(|w| w.text.as_str())
                .collect::<Vec<_>>()
                .join("\n");
            let derived = derive_query(&concatenated, cfg.derived_query_max_terms);

            if cfg.early_stop && new_refs_count == 0 {
                break;
            }
            let Some(delta) = derived.clone() else {
                break;
            };
            if delta.is_empty() {
                break;
            }

            current_query = format!("{} {}", query, delta);

            let next_hop_opts = SearchRefsOptions {
                max_results: cfg.max_refs_per_hop,
                min_score: opts.min_score,
                preview_chars: opts.preview_chars,
                recursive: None,
            };
            let hop_result = self.search_refs_once(index, &current_query, &next_hop_opts).await;
            if hop_result.provider != "disabled" {
                provider = hop_result.provider.clone();
            }

            new_refs_count = merge_refs(&mut accumulator, hop_result.refs, h + 1);
            hops_meta.push(RecursiveHop {
                hop: h + 1,
                query: current_query.clone(),
                derived_query: Some(delta),
                new_refs: new_refs_count,
            });
        }

        let mut refs: Vec<Ref> = accumulator.into_values().collect();
        refs.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        refs.truncate(opts.max_results);

        SearchRefsResult {
            query: query.to_string(),
            refs,
            provider,
            model: None,
            semantic_error,
            recursive: Some(RecursiveMeta {
                enabled: true,
                budget: cfg.clone(),
                hops: hops_meta,
                total_expanded_chars,
            }),
        }
    }
}

/// Merge `new_refs` into `accumulator` keyed by `(path, startLine, endLine)`,
/// first-writer-wins on `hop`, preserving the max score seen. Returns the
/// count of genuinely new keys.
fn merge_refs(
    accumulator: &mut HashMap<(String, usize, usize), Ref>,
    new_refs: Vec<Ref>,
    hop: u32,
) -> usize {
    let mut added = 0;
    for r in new_refs {
        let key = r.merge_key();
        match accumulator.get_mut(&key) {
            Some(existing) => {
                if r.score > existing.score {
                    existing.score = r.score;
                }
            }
            None => {
                added += 1;
                let mut r = r;
                r.hop = Some(hop);
                accumulator.insert(key, r);
            }
        }
    }
    added
}

/// Whitespace-normalise a snippet and truncate to `max_len` characters with
/// a trailing ellipsis.
fn make_preview(snippet: &str, max_len: usize) -> String {
    let normalized = snippet.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.chars().count() <= max_len {
        return normalized;
    }
    let truncated: String = normalized.chars().take(max_len).collect();
    format!("{}...", truncated)
}

/// A ref whose preview is (a) >= 40 chars with no whitespace and wholly in
/// `[A-Za-z0-9+/=]`, or (b) contains the Unicode replacement character, is
/// dropped: expanding it can explode context with no information gain.
fn is_binary_blob(preview: &str) -> bool {
    if preview.contains('\u{FFFD}') {
        return true;
    }
    let char_count = preview.chars().count();
    if char_count >= 40
        && !preview.chars().any(|c| c.is_whitespace())
        && preview
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '='))
    {
        return true;
    }
    false
}

const STOPWORDS: &[&str] = &["http", "https", "from", "lines", "default", "true", "false"];

fn url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"https?://\S+").unwrap())
}

fn file_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b[\w./-]+\.(md|ts|tsx|js|jsx|json|py|yml|yaml|toml|sh)\b").unwrap()
    })
}

fn ident_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[a-zA-Z][a-zA-Z0-9_-]{2,}\b").unwrap())
}

/// The query derivation heuristic: from the concatenation of expanded
/// texts, extract URLs, then file-like tokens, then identifier tokens;
/// filter to length 4-80, drop the closed stopword set, dedupe preserving
/// order, cap at `max_terms`.
fn derive_query(text: &str, max_terms: usize) -> Option<String> {
    let stop: HashSet<&str> = STOPWORDS.iter().copied().collect();
    let mut seen = HashSet::new();
    let mut terms = Vec::new();

    for m in url_re()
        .find_iter(text)
        .chain(file_re().find_iter(text))
        .chain(ident_re().find_iter(text))
    {
        let candidate = m.as_str();
        let len = candidate.chars().count();
        if len < 4 || len > 80 {
            continue;
        }
        if stop.contains(candidate.to_lowercase().as_str()) {
            continue;
        }
        if seen.insert(candidate.to_string()) {
            terms.push(candidate.to_string());
        }
        if terms.len() >= max_terms {
            break;
        }
    }

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" "))
    }
}
