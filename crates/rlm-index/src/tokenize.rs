//! Shared tokenisation contract: the same function runs at index time and at
//! query time. Divergence between the two would silently break retrieval, so
//! there is exactly one entry point — [`tokenize`] — and both the indexer and
//! the query pipeline call it.

use std::collections::HashSet;
use std::sync::OnceLock;

/// ~100 common English stopwords plus a handful of domain-noise tokens that
/// otherwise dominate posting lists without discriminating anything.
static STOPWORDS: OnceLock<HashSet<&'static str>> = OnceLock::new();

fn stopwords() -> &'static HashSet<&'static str> {
    STOPWORDS.get_or_init(|| {
        [
            "the", "and", "for", "this", "that", "with", "from", "have", "has", "had", "are",
            "was", "were", "been", "being", "does", "did", "doing", "will", "would", "could",
            "should", "shall", "can", "may", "might", "must", "not", "but", "or", "nor", "yet",
            "so", "if", "then", "than", "else", "when", "where", "which", "who", "whom", "whose",
            "why", "how", "what", "all", "any", "both", "each", "few", "more", "most", "other",
            "some", "such", "only", "own", "same", "too", "very", "just", "also", "about",
            "above", "after", "again", "against", "because", "before", "below", "between",
            "down", "during", "further", "here", "into", "off", "once", "out", "over", "under",
            "until", "while", "you", "your", "yours", "she", "her", "hers", "him", "his", "they",
            "them", "their", "theirs", "our", "ours", "these", "those", "there", "doesn", "isn",
            "wasn", "weren", "aren", "couldn", "http", "https", "json", "null", "undefined",
            "true", "false", "www", "com", "org",
        ]
        .into_iter()
        .collect()
    })
}

const MIN_TOKEN_LEN: usize = 3;

/// Split on non-alphanumeric boundaries, plus camelCase/kebab-case/snake_case
/// internal boundaries; lowercase, drop anything shorter than
/// [`MIN_TOKEN_LEN`] or in [`STOPWORDS`]. No stemming.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for word in split_non_alphanumeric(text) {
        for piece in split_compound(&word) {
            let lower = piece.to_lowercase();
            if lower.len() < MIN_TOKEN_LEN {
                continue;
            }
            if stopwords().contains(lower.as_str()) {
                continue;
            }
            tokens.push(lower);
        }
    }
    tokens
}

/// Tokenise and deduplicate, preserving first-seen order. Used wherever a
/// posting list or a "query token set" is needed rather than a bag.
pub fn tokenize_unique(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    tokenize(text)
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

fn split_non_alphanumeric(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

/// Split a single alphanumeric run on internal kebab/snake/camel boundaries.
/// `split_non_alphanumeric` already removed `-`/`_` as delimiters, so this
/// only needs to handle camelCase: a lowercase-then-uppercase transition, or
/// a run of uppercase letters followed by a lowercase one (`HTTPServer` →
/// `http, server`).
fn split_compound(word: &str) -> Vec<String> {
    let chars: Vec<char> = word.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }

    let mut pieces = Vec::new();
    let mut current = String::new();

    for i in 0..chars.len() {
        let c = chars[i];
        let boundary = if current.is_empty() {
            false
        } else {
            let prev = chars[i - 1];
            let next = chars.get(i + 1);
            (prev.is_lowercase() && c.is_uppercase())
                || (prev.is_uppercase()
                    && c.is_uppercase()
                    && next.map(|n| n.is_lowercase()).unwrap_or(false))
                || (prev.is_alphabetic() && c.is_numeric())
                || (prev.is_numeric() && c.is_alphabetic())
        };

        if boundary {
            pieces.push(std::mem::take(&mut current));
        }
        current.push(c);
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}
