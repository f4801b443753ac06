//! The Expand Engine: turns [`Ref`]s into bounded text windows, honouring a
//! per-ref character budget and, when driven from the recursive retrieval
//! loop, a global budget consumed across the whole batch in order.

pub mod error;

use error::ExpandFailure;
use rlm_core::types::{ExpandBudget, ExpandError, ExpandedWindow, Ref, TRUNCATION_MARKER};
use std::path::Path;

const MIN_LINES: usize = 1;
const MAX_LINES: usize = 400;

#[derive(Debug, Clone)]
pub struct ExpandOptions {
    pub default_lines: usize,
    pub max_refs: usize,
    pub max_chars: usize,
    /// The recursive loop's global `maxTotalExpandedChars`; `None` for a
    /// plain (non-recursive) expand call, where only the per-ref cap applies.
    pub max_total_chars: Option<usize>,
}

impl Default for ExpandOptions {
    fn default() -> Self {
        Self {
            default_lines: 20,
            max_refs: 50,
            max_chars: 8000,
            max_total_chars: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExpandOutcome {
    pub results: Vec<ExpandedWindow>,
    pub errors: Vec<ExpandError>,
    pub budget: ExpandBudget,
    /// Characters actually consumed out of `max_total_chars`, if a global
    /// budget was in effect.
    pub total_chars_used: usize,
}

/// Expand `refs` into bounded text windows rooted at `workspace_root`. Refs
/// beyond `opts.max_refs` are dropped from the tail before any I/O happens.
pub async fn expand(workspace_root: &Path, refs: &[Ref], opts: &ExpandOptions) -> ExpandOutcome {
    let refs: Vec<&Ref> = refs.iter().take(opts.max_refs).collect();

    let mut results = Vec::new();
    let mut errors = Vec::new();
    let mut remaining_global = opts.max_total_chars;
    let mut budget_exhausted = false;

    for r in refs {
        if budget_exhausted {
            break;
        }

        match expand_one(workspace_root, r, opts.default_lines).await {
            Ok(mut window) => {
                truncate_window(&mut window, opts.max_chars);

                if let Some(remaining) = remaining_global.as_mut() {
                    if window.text.len() > *remaining {
                        truncate_window(&mut window, *remaining);
                        *remaining = 0;
                        budget_exhausted = true;
                    } else {
                        *remaining -= window.text.len();
                    }
                }
                results.push(window);
            }
            Err(e) => errors.push(ExpandError {
                path: r.path.clone(),
                error: e.to_string(),
            }),
        }
    }

    let total_chars_used = opts
        .max_total_chars
        .map(|budget| budget.saturating_sub(remaining_global.unwrap_or(0)))
        .unwrap_or_else(|| results.iter().map(|w| w.text.len()).sum());

    ExpandOutcome {
        results,
        errors,
        budget: ExpandBudget {
            max_refs: opts.max_refs,
            default_lines: opts.default_lines,
            max_chars: opts.max_chars,
        },
        total_chars_used,
    }
}

async fn expand_one(
    workspace_root: &Path,
    r: &Ref,
    default_lines: usize,
) -> Result<ExpandedWindow, ExpandFailure> {
    validate_ref_path(&r.path)?;

    let full_path = workspace_root.join(&r.path);
    let bytes = tokio::fs::read(&full_path)
        .await
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ExpandFailure::NotFound(r.path.clone()),
            _ => ExpandFailure::Io(e.to_string()),
        })?;

    let text = String::from_utf8(bytes).map_err(|_| ExpandFailure::InvalidUtf8(r.path.clone()))?;
    let lines: Vec<&str> = text.lines().collect();
    let file_line_count = lines.len().max(1);

    let (from, span) = normalize(r, default_lines);
    let from = from.clamp(1, file_line_count);
    let span = span.clamp(MIN_LINES, MAX_LINES);

    let start_idx = from - 1;
    if start_idx >= lines.len() {
        return Err(ExpandFailure::OutOfRange(format!(
            "{}: line {} is beyond file end ({} lines)",
            r.path, from, lines.len()
        )));
    }
    let end_idx = (start_idx + span).min(lines.len());

    let window_text = lines[start_idx..end_idx].join("\n");

    Ok(ExpandedWindow {
        path: r.path.clone(),
        from,
        lines: end_idx - start_idx,
        text: window_text,
    })
}

fn normalize(r: &Ref, default_lines: usize) -> (usize, usize) {
    let from = r.start_line.max(1);
    let span = if r.is_well_formed() {
        r.end_line - r.start_line + 1
    } else {
        default_lines
    };
    (from, span)
}

/// Truncate `window.text` to at most `max_chars` characters, appending the
/// literal truncation marker when truncation occurred.
fn truncate_window(window: &mut ExpandedWindow, max_chars: usize) {
    if window.text.len() <= max_chars {
        return;
    }
    if max_chars < TRUNCATION_MARKER.len() {
        // Budget too small to fit the marker itself: clamp to a char
        // boundary at or under max_chars, no marker. `|w.text| <=
        // maxCharsPerRef` must hold unconditionally (§8).
        let mut end = max_chars;
        while end > 0 && !window.text.is_char_boundary(end) {
            end -= 1;
        }
        window.text.truncate(end);
        return;
    }
    let mut end = max_chars - TRUNCATION_MARKER.len();
    while end > 0 && !window.text.is_char_boundary(end) {
        end -= 1;
    }
    window.text.truncate(end);
    window.text.push_str(TRUNCATION_MARKER);
}

/// Session transcripts must be `sessions/<file>.jsonl` with `file`
/// containing no path separators or `..`. General memory-file paths must
/// stay within the workspace: no absolute paths, no `..` components.
fn validate_ref_path(path_str: &str) -> Result<(), ExpandFailure> {
    let path = Path::new(path_str);

    if path.is_absolute() {
        return Err(ExpandFailure::PathTraversal(path_str.to_string()));
    }
    if path
        .components()
        .any(|c| matches!(c, std::path::Component::ParentDir))
    {
        return Err(ExpandFailure::PathTraversal(path_str.to_string()));
    }

    if let Some(rest) = path_str.strip_prefix("sessions/") {
        if rest.contains('/') || rest.contains("..") {
            return Err(ExpandFailure::PathTraversal(path_str.to_string()));
        }
    }

    Ok(())
}

/// Convenience form used by the CLI's `--preview` flag: the last `n` lines
/// of a file, read backward in chunks rather than loaded whole.
pub async fn tail_preview(path: &Path, n: usize) -> std::io::Result<Vec<String>> {
    rlm_core::tail_lines(path, n).await
}
