//! Discovery of session transcripts and memory files within a workspace.
//!
//! A workspace is a directory tree containing a `sessions/` directory of
//! `<sessionId>.jsonl` transcripts and an arbitrary tree of prose memory
//! files. This module only lists what exists; parsing is `parser`'s job and
//! indexing is `rlm-index`'s job.

use crate::error::DiscoveryError;
use crate::types::SessionRecord;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;
use walkdir::WalkDir;

/// List every `<sessionId>.jsonl` transcript under `workspace_root/sessions`.
///
/// A missing `sessions/` directory is not an error — it yields an empty list,
/// the same way a fresh workspace has none yet.
pub async fn list_sessions(workspace_root: &Path) -> Result<Vec<SessionRecord>, DiscoveryError> {
    let sessions_dir = workspace_root.join("sessions");
    if !sessions_dir.exists() {
        debug!(path = %sessions_dir.display(), "sessions directory does not exist");
        return Ok(Vec::new());
    }

    let mut entries = match fs::read_dir(&sessions_dir).await {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(DiscoveryError::PermissionDenied { path: sessions_dir });
        }
        Err(e) => return Err(DiscoveryError::io(sessions_dir, e)),
    };

    let mut sessions = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| DiscoveryError::io(sessions_dir.clone(), e))?
    {
        let path = entry.path();
        if path.extension().map(|e| e != "jsonl").unwrap_or(true) {
            continue;
        }

        let session_id = match path.file_stem().map(|s| s.to_string_lossy().to_string()) {
            Some(id) => id,
            None => continue,
        };

        let metadata = match fs::metadata(&path).await {
            Ok(m) => m,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "skipping unreadable session");
                continue;
            }
        };

        let modified_at = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        let line_count = count_lines(&path).await.unwrap_or(0);

        sessions.push(SessionRecord {
            session_id,
            path: path.to_string_lossy().to_string(),
            modified_at,
            line_count,
            date: None,
        });
    }

    sessions.sort_by(|a, b| b.modified_at.cmp(&a.modified_at));
    Ok(sessions)
}

async fn count_lines(path: &Path) -> std::io::Result<usize> {
    use tokio::io::{AsyncBufReadExt, BufReader};
    let file = fs::File::open(path).await?;
    let mut lines = BufReader::new(file).lines();
    let mut count = 0usize;
    while lines.next_line().await?.is_some() {
        count += 1;
    }
    Ok(count)
}

/// List every memory file under `workspace_root`, excluding the `sessions/`
/// subtree (which holds transcripts, not prose memory).
pub fn list_memory_files(workspace_root: &Path) -> Vec<PathBuf> {
    let sessions_dir = workspace_root.join("sessions");
    WalkDir::new(workspace_root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| !path.starts_with(&sessions_dir))
        .collect()
}

/// Truncate a string to a maximum length at a word boundary where possible,
/// appending an ellipsis. Operates on characters, never splits a UTF-8
/// sequence.
pub fn truncate_preview(text: &str, max_len: usize) -> String {
    let trimmed = text.trim();
    let char_count = trimmed.chars().count();
    if char_count <= max_len {
        return trimmed.to_string();
    }

    let truncated: String = trimmed.chars().take(max_len).collect();
    if let Some(last_space_byte_idx) = truncated.rfind(' ') {
        let char_idx_at_space = truncated[..last_space_byte_idx].chars().count();
        if char_idx_at_space > max_len / 2 {
            let up_to_space: String = truncated.chars().take(char_idx_at_space).collect();
            return format!("{}...", up_to_space.trim_end());
        }
    }

    format!("{}...", truncated.trim_end())
}
