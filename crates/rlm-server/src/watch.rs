// crates/rlm-server/src/watch.rs
//! Self-watch the sessions directory for transcript changes when the server
//! is not embedded in a host that already delivers
//! `session:transcript:update` events itself. Raw filesystem events are
//! forwarded straight to [`rlm_maintainer::IndexMaintainer::notify_update`],
//! which owns all debounce/cooldown/queue decisions — the watcher's only
//! job is synthesizing the event, not debouncing it a second time.

use crate::indexing_state::IndexingStatus;
use crate::state::AppState;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::PathBuf;
use std::sync::{mpsc, Arc};
use std::time::Duration;

/// Start watching `state.workspace_root/sessions` for `.jsonl` changes.
/// Returns the watcher handle — dropping it stops watching, so the caller
/// must keep it alive for the server's lifetime. `None` if the watcher
/// could not be created (non-fatal: the server still serves queries against
/// whatever index already exists).
pub fn start_watcher(state: Arc<AppState>) -> Option<RecommendedWatcher> {
    let sessions_dir = state.workspace_root.join("sessions");
    let (tx, rx) = mpsc::channel::<Event>();

    let mut watcher = match RecommendedWatcher::new(
        move |res: Result<Event, notify::Error>| {
            if let Ok(event) = res {
                let _ = tx.send(event);
            }
        },
        notify::Config::default(),
    ) {
        Ok(w) => w,
        Err(e) => {
            tracing::warn!(error = %e, "failed to create session file watcher");
            return None;
        }
    };

    if let Err(e) = watcher.watch(&sessions_dir, RecursiveMode::NonRecursive) {
        tracing::debug!(path = %sessions_dir.display(), error = %e, "not watching sessions directory");
        return None;
    }
    tracing::info!(path = %sessions_dir.display(), "watching sessions directory");

    tokio::spawn(forward_events(rx, state));
    Some(watcher)
}

async fn forward_events(rx: mpsc::Receiver<Event>, state: Arc<AppState>) {
    loop {
        let event = match rx.recv_timeout(Duration::from_millis(250)) {
            Ok(event) => event,
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        };

        if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
            continue;
        }

        for path in event.paths {
            if path.extension().map(|e| e != "jsonl").unwrap_or(true) {
                continue;
            }
            let Some(session_id) = path.file_stem().map(|s| s.to_string_lossy().to_string()) else {
                continue;
            };

            if state.indexing.status() == IndexingStatus::Ready {
                state.indexing.set_status(IndexingStatus::Stale);
            }
            state.maintainer.notify_update(session_id, path).await;
            schedule_reconcile(Arc::clone(&state));
        }
    }
}

/// After the maintainer's debounce+cooldown window has certainly elapsed,
/// reopen the index it persisted and flip the status back to `Ready` — the
/// self-watch equivalent of a host re-querying status once its own
/// `session:transcript:update` consumer reports completion.
fn schedule_reconcile(state: Arc<AppState>) {
    let delay = Duration::from_secs(state.config.maintainer.debounce_secs + state.config.maintainer.cooldown_secs + 1);
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        match rlm_index::SearchIndex::open_recovering(state.maintainer.index_path()).await {
            Ok(fresh) => {
                *state.index.write().await = fresh;
                state.indexing.set_status(IndexingStatus::Ready);
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to reopen index after self-watch update");
                state.indexing.set_error(e.to_string());
            }
        }
    });
}
