//! The Index Maintainer: applies incremental transcript updates to the
//! inverted index under an exclusive file lock, and schedules those updates
//! per the debounce/cooldown/bounded-queue protocol external
//! `session:transcript:update` events are subject to.

pub mod error;

pub use error::MaintainerError;

use fs2::FileExt;
use rlm_core::parser::parse_session_from;
use rlm_index::indexer::apply_messages;
use rlm_index::SearchIndex;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// `D`, `C`, `Nq`, and the lock-acquisition timeout.
#[derive(Debug, Clone)]
pub struct MaintainerSettings {
    pub debounce: Duration,
    pub cooldown: Duration,
    pub lock_timeout: Duration,
    pub queue_capacity: usize,
}

impl Default for MaintainerSettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(5),
            cooldown: Duration::from_secs(30),
            lock_timeout: Duration::from_secs(30),
            queue_capacity: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateResult {
    pub messages_added: usize,
    pub time_ms: f64,
}

struct PendingUpdate {
    task: JoinHandle<()>,
}

#[derive(Default)]
struct SchedulerState {
    pending: HashMap<String, PendingUpdate>,
    last_run: HashMap<String, Instant>,
    queue_order: VecDeque<String>,
}

/// Owns the index file path and the per-session debounce/cooldown/queue
/// state. Cheaply clonable (an `Arc` inside); scheduled updates hold their
/// own clone so they can call back into [`Self::update_index`].
pub struct IndexMaintainer {
    index_path: PathBuf,
    settings: MaintainerSettings,
    state: Mutex<SchedulerState>,
}

impl IndexMaintainer {
    /// The index file path this maintainer writes updates to.
    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    pub fn new(index_path: PathBuf, settings: MaintainerSettings) -> Arc<Self> {
        Arc::new(Self {
            index_path,
            settings,
            state: Mutex::new(SchedulerState::default()),
        })
    }

    /// Handle a `session:transcript:update` event: debounce per session id,
    /// respect the cooldown since the last successful run, and enforce the
    /// bounded pending-update queue (dropping the oldest pending entry on
    /// overflow).
    pub async fn notify_update(
        self: &Arc<Self>,
        session_id: impl Into<String>,
        session_path: impl Into<PathBuf>,
    ) {
        let session_id = session_id.into();
        let session_path = session_path.into();

        let mut state = self.state.lock().await;

        let last_run = state.last_run.get(&session_id).copied();
        let mut fire_at = Instant::now() + self.settings.debounce;
        if let Some(last_run) = last_run {
            let earliest_allowed = last_run + self.settings.cooldown;
            if fire_at < earliest_allowed {
                fire_at = earliest_allowed;
            }
        }

        if let Some(existing) = state.pending.remove(&session_id) {
            // Coalesce: cancel the previous timer, schedule a fresh one.
            existing.task.abort();
        } else if state.queue_order.len() >= self.settings.queue_capacity {
            if let Some(oldest) = state.queue_order.pop_front() {
                if let Some(p) = state.pending.remove(&oldest) {
                    p.task.abort();
                    debug!(session_id = %oldest, "dropped oldest pending update, queue full");
                }
            }
        }
        state.queue_order.push_back(session_id.clone());

        let this = Arc::clone(self);
        let sid = session_id.clone();
        let spath = session_path.clone();
        let delay = fire_at.saturating_duration_since(Instant::now());

        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = this.fire(&sid, &spath).await {
                warn!(session_id = %sid, error = %e, "scheduled index update failed");
            }
        });

        state.pending.insert(session_id, PendingUpdate { task });
    }

    async fn fire(self: &Arc<Self>, session_id: &str, session_path: &Path) -> Result<UpdateResult, MaintainerError> {
        {
            let mut state = self.state.lock().await;
            state.pending.remove(session_id);
            state.queue_order.retain(|s| s != session_id);
        }

        let result = self.update_index(session_id, session_path).await?;

        let mut state = self.state.lock().await;
        state.last_run.insert(session_id.to_string(), Instant::now());
        Ok(result)
    }

    /// The update protocol itself, directly callable (e.g. by a CLI rebuild
    /// command) without going through debounce scheduling.
    pub async fn update_index(
        &self,
        session_id: &str,
        session_path: &Path,
    ) -> Result<UpdateResult, MaintainerError> {
        let start = Instant::now();

        let lock_path = self.index_path.with_extension("lock");
        if let Some(parent) = lock_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| MaintainerError::Io { path: parent.to_path_buf(), source: e })?;
        }
        let _lock = acquire_lock(&lock_path, self.settings.lock_timeout).await?;

        let mut index = SearchIndex::open(&self.index_path).await?;

        let from_line = index
            .doc
            .sessions
            .get(session_id)
            .map(|e| e.last_indexed_line)
            .unwrap_or(0);

        let new_messages = parse_session_from(session_path, from_line + 1).await?;

        let session_rel_path = session_path.to_string_lossy().to_string();
        let added = apply_messages(&mut index.doc, session_id, &session_rel_path, None, &new_messages);

        index.doc.last_updated = chrono::Utc::now().timestamp();
        index.persist().await?;

        Ok(UpdateResult {
            messages_added: added,
            time_ms: start.elapsed().as_secs_f64() * 1000.0,
        })
    }
}

/// Block (off the async runtime) on an advisory exclusive lock, bounded by
/// `timeout`. The lock is released when the returned `File` drops.
async fn acquire_lock(path: &Path, timeout: Duration) -> Result<std::fs::File, MaintainerError> {
    let path_for_io = path.to_path_buf();
    let path_for_lock = path.to_path_buf();

    let handle = tokio::task::spawn_blocking(move || -> std::io::Result<std::fs::File> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .open(&path_for_lock)?;
        FileExt::lock_exclusive(&file)?;
        Ok(file)
    });

    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(Ok(file))) => Ok(file),
        Ok(Ok(Err(source))) => Err(MaintainerError::Io { path: path_for_io, source }),
        Ok(Err(join_err)) => Err(MaintainerError::Join(join_err)),
        Err(_) => Err(MaintainerError::LockTimeout {
            path: path_for_io,
            timeout_secs: timeout.as_secs(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn write_session(path: &Path, lines: &[&str]) {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.unwrap();
        }
        let mut content = String::new();
        for line in lines {
            content.push_str(&format!(r#"{{"type":"user","message":{{"content":"{}"}}}}"#, line));
            content.push('\n');
        }
        tokio::fs::write(path, content).await.unwrap();
    }

    #[tokio::test]
    async fn update_index_indexes_new_messages() {
        let dir = tempfile::tempdir().unwrap();
        let session_path = dir.path().join("sessions/s1.jsonl");
        write_session(&session_path, &["hello world", "cache invalidation bug"]).await;

        let maintainer = IndexMaintainer::new(dir.path().join("index.json"), MaintainerSettings::default());
        let result = maintainer.update_index("s1", &session_path).await.unwrap();
        assert_eq!(result.messages_added, 2);

        let idx = SearchIndex::open(&dir.path().join("index.json")).await.unwrap();
        assert_eq!(idx.doc.sessions["s1"].last_indexed_line, 2);
    }

    #[tokio::test]
    async fn update_index_resumes_from_last_indexed_line() {
        let dir = tempfile::tempdir().unwrap();
        let session_path = dir.path().join("sessions/s1.jsonl");
        write_session(&session_path, &["one", "two"]).await;

        let maintainer = IndexMaintainer::new(dir.path().join("index.json"), MaintainerSettings::default());
        maintainer.update_index("s1", &session_path).await.unwrap();

        write_session(&session_path, &["one", "two", "three"]).await;
        let result = maintainer.update_index("s1", &session_path).await.unwrap();
        assert_eq!(result.messages_added, 1);
    }

    #[tokio::test]
    async fn no_message_is_indexed_twice() {
        let dir = tempfile::tempdir().unwrap();
        let session_path = dir.path().join("sessions/s1.jsonl");
        write_session(&session_path, &["alpha beta gamma"]).await;

        let maintainer = IndexMaintainer::new(dir.path().join("index.json"), MaintainerSettings::default());
        maintainer.update_index("s1", &session_path).await.unwrap();
        let second = maintainer.update_index("s1", &session_path).await.unwrap();
        assert_eq!(second.messages_added, 0);
    }

    #[tokio::test]
    async fn notify_update_schedules_and_eventually_indexes() {
        let dir = tempfile::tempdir().unwrap();
        let session_path = dir.path().join("sessions/s1.jsonl");
        write_session(&session_path, &["debounced update content"]).await;

        let settings = MaintainerSettings {
            debounce: Duration::from_millis(20),
            cooldown: Duration::from_millis(0),
            lock_timeout: Duration::from_secs(5),
            queue_capacity: 100,
        };
        let maintainer = IndexMaintainer::new(dir.path().join("index.json"), settings);
        maintainer.notify_update("s1", session_path.clone()).await;

        tokio::time::sleep(Duration::from_millis(100)).await;

        let idx = SearchIndex::open(&dir.path().join("index.json")).await.unwrap();
        assert!(idx.doc.sessions.contains_key("s1"));
    }

    #[tokio::test]
    async fn rapid_events_coalesce_into_one_run() {
        let dir = tempfile::tempdir().unwrap();
        let session_path = dir.path().join("sessions/s1.jsonl");
        write_session(&session_path, &["first version"]).await;

        let settings = MaintainerSettings {
            debounce: Duration::from_millis(50),
            cooldown: Duration::from_millis(0),
            lock_timeout: Duration::from_secs(5),
            queue_capacity: 100,
        };
        let maintainer = IndexMaintainer::new(dir.path().join("index.json"), settings);

        maintainer.notify_update("s1", session_path.clone()).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        maintainer.notify_update("s1", session_path.clone()).await;

        tokio::time::sleep(Duration::from_millis(150)).await;

        let idx = SearchIndex::open(&dir.path().join("index.json")).await.unwrap();
        assert_eq!(idx.doc.sessions["s1"].last_indexed_line, 1);
    }
}
