// crates/rlm-server/src/state.rs
//! Application state for the Axum server.

use crate::indexing_state::IndexingState;
use rlm_core::Config;
use rlm_index::SearchIndex;
use rlm_maintainer::IndexMaintainer;
use rlm_orchestrator::semantic::DisabledSearcher;
use rlm_orchestrator::Orchestrator;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

/// Shared application state accessible from every route handler and from
/// the `ToolDispatcher`.
pub struct AppState {
    /// Server start time for uptime tracking.
    pub start_time: Instant,
    /// Root directory memory files and session transcripts are resolved
    /// relative to.
    pub workspace_root: PathBuf,
    /// Loaded configuration (budgets, defaults, ports).
    pub config: Config,
    /// The in-memory inverted index, behind a lock so the background
    /// maintainer can swap it in after a rebuild while requests are served.
    pub index: RwLock<SearchIndex>,
    /// Owns the index file path and the per-session debounce/cooldown
    /// scheduling state.
    pub maintainer: Arc<IndexMaintainer>,
    /// Refs-first/recursive search orchestrator. No semantic searcher is
    /// wired in by default.
    pub orchestrator: Orchestrator<DisabledSearcher>,
    /// Index lifecycle progress state (lock-free atomics).
    pub indexing: Arc<IndexingState>,
}

impl AppState {
    /// Assemble application state from already-opened components. The
    /// caller is responsible for `SearchIndex::open` and constructing the
    /// `IndexMaintainer` — both require the index path and are async/fallible
    /// in ways that don't belong in a state constructor.
    pub fn new(
        workspace_root: PathBuf,
        config: Config,
        index: SearchIndex,
        maintainer: Arc<IndexMaintainer>,
    ) -> Arc<Self> {
        Self::new_with_indexing(workspace_root, config, index, maintainer, Arc::new(IndexingState::new()))
    }

    /// Create with an externally-provided `IndexingState` (for testing and
    /// for server startup where the caller owns the indexing handle before
    /// background indexing begins).
    pub fn new_with_indexing(
        workspace_root: PathBuf,
        config: Config,
        index: SearchIndex,
        maintainer: Arc<IndexMaintainer>,
        indexing: Arc<IndexingState>,
    ) -> Arc<Self> {
        let orchestrator = Orchestrator::new(workspace_root.clone());
        Arc::new(Self {
            start_time: Instant::now(),
            workspace_root,
            config,
            index: RwLock::new(index),
            maintainer,
            orchestrator,
            indexing,
        })
    }

    /// Get the server uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rlm_maintainer::MaintainerSettings;
    use std::thread::sleep;
    use std::time::Duration;

    async fn test_state() -> Arc<AppState> {
        let dir = tempfile::tempdir().unwrap();
        let index_path = dir.path().join("index.json");
        let index = SearchIndex::open(&index_path).await.unwrap();
        let maintainer = IndexMaintainer::new(index_path, MaintainerSettings::default());
        AppState::new(dir.path().to_path_buf(), Config::default(), index, maintainer)
    }

    #[tokio::test]
    async fn app_state_new_starts_at_zero_uptime() {
        let state = test_state().await;
        assert!(state.uptime_secs() < 1);
    }

    #[tokio::test]
    async fn app_state_uptime_advances() {
        let state = test_state().await;
        sleep(Duration::from_millis(100));
        let uptime = state.uptime_secs();
        assert!(uptime < 5);
    }

    #[tokio::test]
    async fn app_state_starts_with_absent_index() {
        use crate::indexing_state::IndexingStatus;
        let state = test_state().await;
        assert_eq!(state.indexing.status(), IndexingStatus::Absent);
    }
}
