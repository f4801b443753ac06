//! Atomic index lifecycle state for lock-free progress tracking.
//!
//! [`IndexingState`] mirrors the `absent -> building -> ready -> stale ->
//! rebuilding -> ready` state machine using atomics, so the background
//! maintainer can update progress while the health/status route reads it
//! without lock contention.

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::RwLock;

/// Which lifecycle phase the index is currently in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IndexingStatus {
    /// No index file exists yet; a full build has not started.
    Absent = 0,
    /// A full build is in progress.
    Building = 1,
    /// The index is current and serving queries.
    Ready = 2,
    /// A session has changed since the index was last updated.
    Stale = 3,
    /// An incremental or full rebuild is in progress.
    Rebuilding = 4,
}

impl IndexingStatus {
    /// Convert a raw `u8` into a status variant.
    /// Returns `None` for values outside the valid range.
    fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Absent),
            1 => Some(Self::Building),
            2 => Some(Self::Ready),
            3 => Some(Self::Stale),
            4 => Some(Self::Rebuilding),
            _ => None,
        }
    }
}

/// Thread-safe, lock-free progress state for the background index
/// maintainer. All numeric counters use [`Ordering::Relaxed`] — we only need
/// monotonically-increasing values visible *eventually* to readers, not
/// cross-field consistency.
pub struct IndexingState {
    status: AtomicU8,
    sessions_total: AtomicUsize,
    sessions_indexed: AtomicUsize,
    error: RwLock<Option<String>>,
}

impl IndexingState {
    /// Create a new state initialised to [`IndexingStatus::Absent`] with all
    /// counters at zero.
    pub fn new() -> Self {
        Self {
            status: AtomicU8::new(IndexingStatus::Absent as u8),
            sessions_total: AtomicUsize::new(0),
            sessions_indexed: AtomicUsize::new(0),
            error: RwLock::new(None),
        }
    }

    /// Current lifecycle status.
    pub fn status(&self) -> IndexingStatus {
        let raw = self.status.load(Ordering::Relaxed);
        IndexingStatus::from_u8(raw).unwrap_or(IndexingStatus::Absent)
    }

    pub fn set_status(&self, status: IndexingStatus) {
        self.status.store(status as u8, Ordering::Relaxed);
    }

    pub fn sessions_total(&self) -> usize {
        self.sessions_total.load(Ordering::Relaxed)
    }

    pub fn set_sessions_total(&self, val: usize) {
        self.sessions_total.store(val, Ordering::Relaxed);
    }

    pub fn sessions_indexed(&self) -> usize {
        self.sessions_indexed.load(Ordering::Relaxed)
    }

    /// Increment the indexed-sessions counter by one and return the **new**
    /// value.
    pub fn increment_indexed(&self) -> usize {
        self.sessions_indexed.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Record a corruption/rebuild error without leaving `Error` as a
    /// sticky lifecycle state — the engine falls back to full-scan and
    /// schedules a rebuild (§7's Corruption policy), so the status itself
    /// stays one of the five lifecycle phases.
    pub fn set_error(&self, msg: String) {
        if let Ok(mut guard) = self.error.write() {
            *guard = Some(msg);
        }
    }

    pub fn error(&self) -> Option<String> {
        self.error.read().ok().and_then(|g| g.clone())
    }

    pub fn clear_error(&self) {
        if let Ok(mut guard) = self.error.write() {
            *guard = None;
        }
    }
}

impl Default for IndexingState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn initial_state_is_absent_with_zeroes() {
        let state = IndexingState::new();
        assert_eq!(state.status(), IndexingStatus::Absent);
        assert_eq!(state.sessions_total(), 0);
        assert_eq!(state.sessions_indexed(), 0);
        assert!(state.error().is_none());
    }

    #[test]
    fn status_transitions_follow_lifecycle() {
        let state = IndexingState::new();

        state.set_status(IndexingStatus::Building);
        assert_eq!(state.status(), IndexingStatus::Building);

        state.set_status(IndexingStatus::Ready);
        assert_eq!(state.status(), IndexingStatus::Ready);

        state.set_status(IndexingStatus::Stale);
        assert_eq!(state.status(), IndexingStatus::Stale);

        state.set_status(IndexingStatus::Rebuilding);
        assert_eq!(state.status(), IndexingStatus::Rebuilding);

        state.set_status(IndexingStatus::Ready);
        assert_eq!(state.status(), IndexingStatus::Ready);
    }

    #[test]
    fn counter_increments() {
        let state = IndexingState::new();

        state.set_sessions_total(100);
        assert_eq!(state.sessions_total(), 100);

        assert_eq!(state.increment_indexed(), 1);
        assert_eq!(state.increment_indexed(), 2);
        assert_eq!(state.sessions_indexed(), 2);
    }

    #[test]
    fn error_can_be_set_and_cleared_independent_of_status() {
        let state = IndexingState::new();
        state.set_status(IndexingStatus::Ready);

        state.set_error("corrupt index, falling back to full scan".to_string());
        assert_eq!(state.status(), IndexingStatus::Ready);
        assert!(state.error().is_some());

        state.clear_error();
        assert!(state.error().is_none());
    }

    #[test]
    fn thread_safety_concurrent_access() {
        let state = Arc::new(IndexingState::new());
        state.set_sessions_total(1000);
        state.set_status(IndexingStatus::Building);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let s = Arc::clone(&state);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        s.increment_indexed();
                        let _ = s.status();
                        let _ = s.sessions_total();
                        let _ = s.sessions_indexed();
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().expect("thread panicked");
        }

        assert_eq!(state.sessions_indexed(), 800);
        assert_eq!(state.sessions_total(), 1000);
        assert_eq!(state.status(), IndexingStatus::Building);
    }

    #[test]
    fn from_u8_invalid_returns_none() {
        assert!(IndexingStatus::from_u8(5).is_none());
        assert!(IndexingStatus::from_u8(255).is_none());
    }

    #[test]
    fn default_impl() {
        let state = IndexingState::default();
        assert_eq!(state.status(), IndexingStatus::Absent);
    }
}
