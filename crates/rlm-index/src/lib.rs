//! Hand-rolled JSON inverted index over session transcripts, and the
//! three-tier query pipeline that sits on top of it.
//!
//! The index itself is a small, fully-in-memory document
//! (`tokens`/`sessions`/`lastUpdated`/`schemaVersion`) persisted as one JSON
//! file via atomic rename. `rlm-maintainer` owns mutating it incrementally;
//! this crate owns its shape, persistence, and the read-side query pipeline.

pub mod error;
pub mod indexer;
pub mod query;
pub mod tokenize;
pub mod types;

pub use error::IndexError;
pub use types::{IndexDocument, SessionEntry, SCHEMA_VERSION};

use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// A loaded index plus the path it was loaded from (or `None` for an
/// in-memory-only index, used by tests and by the eval harness's isolated
/// runs).
#[derive(Debug)]
pub struct SearchIndex {
    pub doc: IndexDocument,
    path: Option<PathBuf>,
}

impl SearchIndex {
    /// Open the index file at `path`. A missing file yields a fresh empty
    /// index (the `absent` state — the caller is responsible for triggering
    /// a full build). A version mismatch wipes and starts fresh rather than
    /// attempting a partial migration.
    pub async fn open(path: &Path) -> Result<Self, IndexError> {
        if !path.exists() {
            info!(path = %path.display(), "no index file yet, starting empty");
            return Ok(Self {
                doc: IndexDocument::new(),
                path: Some(path.to_path_buf()),
            });
        }

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| IndexError::io(path, e))?;

        let doc: IndexDocument = match serde_json::from_slice(&bytes) {
            Ok(d) => d,
            Err(e) => {
                return Err(IndexError::Corruption {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })
            }
        };

        if doc.schema_version != SCHEMA_VERSION {
            warn!(
                found = doc.schema_version,
                expected = SCHEMA_VERSION,
                "index schema version mismatch, wiping and rebuilding"
            );
            return Ok(Self {
                doc: IndexDocument::new(),
                path: Some(path.to_path_buf()),
            });
        }

        Ok(Self {
            doc,
            path: Some(path.to_path_buf()),
        })
    }

    /// Like [`Self::open`], but a corrupt (unparseable) index file is logged
    /// and treated as absent rather than failing the caller — the engine
    /// proceeds via the fallback path and the caller is expected to trigger
    /// a rebuild (§7's corruption policy). IO errors still propagate: those
    /// aren't "corruption", they mean the path is unreachable.
    pub async fn open_recovering(path: &Path) -> Result<Self, IndexError> {
        match Self::open(path).await {
            Ok(index) => Ok(index),
            Err(IndexError::Corruption { path, reason }) => {
                warn!(path = %path.display(), reason, "index file corrupt, starting empty and scheduling a rebuild");
                Ok(Self {
                    doc: IndexDocument::new(),
                    path: Some(path),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// An index with no backing file — never persisted by [`Self::persist`].
    pub fn in_memory() -> Self {
        Self {
            doc: IndexDocument::new(),
            path: None,
        }
    }

    pub fn from_document(doc: IndexDocument) -> Self {
        Self { doc, path: None }
    }

    /// Serialise to a sibling temp file, fsync, then atomically rename over
    /// the index path. A no-op for an in-memory-only index.
    pub async fn persist(&self) -> Result<(), IndexError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| IndexError::io(parent, e))?;
        }

        let bytes = serde_json::to_vec_pretty(&self.doc).map_err(|e| IndexError::Corruption {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        let tmp_path = path.with_extension("json.tmp");
        let mut file = tokio::fs::File::create(&tmp_path)
            .await
            .map_err(|e| IndexError::io(&tmp_path, e))?;

        use tokio::io::AsyncWriteExt;
        file.write_all(&bytes)
            .await
            .map_err(|e| IndexError::io(&tmp_path, e))?;
        file.sync_all()
            .await
            .map_err(|e| IndexError::io(&tmp_path, e))?;
        drop(file);

        tokio::fs::rename(&tmp_path, path)
            .await
            .map_err(|e| IndexError::io(path, e))?;

        Ok(())
    }

    /// Whether this index has a backing file it will [`Self::persist`] to.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The `ready → stale` check from the lifecycle state machine: a session
    /// missing from `sessions`, or whose file mtime exceeds `lastUpdated` by
    /// more than `skew`, makes the index stale.
    pub fn is_stale(&self, known_sessions: &[(String, i64)], skew_secs: i64) -> bool {
        for (session_id, mtime) in known_sessions {
            match self.doc.sessions.get(session_id) {
                None => return true,
                Some(_) => {
                    if *mtime > self.doc.last_updated + skew_secs {
                        return true;
                    }
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_missing_file_yields_empty_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        let idx = SearchIndex::open(&path).await.unwrap();
        assert!(idx.doc.tokens.is_empty());
        assert_eq!(idx.doc.schema_version, SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn persist_then_open_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");

        let mut idx = SearchIndex::open(&path).await.unwrap();
        idx.doc.tokens.insert("cache".into(), vec!["s1".into()]);
        idx.doc.sessions.insert(
            "s1".into(),
            SessionEntry {
                last_indexed_line: 3,
                topics: vec!["cache".into()],
                date: Some("2026-01-01T00:00:00Z".into()),
                path: "sessions/s1.jsonl".into(),
            },
        );
        idx.doc.last_updated = 1000;
        idx.persist().await.unwrap();

        let reopened = SearchIndex::open(&path).await.unwrap();
        assert_eq!(
            reopened.doc.tokens.get("cache").unwrap(),
            &vec!["s1".to_string()]
        );
        assert_eq!(reopened.doc.last_updated, 1000);
    }

    #[tokio::test]
    async fn schema_mismatch_wipes_and_rebuilds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");

        let mut stale_doc = IndexDocument::new();
        stale_doc.schema_version = SCHEMA_VERSION + 99;
        stale_doc.tokens.insert("ghost".into(), vec!["x".into()]);
        tokio::fs::write(&path, serde_json::to_vec(&stale_doc).unwrap())
            .await
            .unwrap();

        let idx = SearchIndex::open(&path).await.unwrap();
        assert!(idx.doc.tokens.is_empty());
        assert_eq!(idx.doc.schema_version, SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn corrupt_json_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        tokio::fs::write(&path, b"not json at all").await.unwrap();

        let err = SearchIndex::open(&path).await.unwrap_err();
        assert!(matches!(err, IndexError::Corruption { .. }));
    }

    #[tokio::test]
    async fn open_recovering_falls_back_to_empty_on_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        tokio::fs::write(&path, b"not json at all").await.unwrap();

        let idx = SearchIndex::open_recovering(&path).await.unwrap();
        assert!(idx.doc.tokens.is_empty());
        assert_eq!(idx.doc.schema_version, SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn open_recovering_propagates_io_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing_parent/index.json");
        tokio::fs::write(dir.path().join("missing_parent"), b"not a directory").await.unwrap();

        let err = SearchIndex::open_recovering(&path).await.unwrap_err();
        assert!(matches!(err, IndexError::Io { .. }));
    }

    #[test]
    fn stale_when_session_missing() {
        let idx = SearchIndex::in_memory();
        assert!(idx.is_stale(&[("unknown".into(), 100)], 5));
    }

    #[test]
    fn stale_when_mtime_exceeds_skew() {
        let mut idx = SearchIndex::in_memory();
        idx.doc.sessions.insert(
            "s1".into(),
            SessionEntry {
                last_indexed_line: 1,
                topics: vec![],
                date: None,
                path: "sessions/s1.jsonl".into(),
            },
        );
        idx.doc.last_updated = 100;
        assert!(idx.is_stale(&[("s1".into(), 200)], 5));
        assert!(!idx.is_stale(&[("s1".into(), 102)], 5));
    }
}
