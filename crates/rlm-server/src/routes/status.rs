// crates/rlm-server/src/routes/status.rs
//! Status endpoint reporting the index lifecycle state (absent/building/
//! ready/stale/rebuilding) and progress counters.

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::indexing_state::IndexingStatus;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: &'static str,
    pub sessions_total: usize,
    pub sessions_indexed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn status_label(status: IndexingStatus) -> &'static str {
    match status {
        IndexingStatus::Absent => "absent",
        IndexingStatus::Building => "building",
        IndexingStatus::Ready => "ready",
        IndexingStatus::Stale => "stale",
        IndexingStatus::Rebuilding => "rebuilding",
    }
}

/// GET /api/index/status - Get the index lifecycle status and progress counters.
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: status_label(state.indexing.status()),
        sessions_total: state.indexing.sessions_total(),
        sessions_indexed: state.indexing.sessions_indexed(),
        error: state.indexing.error(),
    })
}

/// Create the status routes router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/index/status", get(get_status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexing_state::IndexingState;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use rlm_maintainer::{IndexMaintainer, MaintainerSettings};
    use tower::ServiceExt;

    async fn test_app() -> (tempfile::TempDir, axum::Router) {
        let dir = tempfile::tempdir().unwrap();
        let index_path = dir.path().join("index.json");
        let index = rlm_index::SearchIndex::open(&index_path).await.unwrap();
        let maintainer = IndexMaintainer::new(index_path, MaintainerSettings::default());
        let indexing = Arc::new(IndexingState::new());
        indexing.set_sessions_total(10);
        indexing.increment_indexed();
        let state = AppState::new_with_indexing(
            dir.path().to_path_buf(),
            rlm_core::Config::default(),
            index,
            maintainer,
            indexing,
        );
        let app = Router::new().nest("/api", router()).with_state(state);
        (dir, app)
    }

    async fn do_get(app: axum::Router, uri: &str) -> (StatusCode, String) {
        let response = app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap()).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn status_reports_absent_and_counters() {
        let (_dir, app) = test_app().await;
        let (status, body) = do_get(app, "/api/index/status").await;

        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "absent");
        assert_eq!(json["sessionsTotal"], 10);
        assert_eq!(json["sessionsIndexed"], 1);
        assert!(json["error"].is_null());
    }
}
