// crates/rlm-server/src/routes/tools.rs
//! `POST /api/tools/:op` — the HTTP transport for the same seven tool-surface
//! operations the stdio MCP loop exposes, dispatched through one shared
//! [`ToolDispatcher`] per request so behaviour cannot drift between
//! transports.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use serde_json::Value;

use crate::error::ApiResult;
use crate::state::AppState;
use crate::tools::ToolDispatcher;

async fn call_tool(
    State(state): State<Arc<AppState>>,
    Path(op): Path<String>,
    Json(params): Json<Value>,
) -> ApiResult<Json<Value>> {
    let dispatcher = ToolDispatcher::new(state);
    let result = dispatcher.dispatch(&op, params).await?;
    Ok(Json(result))
}

/// Create the tools routes router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/tools/:op", post(call_tool))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use rlm_index::indexer::apply_messages;
    use rlm_index::types::IndexDocument;
    use rlm_core::types::{Role, TranscriptMessage};
    use rlm_maintainer::{IndexMaintainer, MaintainerSettings};
    use tower::ServiceExt;

    async fn test_app() -> (tempfile::TempDir, Router) {
        let dir = tempfile::tempdir().unwrap();
        let mut doc = IndexDocument::new();
        apply_messages(
            &mut doc,
            "s1",
            "sessions/s1.jsonl",
            None,
            &[TranscriptMessage { role: Role::User, text: "cache invalidation bug".into(), timestamp: None, line_number: 1 }],
        );
        let index_path = dir.path().join("index.json");
        let mut index = rlm_index::SearchIndex::open(&index_path).await.unwrap();
        index.doc = doc;
        let maintainer = IndexMaintainer::new(index_path, MaintainerSettings::default());
        let state = AppState::new(dir.path().to_path_buf(), rlm_core::Config::default(), index, maintainer);

        let app = Router::new().nest("/api", router()).with_state(state);
        (dir, app)
    }

    #[tokio::test]
    async fn memory_search_via_http_route() {
        let (_dir, app) = test_app().await;
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/tools/memory_search")
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::json!({"query": "cache invalidation"}).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_op_returns_400() {
        let (_dir, app) = test_app().await;
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/tools/not_a_tool")
                    .header("content-type", "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
