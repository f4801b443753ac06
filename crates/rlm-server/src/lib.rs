// crates/rlm-server/src/lib.rs
//! The rlm server library: Axum HTTP transport and MCP stdio transport,
//! both backed by one shared [`tools::ToolDispatcher`].

pub mod error;
pub mod indexing_state;
pub mod mcp;
pub mod routes;
pub mod state;
pub mod tools;
pub mod watch;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use indexing_state::{IndexingState, IndexingStatus};
pub use mcp::run_mcp;
pub use routes::api_routes;
pub use state::AppState;
pub use tools::ToolDispatcher;
pub use watch::start_watcher;

use std::sync::Arc;

use axum::http::HeaderValue;
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create a CORS layer that only allows localhost origins.
///
/// Prevents a malicious website from exfiltrating memory/session data via
/// `fetch()` to the local server port.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            |origin: &HeaderValue, _req_parts: &axum::http::request::Parts| {
                if let Ok(origin) = origin.to_str() {
                    origin.starts_with("http://localhost:")
                        || origin.starts_with("http://127.0.0.1:")
                        || origin == "http://localhost"
                        || origin == "http://127.0.0.1"
                } else {
                    false
                }
            },
        ))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Create the Axum application: API routes, CORS restricted to localhost,
/// compression, and request tracing.
pub fn create_app(state: Arc<AppState>) -> Router {
    api_routes(state)
        .layer(CompressionLayer::new())
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use rlm_maintainer::{IndexMaintainer, MaintainerSettings};
    use tower::ServiceExt;

    async fn test_state() -> (tempfile::TempDir, Arc<AppState>) {
        let dir = tempfile::tempdir().unwrap();
        let index_path = dir.path().join("index.json");
        let index = rlm_index::SearchIndex::open(&index_path).await.unwrap();
        let maintainer = IndexMaintainer::new(index_path, MaintainerSettings::default());
        let state = AppState::new(dir.path().to_path_buf(), rlm_core::Config::default(), index, maintainer);
        (dir, state)
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap()).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (_dir, state) = test_state().await;
        let app = create_app(state);
        let (status, body) = get(app, "/api/health").await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("\"status\":\"ok\""));
    }

    #[tokio::test]
    async fn test_cors_allows_localhost_origin() {
        let (_dir, state) = test_state().await;
        let app = create_app(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/health")
                    .header("Origin", "http://localhost:5173")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let headers = response.headers();
        assert_eq!(headers.get("access-control-allow-origin").unwrap(), "http://localhost:5173");
    }

    #[tokio::test]
    async fn test_cors_rejects_external_origin() {
        let (_dir, state) = test_state().await;
        let app = create_app(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/health")
                    .header("Origin", "https://evil.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(response.headers().get("access-control-allow-origin").is_none());
    }

    #[tokio::test]
    async fn test_404_for_unknown_route() {
        let (_dir, state) = test_state().await;
        let app = create_app(state);
        let (status, _body) = get(app, "/api/nonexistent").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_tools_route_is_mounted() {
        let (_dir, state) = test_state().await;
        let app = create_app(state);
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/tools/memory_search")
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::json!({"query": "anything"}).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
