// crates/rlm-server/src/routes/mod.rs
//! API route handlers for the rlm server.

pub mod health;
pub mod status;
pub mod tools;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Create the combined API router with all routes under the `/api` prefix.
///
/// Routes:
/// - GET /api/health - Health check
/// - GET /api/index/status - Index lifecycle status
/// - POST /api/tools/:op - Shared tool surface (memory_*/rlm_* operations)
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", health::router())
        .nest("/api", status::router())
        .nest("/api", tools::router())
        .with_state(state)
}
