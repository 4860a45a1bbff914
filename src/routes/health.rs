// src/routes/health.rs
//! Health check endpoint for the plantflow service.
//!
//! Used by container orchestrators and CI pipelines to verify that the
//! service is running. It is a sibling module in the `routes` directory:
//! the gateway (`mod.rs`) merges this subrouter into the top-level router.

use axum::{routing::get, Json, Router};
use serde::Serialize;

/// JSON response body for the `/health` endpoint.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Handle `GET /health`.
///
/// Does not touch the artifact store or the secret store.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Create a subrouter containing the `/health` route.
///
/// Generic over the application state so it merges cleanly with the
/// gateway router.
pub fn router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route("/health", get(health))
}
