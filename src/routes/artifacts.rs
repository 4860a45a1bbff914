//! `/artifacts/{*key}` endpoint serving stored charts behind signed links.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use tracing::{error, warn};

use super::AppState;

// ---

/// Query string carried by every artifact link.
#[derive(Debug, Deserialize)]
struct LinkQuery {
    expires: i64,
    signature: String,
}

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/artifacts/{*key}", get(handler))
}

async fn handler(
    State((_, store)): State<AppState>,
    Path(key): Path<String>,
    Query(link): Query<LinkQuery>,
) -> Response {
    // ---
    if !store.verify(&key, link.expires, &link.signature) {
        warn!("Rejected artifact link for {}", key);
        return StatusCode::FORBIDDEN.into_response();
    }

    match store.read(&key).await {
        Ok(Some(bytes)) => ([(header::CONTENT_TYPE, "image/png")], bytes).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            error!("Failed to serve artifact {}: {:#}", key, e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
