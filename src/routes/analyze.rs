//! `/analyze` endpoint: maps an HTTP request onto an [`Envelope`].
//!
//! The response body is always the JSON message envelope. Rejections use
//! status 200 like successes; only internal failures use 500.

use std::collections::HashMap;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use tracing::debug;

use super::AppState;
use crate::handler::Envelope;

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/analyze", get(handler).post(handler))
}

async fn handler(
    State((analyzer, _)): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> impl IntoResponse {
    // ---
    debug!("/analyze - {} byte body", body.len());

    let envelope = Envelope {
        headers: headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect(),
        query,
        body: (!body.is_empty()).then(|| String::from_utf8_lossy(&body).into_owned()),
    };

    let (response, internal) = analyzer.handle(&envelope).await;
    let status = if internal {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    };

    (status, Json(response))
}
