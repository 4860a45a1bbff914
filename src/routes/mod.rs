//! HTTP transport for the analysis service.
//!
//! Each sibling module exports a subrouter; this gateway merges them and
//! attaches the shared state so `main.rs` does not need to know about
//! individual endpoints.

use std::sync::Arc;

use axum::Router;

use crate::artifacts::FsArtifactStore;
use crate::handler::Analyzer;

mod analyze;
mod artifacts;
mod health;

/// Shared state handed to every route.
pub type AppState = (Arc<Analyzer>, Arc<FsArtifactStore>);

// ---

pub fn router(analyzer: Arc<Analyzer>, store: Arc<FsArtifactStore>) -> Router {
    // ---
    Router::new()
        .merge(analyze::router())
        .merge(artifacts::router())
        .merge(health::router())
        .with_state((analyzer, store))
}
