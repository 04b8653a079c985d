//! vocalstrip-server library
//!
//! HTTP service that turns an uploaded song into an instrumental, either
//! with a karaoke filter (fast path) or with demucs source separation.

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod pipeline;
pub mod services;

pub use config::{Args, ServiceConfig};
pub use error::{ApiError, PipelineError};
pub use orchestrator::Orchestrator;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub startup_time: Instant,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            startup_time: Instant::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let max_upload_bytes = state.orchestrator.config().max_upload_bytes;
    let out_dir = state.orchestrator.publisher().out_dir().to_path_buf();

    Router::new()
        .merge(api::health_routes())
        .merge(api::process_routes(max_upload_bytes))
        .merge(api::output_routes(&out_dir))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
