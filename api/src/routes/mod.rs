pub mod health;
pub mod ingest;
pub mod jobs;
pub mod query;
pub mod repos;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::core::app_state::AppState;
use crate::middleware_layer::request_id::attach_request_id;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ingest/zip", post(ingest::ingest_zip))
        .route("/ingest/kg/zip", post(ingest::ingest_kg_zip))
        .route("/jobs/{job_id}", get(jobs::get_job))
        .route("/jobs", get(jobs::list_jobs))
        .route("/query", post(query::query))
        .route("/repos/{repo_id}/status", get(repos::repo_status))
        .route("/health", get(health::health))
        .layer(axum::middleware::from_fn(attach_request_id))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
