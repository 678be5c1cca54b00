//! `GET /jobs/{job_id}` and `GET /jobs?repo_id=…`.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::Deserialize;
use uuid::Uuid;

use crate::core::app_state::AppState;
use crate::core::http::response_envelope::ApiResponse;
use crate::error_handler::AppResult;

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub repo_id: Uuid,
}

pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<Uuid>,
) -> AppResult<axum::response::Response> {
    let job = state.jobs.get_job(job_id).await?;
    Ok(ApiResponse::success(job).into_response_with_status(StatusCode::OK))
}

pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ListJobsQuery>,
) -> AppResult<axum::response::Response> {
    let jobs = state.jobs.list_jobs(q.repo_id).await?;
    Ok(ApiResponse::success(jobs).into_response_with_status(StatusCode::OK))
}
