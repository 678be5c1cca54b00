//! `GET /repos/{repo_id}/status`.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use uuid::Uuid;

use crate::core::app_state::AppState;
use crate::core::http::response_envelope::ApiResponse;
use crate::error_handler::AppResult;

pub async fn repo_status(
    State(state): State<Arc<AppState>>,
    Path(repo_id): Path<Uuid>,
) -> AppResult<axum::response::Response> {
    let status = state.graph.status(&repo_id.to_string()).await?;
    Ok(ApiResponse::success(status).into_response_with_status(StatusCode::OK))
}
