use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use serde::Serialize;

use crate::core::app_state::AppState;
use crate::core::http::response_envelope::ApiResponse;

#[derive(Debug, Serialize)]
pub struct HealthBody {
    pub ok: bool,
}

pub async fn health(State(_state): State<Arc<AppState>>) -> axum::response::Response {
    ApiResponse::success(HealthBody { ok: true }).into_response_with_status(StatusCode::OK)
}
