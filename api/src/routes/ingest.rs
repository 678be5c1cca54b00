//! `POST /ingest/zip` and `POST /ingest/kg/zip` — accept a multipart zip
//! upload, create a queued job, and dispatch it for background execution.

use std::sync::Arc;

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use serde::Serialize;
use uuid::Uuid;

use crate::core::app_state::AppState;
use crate::core::http::response_envelope::ApiResponse;
use crate::error_handler::{AppError, AppResult};

#[derive(Debug, Serialize)]
pub struct IngestAccepted {
    pub job_id: Uuid,
    pub repo_id: Uuid,
}

async fn save_upload(state: &AppState, repo_id: Uuid, mut multipart: Multipart) -> AppResult<()> {
    let zip_path = state.paths.zip_path(repo_id);
    if let Some(parent) = zip_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| AppError::BadRequest(format!("could not prepare upload directory: {e}")))?;
    }

    let mut wrote_field = false;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let bytes = field.bytes().await?;
        tokio::fs::write(&zip_path, &bytes)
            .await
            .map_err(|e| AppError::BadRequest(format!("could not save uploaded archive: {e}")))?;
        wrote_field = true;
        break;
    }

    if !wrote_field {
        return Err(AppError::BadRequest(
            "multipart upload is missing the `file` field".to_string(),
        ));
    }
    Ok(())
}

async fn accept_ingest(
    state: Arc<AppState>,
    multipart: Multipart,
    job_type: job_engine::JobType,
) -> AppResult<axum::response::Response> {
    let repo_id = services::uuid::new_opaque_id();
    save_upload(&state, repo_id, multipart).await?;
    let job_id = state.jobs.create_job(repo_id, job_type).await?;
    state.dispatch(job_id).await;
    Ok(ApiResponse::success(IngestAccepted { job_id, repo_id })
        .into_response_with_status(StatusCode::OK))
}

pub async fn ingest_zip(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> AppResult<axum::response::Response> {
    accept_ingest(state, multipart, job_engine::JobType::IngestZip).await
}

pub async fn ingest_kg_zip(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> AppResult<axum::response::Response> {
    accept_ingest(state, multipart, job_engine::JobType::IngestKgZip).await
}
