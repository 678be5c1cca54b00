//! Error taxonomy for the HTTP edge and its mapping to status codes.

use axum::extract::multipart::MultipartError;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::core::app_state::StartupError;
use crate::core::config::ConfigError;
use crate::core::http::response_envelope::ApiResponse;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("archive rejected: {0}")]
    ArchiveUnsafe(#[from] archive_sandbox::ArchiveError),

    #[error("generated query rejected: {0}")]
    UnsafeQuery(#[from] structural_router::RouterError),

    #[error("no supported source files found in the uploaded archive")]
    EmptyParseResult,

    #[error("upstream service unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("upstream service rejected the request: {0}")]
    UpstreamRejected(String),

    #[error("upstream provider rejected credentials")]
    Unauthorized,

    #[error("startup configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("service failed to start: {0}")]
    Startup(#[from] StartupError),

    #[error("invalid request body: {0}")]
    Json(#[from] JsonRejection),

    #[error("invalid query parameters: {0}")]
    Query(#[from] QueryRejection),

    #[error("invalid multipart upload: {0}")]
    Multipart(#[from] MultipartError),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_)
            | AppError::Json(_)
            | AppError::Query(_)
            | AppError::Multipart(_)
            | AppError::ArchiveUnsafe(_)
            | AppError::UnsafeQuery(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::EmptyParseResult => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            AppError::UpstreamRejected(_) => StatusCode::BAD_GATEWAY,
            AppError::Unauthorized => StatusCode::BAD_GATEWAY,
            AppError::Config(_) | AppError::Startup(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) | AppError::Json(_) | AppError::Query(_) | AppError::Multipart(_) => {
                "bad_request"
            }
            AppError::NotFound(_) => "not_found",
            AppError::ArchiveUnsafe(_) => "archive_unsafe",
            AppError::UnsafeQuery(_) => "unsafe_query",
            AppError::EmptyParseResult => "empty_parse_result",
            AppError::UpstreamUnavailable(_) => "upstream_unavailable",
            AppError::UpstreamRejected(_) => "upstream_rejected",
            AppError::Unauthorized => "unauthorized",
            AppError::Config(_) | AppError::Startup(_) => "startup_config",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();
        let message = self.to_string();
        if status.is_server_error() || status == StatusCode::BAD_GATEWAY {
            tracing::error!(code, %message, "request failed");
        } else {
            tracing::warn!(code, %message, "request rejected");
        }
        ApiResponse::<()>::error(code, message, None).into_response_with_status(status)
    }
}

impl From<job_engine::JobEngineError> for AppError {
    fn from(err: job_engine::JobEngineError) -> Self {
        match err {
            job_engine::JobEngineError::NotFound(id) => AppError::NotFound(format!("job {id}")),
            job_engine::JobEngineError::ParseEmpty => AppError::EmptyParseResult,
            job_engine::JobEngineError::Archive(e) => AppError::ArchiveUnsafe(e),
            other => AppError::UpstreamUnavailable(other.to_string()),
        }
    }
}

impl From<graph_client::GraphClientError> for AppError {
    fn from(err: graph_client::GraphClientError) -> Self {
        match &err {
            graph_client::GraphClientError::HttpStatus { status, .. } if status.as_u16() == 401 => {
                AppError::Unauthorized
            }
            graph_client::GraphClientError::HttpStatus { status, .. } if status.is_client_error() => {
                AppError::UpstreamRejected(err.to_string())
            }
            _ => AppError::UpstreamUnavailable(err.to_string()),
        }
    }
}

impl From<hybrid_retriever::RetrieverError> for AppError {
    fn from(err: hybrid_retriever::RetrieverError) -> Self {
        AppError::UpstreamUnavailable(err.to_string())
    }
}

impl From<answer_composer::ComposerError> for AppError {
    fn from(err: answer_composer::ComposerError) -> Self {
        AppError::UpstreamUnavailable(err.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::UpstreamUnavailable(err.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_parse_result_maps_to_422() {
        let err = AppError::EmptyParseResult;
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.error_code(), "empty_parse_result");
    }

    #[test]
    fn unauthorized_maps_to_502_not_401() {
        // Upstream credential failures are surfaced as a bad-gateway to the
        // caller, not as if they themselves were unauthorized.
        let err = AppError::Unauthorized;
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn job_not_found_maps_to_404() {
        let err: AppError = job_engine::JobEngineError::NotFound(uuid::Uuid::nil()).into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.error_code(), "not_found");
    }

    #[test]
    fn job_parse_empty_maps_to_empty_parse_result() {
        let err: AppError = job_engine::JobEngineError::ParseEmpty.into();
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn config_and_startup_errors_map_to_503() {
        let cfg_err: AppError = ConfigError::MissingEnv("DATABASE_URL").into();
        assert_eq!(cfg_err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(cfg_err.error_code(), "startup_config");
    }
}
