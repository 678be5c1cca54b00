//! HTTP edge: boots configuration, shared state, and the axum router.

pub mod core;
pub mod error_handler;
pub mod middleware_layer;
pub mod routes;

use std::net::SocketAddr;

use tracing::info;

use core::app_state::AppState;
use core::config::AppConfig;
use error_handler::AppError;

pub async fn start() -> Result<(), AppError> {
    let config = AppConfig::from_env()?;
    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

    let state = AppState::new(config).await?;
    let app = routes::router(state);

    let addr: SocketAddr = bind_addr
        .parse()
        .map_err(|_| AppError::BadRequest(format!("invalid BIND_ADDR: {bind_addr}")))?;

    info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| AppError::UpstreamUnavailable(format!("could not bind {addr}: {e}")))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| AppError::UpstreamUnavailable(format!("server error: {e}")))?;
    Ok(())
}
