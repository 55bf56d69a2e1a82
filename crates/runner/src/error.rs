//! Runner error handling

use submit_core::SubmitError;
use thiserror::Error;

/// Errors raised by the runner's collaborators
#[derive(Debug, Error)]
pub enum RunnerError {
    // ------------------------------------------------------------------
    // Transport
    // ------------------------------------------------------------------
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    #[error("Database pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("Failed to create database pool: {0}")]
    CreatePool(#[from] deadpool_postgres::CreatePoolError),

    // ------------------------------------------------------------------
    // Input and setup
    // ------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Metrics exporter error: {0}")]
    Metrics(String),

    #[error(transparent)]
    Core(#[from] SubmitError),
}
