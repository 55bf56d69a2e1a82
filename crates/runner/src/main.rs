//! submit-runner: batch submission entrypoint.
//!
//! Usage: `submit-runner <records.json>...`

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use submit_core::ElementCatalog;
use submit_runner::{Config, HttpSubmitter, PgGateway, Pipeline, SubmissionRecord};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    // Load configuration
    let config = Config::from_env().expect("Invalid configuration");

    if let Some(address) = &config.metrics_address {
        submit_runner::metrics::install_exporter(address)
            .expect("Failed to install metrics exporter");
    }

    let catalog =
        ElementCatalog::load(&config.catalog_path).expect("Failed to load element catalog");

    // Create database pool
    let pool = submit_runner::db::create_pool(&config.database_url)
        .await
        .expect("Failed to create database pool");
    let gateway = PgGateway::new(pool);
    gateway
        .ensure_schema()
        .await
        .expect("Failed to prepare write-back tables");

    let submitter = HttpSubmitter::new(
        config.api_url.clone(),
        config.access_token.clone(),
        config.request_timeout,
    )
    .expect("Failed to build HTTP client");

    if config.access_token.is_some() {
        tracing::info!("Bearer token authentication enabled");
    } else {
        tracing::warn!("SUBMIT_ACCESS_TOKEN not set, submitting without authentication");
    }

    let mut records = Vec::new();
    for path in std::env::args().skip(1).map(PathBuf::from) {
        match SubmissionRecord::load(&path) {
            Ok(loaded) => {
                tracing::info!(path = %path.display(), records = loaded.len(), "Loaded records");
                records.extend(loaded);
            }
            Err(e) => tracing::error!(
                path = %path.display(),
                error = %e,
                "Skipping unreadable record file"
            ),
        }
    }

    let cancel = Arc::new(AtomicBool::new(false));
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            cancel.store(true, Ordering::SeqCst);
        }
    });

    tracing::info!(api_url = %config.api_url, records = records.len(), "Starting submission batch");

    let mut pipeline = Pipeline::new(
        catalog,
        config.assembler_options(),
        config.evaluator_options(),
        submitter,
        gateway,
    );
    let summary = pipeline.run_batch(&records, &cancel).await;

    tracing::info!(
        passed = summary.passed,
        failed = summary.failed,
        skipped = summary.skipped,
        "Submission run finished"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, finishing current record");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, finishing current record");
        }
    }
}
