//! consiliumd - the Consilium registry daemon.
//!
//! Wires the Postgres-backed stores, the job dispatcher with its OCR
//! handler, and the integrity verifier, then runs until interrupted.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use consilium_core::{ContentStore, DocumentStore, JobStore};
use consilium_db::{create_pool, log_pool_metrics, run_migrations, PgDocumentStore, PgJobStore};

const POOL_METRICS_INTERVAL_SECS: u64 = 60;
use consilium_integrity::{IntegrityLog, Verifier, VerifierConfig};
use consilium_jobs::{
    Dispatcher, DispatcherConfig, ExtractConfig, Extractor, OcrJobHandler, SystemRunner,
};
use consilium_registry::{AppConfig, FsContentStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with configurable output
    //
    // Environment variables:
    //   LOG_FORMAT  - "json" or "text" (default: "text")
    //   LOG_FILE    - path to log file (optional, enables file logging)
    //   RUST_LOG    - standard env filter (default: "consilium=debug")
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "consilium=debug".into());
    let registry = tracing_subscriber::registry().with(env_filter);

    // Optionally create a file appender with daily rotation
    let _file_guard = if let Some(ref path) = log_file {
        let file_dir = std::path::Path::new(path)
            .parent()
            .unwrap_or(std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("consiliumd.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(non_blocking),
                )
                .init();
        }
        Some(guard)
    } else if log_format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
        None
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
        None
    };

    let config = AppConfig::from_env()?;

    info!(
        log_format = %log_format,
        content_dir = %config.content_dir.display(),
        integrity_log = %config.integrity_log_path.display(),
        "Starting consiliumd"
    );

    // Database
    let pool = create_pool(&config.database_url).await?;
    run_migrations(&pool).await?;

    // Periodic pool health log; dies with the process.
    let metrics_pool = pool.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(POOL_METRICS_INTERVAL_SECS));
        interval.tick().await;
        loop {
            interval.tick().await;
            log_pool_metrics(&metrics_pool);
        }
    });

    // Stores and collaborators
    let docs: Arc<dyn DocumentStore> = Arc::new(PgDocumentStore::new(pool.clone()));
    let jobs: Arc<dyn JobStore> = Arc::new(PgJobStore::new(pool.clone()));
    let content: Arc<dyn ContentStore> =
        Arc::new(FsContentStore::open(config.content_dir.clone()).await?);

    // Job dispatcher with the OCR handler
    let extractor = Arc::new(Extractor::new(
        Arc::new(SystemRunner::new()),
        ExtractConfig::from_env(),
    ));
    let dispatcher_config = DispatcherConfig::from_env();
    let dispatcher_enabled = dispatcher_config.enabled;
    let dispatcher = Dispatcher::new(jobs.clone(), dispatcher_config)
        .register_handler(OcrJobHandler::new(
            docs.clone(),
            content.clone(),
            extractor,
        ));
    let dispatcher_handle = if dispatcher_enabled {
        Some(dispatcher.start())
    } else {
        info!(subsystem = "jobs", "Dispatcher disabled by configuration");
        None
    };

    // Integrity verifier
    let integrity_log = Arc::new(IntegrityLog::new(config.integrity_log_path.clone()));
    let verifier_handle = Verifier::new(
        docs.clone(),
        content.clone(),
        integrity_log,
        VerifierConfig::from_env(),
    )
    .start();

    info!("consiliumd running; press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    info!("Shutdown requested; stopping loops");
    if let Some(handle) = dispatcher_handle {
        handle.shutdown().await?;
    }
    verifier_handle.shutdown().await?;
    pool.close().await;

    info!("consiliumd stopped");
    Ok(())
}
