//! Enrollment engine worker entry point.
//!
//! Connects to the database, applies migrations and runs the upload
//! reclamation scheduler until a shutdown signal arrives. The aggregate
//! services are consumed by the delivery layer as a library.

use std::sync::Arc;

use enrollment_common::{
    Config, LocalStorage, SharedStorage,
    config::{StorageKind, StorageSettings},
};
use enrollment_core::{FileLifecycleService, TransactionManager};
use enrollment_queue::{SchedulerConfig, run_scheduler};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Waits for a shutdown signal (SIGINT or SIGTERM).
///
/// On Unix systems, this listens for both SIGINT (Ctrl+C) and SIGTERM.
/// On Windows, this only listens for Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

fn build_storage(settings: &StorageSettings) -> Result<SharedStorage, Box<dyn std::error::Error>> {
    match settings.backend {
        StorageKind::Local => {
            info!(path = %settings.base_path.display(), "Using local blob storage");
            Ok(Arc::new(LocalStorage::new(settings.base_path.clone())))
        }
        #[cfg(feature = "s3")]
        StorageKind::S3 => {
            let (Some(endpoint), Some(access_key_id), Some(secret_access_key)) = (
                settings.endpoint.as_deref(),
                settings.access_key_id.as_deref(),
                settings.secret_access_key.as_deref(),
            ) else {
                return Err("S3 storage needs endpoint, access_key_id and secret_access_key".into());
            };
            let region = settings.region.as_deref().unwrap_or("us-east-1");
            info!(endpoint, region, "Using S3 blob storage");
            Ok(Arc::new(enrollment_common::S3Storage::new(
                endpoint,
                region,
                access_key_id,
                secret_access_key,
            )))
        }
        #[cfg(not(feature = "s3"))]
        StorageKind::S3 => Err("S3 storage requires the `s3` feature".into()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "enrollment=debug,sea_orm=info".into()),
        )
        .init();

    info!("Starting enrollment worker...");

    // Load configuration
    let config = Config::load()?;

    // Connect to database
    let db = enrollment_db::init(&config).await?;
    info!("Connected to database");

    // Run migrations
    info!("Running database migrations...");
    enrollment_db::migrate(&db).await?;
    info!("Migrations completed");

    let storage = build_storage(&config.storage)?;
    let files = FileLifecycleService::new(
        TransactionManager::new(Arc::new(db)),
        storage,
        config.storage.bucket.clone(),
        config.files.clone(),
    );

    let scheduler_config = SchedulerConfig::from(&config.reclamation);
    info!(
        interval_secs = scheduler_config.reclaim_interval.as_secs(),
        batch_size = scheduler_config.batch_size,
        "Starting reclamation scheduler"
    );
    let scheduler = run_scheduler(scheduler_config, Arc::new(files));

    shutdown_signal().await;

    let state = scheduler.state().await;
    scheduler.shutdown();
    info!(
        files_deleted = state.files_deleted,
        claims_released = state.claims_released,
        "Worker stopped"
    );

    Ok(())
}
