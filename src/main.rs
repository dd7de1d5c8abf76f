//! Quirrel Server — multi-tenant job scheduler daemon
//!
//! Main entry point that wires the store, producer, and delivery worker
//! together. The HTTP API surface consumes the producer from its own
//! hosting layer; this binary runs the scheduling core.

use std::sync::Arc;

use tokio::sync::watch;
use tracing_subscriber::{fmt, EnvFilter};

use quirrel_core::config::QuirrelConfig;
use quirrel_core::error::AppError;
use quirrel_producer::Producer;
use quirrel_realtime::ActivityPublisher;
use quirrel_store::StoreManager;
use quirrel_worker::{DeliveryWorker, Dispatcher, IncidentReporter, PayloadSigner};

#[tokio::main]
async fn main() {
    let env = std::env::var("QUIRREL_ENV").unwrap_or_else(|_| "development".to_string());
    let config = match QuirrelConfig::load(&env) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!("Server error: {e}");
        std::process::exit(1);
    }
}

/// Initialize tracing/logging
fn init_logging(config: &QuirrelConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt().json().with_env_filter(filter).with_target(true).init();
        }
        _ => {
            fmt().pretty().with_env_filter(filter).with_target(true).init();
        }
    }
}

/// Main run function
async fn run(config: QuirrelConfig) -> Result<(), AppError> {
    tracing::info!("Starting Quirrel v{}", env!("CARGO_PKG_VERSION"));

    // ── Step 1: Backing store ────────────────────────────────────
    tracing::info!(provider = %config.store.provider, "Initializing backing store...");
    let store = StoreManager::connect(&config.store).await?;

    let legacy = match &config.store.legacy_redis {
        Some(legacy_config) => {
            tracing::info!("Migration mode: connecting legacy store...");
            let legacy = StoreManager::connect_redis(legacy_config).await?;
            Some(Arc::new(legacy) as Arc<dyn quirrel_store::JobStore>)
        }
        None => None,
    };

    // ── Step 2: Activity fan-out ─────────────────────────────────
    let activity = Arc::new(ActivityPublisher::new(config.realtime.channel_buffer));

    // ── Step 3: Producer + one-shot directory backfill ───────────
    let mut producer = Producer::new(
        Arc::clone(&store),
        Arc::clone(&activity),
        config.producer.clone(),
    );
    if let Some(legacy) = legacy {
        producer = producer.with_legacy(legacy);
    }
    producer.ensure_queue_directory().await?;

    // ── Step 4: Shutdown channel ─────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Step 5: Delivery worker ──────────────────────────────────
    let worker_handle = if config.worker.enabled {
        tracing::info!("Starting delivery worker...");

        let signer = PayloadSigner::from_config(&config.signing)?;
        let dispatcher = Dispatcher::new(Arc::clone(&store), signer, &config.worker)?;

        let mut worker = DeliveryWorker::new(
            Arc::clone(&store),
            dispatcher,
            Arc::clone(&activity),
            config.worker.clone(),
        );
        if let Some(receiver) = &config.worker.incident_receiver {
            worker = worker.with_incidents(IncidentReporter::new(receiver)?);
        }

        let worker_cancel = shutdown_rx.clone();
        let handle = tokio::spawn(async move {
            worker.run(worker_cancel).await;
        });

        tracing::info!("Delivery worker started");
        Some(handle)
    } else {
        tracing::info!("Delivery worker disabled");
        None
    };

    // ── Step 6: Wait for shutdown ────────────────────────────────
    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown...");
    let _ = shutdown_tx.send(true);

    if let Some(handle) = worker_handle {
        let _ = tokio::time::timeout(std::time::Duration::from_secs(35), handle).await;
    }

    tracing::info!("Quirrel server shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
