//! Transcode worker binary.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vodflow_jobs::JobStore;
use vodflow_queue::{JobQueue, Scheduler};
use vodflow_storage::ObjectStore;
use vodflow_worker::{ProcessContext, WebhookConfig, WebhookNotifier, WorkerConfig, WorkerPool};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Load environment variables
    dotenvy::dotenv().ok();

    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("vodflow=info".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("starting vodflow-worker");

    let config = WorkerConfig::from_env();
    info!(?config, "worker config loaded");

    let storage = match ObjectStore::from_env() {
        Ok(s) => s,
        Err(e) => {
            error!("failed to create object store client: {e}");
            std::process::exit(1);
        }
    };

    let queue = match JobQueue::from_env() {
        Ok(q) => Arc::new(q),
        Err(e) => {
            error!("failed to create job queue: {e}");
            std::process::exit(1);
        }
    };

    let jobs = match JobStore::from_env() {
        Ok(j) => Arc::new(j),
        Err(e) => {
            error!("failed to create job store: {e}");
            std::process::exit(1);
        }
    };

    let scheduler = Scheduler::new(queue, jobs);
    let notifier = WebhookConfig::from_env().map(WebhookNotifier::new);
    if notifier.is_none() {
        info!("webhook notifications disabled");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let ctx = ProcessContext {
        config,
        storage,
        scheduler,
        notifier,
        shutdown: shutdown_rx,
    };

    let pool = WorkerPool::new(ctx, shutdown_tx.clone());

    // SIGINT/SIGTERM: refuse new claims and drain
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    if let Err(e) = pool.run().await {
        error!("worker pool error: {e}");
        std::process::exit(1);
    }

    info!("worker shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}
