// Entry point for the job workers: one worker per queue plus the queue reaper

use std::time::Duration;

use anyhow::{Context, Result};
use campaign_core::domains::campaigns::campaign_executors;
use campaign_core::kernel::jobs::{JobWorker, JobWorkerConfig, QueueReaper};
use campaign_core::kernel::ServerDeps;
use campaign_core::Config;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,campaign_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    let deps = ServerDeps::from_config(pool, &config)?;
    let lease = Duration::from_millis(u64::try_from(config.job_lease_ms).unwrap_or(60_000));
    let worker_prefix = format!("worker-{}", uuid::Uuid::new_v4());

    let shutdown = CancellationToken::new();
    let mut handles = Vec::new();

    for executor in campaign_executors(deps.crawler.clone()) {
        let queue_name = executor.kind().queue_name();
        let worker_config = JobWorkerConfig {
            batch_size: config.worker_batch_size,
            poll_interval: config.worker_poll_interval,
            ..JobWorkerConfig::with_worker_id(format!("{worker_prefix}-{queue_name}"))
        }
        .with_lease(lease);

        let worker = JobWorker::with_config(
            deps.job_queue.clone(),
            deps.job_store.clone(),
            executor,
            worker_config,
        );
        let token = shutdown.clone();
        handles.push(tokio::spawn(async move { worker.run(token).await }));
    }

    let mut reaper = QueueReaper::new(deps.job_queue.clone())
        .start(config.reaper_interval)
        .await
        .context("Failed to start queue reaper")?;

    tracing::info!(workers = handles.len(), "workers running; press Ctrl+C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown signal received, waiting for in-flight jobs");

    shutdown.cancel();
    for handle in handles {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "worker exited with error"),
            Err(e) => tracing::error!(error = %e, "worker task panicked"),
        }
    }

    if let Err(e) = reaper.shutdown().await {
        tracing::warn!(error = %e, "queue reaper did not stop cleanly");
    }

    tracing::info!("Workers stopped");
    Ok(())
}
