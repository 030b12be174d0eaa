use anyhow::{Context, Result};
use std::time::Duration;
use tracing::info;

use registration_api::app::{create_app, AppState};
use registration_api::config::Config;
use registration_api::jobs::{CleanupUnverifiedUsersJob, JobScheduler, PoolMetricsJob};
use registration_api::middleware::{init_metrics, logging::init_logging};

const JOB_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::load().context("failed to load configuration")?;
    init_logging(&config.logging).context("failed to initialize logging")?;
    init_metrics().context("failed to install metrics recorder")?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting race registration API");

    let pool = persistence::db::create_pool(&config.database.pool_config())
        .await
        .context("failed to connect to the database")?;

    info!("Running database migrations");
    sqlx::migrate!("../persistence/src/migrations")
        .run(&pool)
        .await
        .context("failed to run migrations")?;

    let addr = config.socket_addr().context("invalid server address")?;
    let state = AppState::with_email(config, pool.clone()).context("invalid jwt settings")?;

    let mut scheduler = JobScheduler::new();
    scheduler.register(PoolMetricsJob::new(pool));
    if state.config.jobs.cleanup_enabled {
        scheduler.register(CleanupUnverifiedUsersJob::new(
            state.users.clone(),
            state.config.jobs.unverified_user_retention_hours,
        ));
    }
    scheduler.start();

    let app = create_app(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.shutdown();
    scheduler.wait_for_shutdown(JOB_SHUTDOWN_TIMEOUT).await;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
