mod config;
mod sweep;

use std::sync::Arc;

use fleet_core::Fleet;
use fleet_db::PgMachineStore;
use tracing_subscriber::EnvFilter;

use crate::config::SweeperConfig;

#[tokio::main]
async fn main() {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = SweeperConfig::from_env();

    let pool = fleet_db::create_pool(&config.database_url)
        .await
        .expect("failed to connect to database");

    fleet_db::run_migrations(&pool)
        .await
        .expect("failed to run migrations");

    let store = Arc::new(PgMachineStore::new(pool));
    let fleet = Arc::new(Fleet::from_env(store).expect("failed to configure fly client"));

    fleet.regions().ensure_loaded().await;
    tracing::info!(
        app = fleet.app(),
        regions = ?fleet.regions().regions().await,
        interval_secs = config.sweep_interval_secs,
        "starting machine sweeper"
    );

    if let Err(e) = spawn_sweeper_until_shutdown(fleet, config.sweep_interval_secs).await {
        tracing::error!(error = %e, "sweeper stopped");
    }
}

async fn spawn_sweeper_until_shutdown(
    fleet: Arc<Fleet>,
    interval_secs: u64,
) -> Result<(), tokio::task::JoinError> {
    let handle = sweep::spawn_sweeper(fleet, interval_secs);
    tokio::select! {
        res = handle => res,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
            Ok(())
        }
    }
}
