use anyhow::Result;
use tracing::info;

use tnc_tracker::config::AppConfig;
use tnc_tracker::stations_repo::{StationsRepository, create_pool, run_migrations};

/// One retention pass over packet history, then exit
pub async fn handle_prune_history(config: AppConfig, retention_days: Option<u32>) -> Result<()> {
    let retention_days = retention_days.unwrap_or(config.history.retention_days);
    anyhow::ensure!(retention_days > 0, "retention must be at least one day");

    let pool = create_pool(&config.database.path)?;
    run_migrations(&pool)?;
    let repo = StationsRepository::new(pool);

    let deleted = repo.prune_history(retention_days).await?;
    info!(
        "Deleted {} packet history rows older than {} days from {}",
        deleted, retention_days, config.database.path
    );
    Ok(())
}
