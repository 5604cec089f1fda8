use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use tnc_tracker::broadcaster::EventBroadcaster;
use tnc_tracker::config::AppConfig;
use tnc_tracker::events::StationProjector;
use tnc_tracker::kiss_client::{KissClient, KissEvent};
use tnc_tracker::station_tracker::StationTracker;
use tnc_tracker::stations_repo::{StationsRepository, create_pool, run_migrations};
use tnc_tracker::web::{AppState, start_web_server};

/// Frames buffered between the KISS reader and the ingest loop
const KISS_EVENT_QUEUE_SIZE: usize = 1000;

/// How long the web server gets to finish in-flight requests on shutdown
const WEB_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn handle_run(config: AppConfig) -> Result<()> {
    info!(
        "Starting tracker for {} at ({:.4}, {:.4})",
        config.station.callsign, config.station.latitude, config.station.longitude
    );

    if let Some(port) = config.metrics.port {
        tokio::spawn(async move {
            if let Err(e) = tnc_tracker::metrics::start_metrics_server(port).await {
                error!("Metrics server failed: {:#}", e);
            }
        });
    }

    let pool = create_pool(&config.database.path)?;
    run_migrations(&pool)?;

    let broadcaster = Arc::new(EventBroadcaster::new());
    let tracker = Arc::new(StationTracker::new(
        StationsRepository::new(pool),
        Arc::clone(&broadcaster),
    ));

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    // Ingest: the KISS client feeds one ordered channel consumed by the tracker
    let (kiss_tx, kiss_rx) = flume::bounded::<KissEvent>(KISS_EVENT_QUEUE_SIZE);
    let kiss_client = KissClient::new(config.kiss_client_config());
    kiss_client.connect(kiss_tx);

    let ingest_task = {
        let tracker = Arc::clone(&tracker);
        tokio::spawn(async move { tracker.run(kiss_rx).await })
    };

    let maintenance_task = tokio::spawn(run_maintenance(
        Arc::clone(&tracker),
        config.stats_interval(),
        config.prune_interval(),
        config.history.retention_days,
        shutdown.clone(),
    ));

    let state = AppState::new(
        Arc::clone(&tracker),
        StationProjector::new(config.station_location()),
    );
    let mut web_task = tokio::spawn(start_web_server(
        config.web_address().await?,
        state,
        shutdown.clone(),
    ));

    tokio::select! {
        _ = shutdown.cancelled() => {}
        result = &mut web_task => {
            shutdown.cancel();
            kiss_client.disconnect().await;
            return match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e),
                Err(e) => Err(e).context("Web server task panicked"),
            };
        }
    }

    info!("Shutting down");

    // Stop reconnecting; dropping the client's sender lets the ingest loop drain and finish
    kiss_client.disconnect().await;
    if let Err(e) = ingest_task.await {
        error!("Ingest task ended abnormally: {}", e);
    }
    if let Err(e) = maintenance_task.await {
        error!("Maintenance task ended abnormally: {}", e);
    }

    match tokio::time::timeout(WEB_SHUTDOWN_TIMEOUT, web_task).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => error!("Web server error during shutdown: {:#}", e),
        Ok(Err(e)) => error!("Web server task ended abnormally: {}", e),
        Err(_) => warn!(
            "Web server did not stop within {}s",
            WEB_SHUTDOWN_TIMEOUT.as_secs()
        ),
    }

    info!("Shutdown complete");
    Ok(())
}

/// Periodic stats broadcast and history pruning on independent timers
async fn run_maintenance(
    tracker: Arc<StationTracker>,
    stats_interval: Duration,
    prune_interval: Duration,
    retention_days: u32,
    shutdown: CancellationToken,
) {
    let mut stats_timer = tokio::time::interval(stats_interval);
    stats_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut prune_timer = tokio::time::interval(prune_interval);
    prune_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = stats_timer.tick() => {
                if let Err(e) = tracker.publish_stats().await {
                    error!("Failed to publish stats: {:#}", e);
                }
            }
            _ = prune_timer.tick() => {
                if let Err(e) = tracker.prune_history(retention_days).await {
                    error!("Failed to prune packet history: {:#}", e);
                }
            }
        }
    }
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};

            let (mut sigterm, mut sigint) =
                match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                    (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
                    (Err(e), _) | (_, Err(e)) => {
                        error!("Failed to register signal handlers: {}", e);
                        return;
                    }
                };

            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down...");
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT (Ctrl+C), shutting down...");
                }
            }
        }

        #[cfg(not(unix))]
        {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received SIGINT (Ctrl+C), shutting down...");
                }
                Err(err) => {
                    error!("Failed to listen for SIGINT signal: {}", err);
                    return;
                }
            }
        }

        shutdown.cancel();
    });
}
