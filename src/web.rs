use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use anyhow::{Context, Result};
use axum::{
    Router,
    body::Body,
    http::Request,
    middleware::{self, Next},
    response::Response,
    routing::get,
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::actions;
use crate::broadcaster::EventBroadcaster;
use crate::events::StationProjector;
use crate::station_tracker::StationTracker;
use crate::stations_repo::StationsRepository;

static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(1);

// Shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub repo: StationsRepository,
    pub tracker: Arc<StationTracker>,
    pub broadcaster: Arc<EventBroadcaster>,
    pub projector: StationProjector,
}

impl AppState {
    pub fn new(tracker: Arc<StationTracker>, projector: StationProjector) -> Self {
        Self {
            repo: tracker.repository().clone(),
            broadcaster: Arc::clone(tracker.broadcaster()),
            tracker,
            projector,
        }
    }
}

async fn request_logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let request_id = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    let start_time = Instant::now();

    info!("Started {} {} [{}]", method, path, request_id);

    let response = next.run(request).await;
    let duration = start_time.elapsed();
    let status = response.status();

    info!(
        "Completed {} {} [{}] {} in {:.2}ms",
        method,
        path,
        request_id,
        status.as_u16(),
        duration.as_secs_f64() * 1000.0
    );

    response
}

pub fn router(state: AppState) -> Router {
    let api_router = Router::new()
        .route("/stations", get(actions::get_stations))
        .route("/stations/{callsign}", get(actions::get_station_by_callsign))
        .route("/stats", get(actions::get_stats))
        .route("/health", get(actions::get_health));

    Router::new()
        .nest("/api", api_router)
        .route("/ws", get(actions::stations_live_websocket))
        .with_state(state)
        .layer(middleware::from_fn(request_logging_middleware))
        .layer(CorsLayer::permissive())
}

/// Serve the REST and WebSocket endpoints until `shutdown` is cancelled
pub async fn start_web_server(
    addr: SocketAddr,
    state: AppState,
    shutdown: CancellationToken,
) -> Result<()> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind web server on {addr}"))?;
    info!("Web server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("Web server failed")?;

    info!("Web server stopped");
    Ok(())
}
