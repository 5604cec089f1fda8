//! Statistics and health endpoints

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use tracing::error;

use crate::actions::json_error;
use crate::events::ApiStats;
use crate::web::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub kiss_connected: bool,
    pub connected_clients: usize,
}

pub async fn get_stats(State(state): State<AppState>) -> impl IntoResponse {
    match state.repo.get_stats().await {
        Ok(stats) => {
            Json(ApiStats::with_connection(&stats, state.tracker.is_kiss_connected()))
                .into_response()
        }
        Err(e) => {
            error!("Failed to get stats: {:#}", e);
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to get stats").into_response()
        }
    }
}

pub async fn get_health(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        kiss_connected: state.tracker.is_kiss_connected(),
        connected_clients: state.broadcaster.subscriber_count(),
    })
}
