use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use tracing::{error, instrument};

use crate::actions::json_error;
use crate::events::{ApiHistoryEntry, ApiStation};
use crate::stations_repo::DEFAULT_HISTORY_LIMIT;
use crate::web::AppState;

const MAX_HISTORY_LIMIT: i64 = 1000;

#[derive(Debug, Serialize)]
pub struct StationsResponse {
    pub stations: Vec<ApiStation>,
}

#[derive(Debug, Serialize)]
pub struct StationDetailResponse {
    pub station: ApiStation,
    pub history: Vec<ApiHistoryEntry>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Number of history rows to return (default 100)
    pub limit: Option<i64>,
}

/// All known stations, most recently heard first
pub async fn get_stations(State(state): State<AppState>) -> impl IntoResponse {
    match state.repo.get_all().await {
        Ok(stations) => Json(StationsResponse {
            stations: stations.iter().map(|s| state.projector.project(s)).collect(),
        })
        .into_response(),
        Err(e) => {
            error!("Failed to get stations: {:#}", e);
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to get stations").into_response()
        }
    }
}

/// One station with its recent packet history
#[instrument(skip(state, query))]
pub async fn get_station_by_callsign(
    Path(callsign): Path<String>,
    Query(query): Query<HistoryQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let callsign = callsign.to_uppercase();
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);

    let station = match state.repo.get_by_callsign(&callsign).await {
        Ok(Some(station)) => station,
        Ok(None) => {
            return json_error(StatusCode::NOT_FOUND, "Station not found").into_response();
        }
        Err(e) => {
            error!("Failed to get station {}: {:#}", callsign, e);
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to get station")
                .into_response();
        }
    };

    match state.repo.get_history(&callsign, limit).await {
        Ok(history) => Json(StationDetailResponse {
            station: state.projector.project(&station),
            history: history.iter().map(ApiHistoryEntry::from).collect(),
        })
        .into_response(),
        Err(e) => {
            error!("Failed to get history for {}: {:#}", callsign, e);
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to get station history")
                .into_response()
        }
    }
}
