pub mod live;
pub mod stations;
pub mod status;

pub use live::stations_live_websocket;
pub use stations::{get_station_by_callsign, get_stations};
pub use status::{get_health, get_stats};

use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub fn json_error(status: StatusCode, message: &str) -> impl IntoResponse {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
}
