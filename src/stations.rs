use chrono::{DateTime, Utc};
use diesel::prelude::*;

use crate::geo::Coordinates;

/// Timestamps are stored as Unix milliseconds
pub fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub fn from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

fn coordinates_from_columns(latitude: Option<f64>, longitude: Option<f64>) -> Option<Coordinates> {
    match (latitude, longitude) {
        (Some(latitude), Some(longitude)) => Some(Coordinates::new(latitude, longitude)),
        _ => None,
    }
}

/// Database row for a station
#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = crate::schema::stations)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct StationRecord {
    pub id: i32,
    pub callsign: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub symbol: String,
    pub symbol_table: String,
    pub comment: String,
    pub last_heard: i64,
    pub packet_count: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// For inserting a station heard for the first time
#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::stations)]
pub struct NewStationRecord<'a> {
    pub callsign: &'a str,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub symbol: String,
    pub symbol_table: String,
    pub comment: &'a str,
    pub last_heard: i64,
    pub packet_count: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Changes applied when a known station is heard again.
///
/// `None` fields are left untouched, which is how coordinates and comment
/// survive packets that do not carry them.
#[derive(Debug, AsChangeset)]
#[diesel(table_name = crate::schema::stations)]
pub struct StationChangeset<'a> {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub symbol: String,
    pub symbol_table: String,
    pub comment: Option<&'a str>,
    pub last_heard: i64,
    pub packet_count: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Associations)]
#[diesel(table_name = crate::schema::packet_history)]
#[diesel(belongs_to(StationRecord, foreign_key = station_id))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PacketHistoryRecord {
    pub id: i32,
    pub station_id: i32,
    pub raw_packet: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub path: String,
    pub received_at: i64,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::packet_history)]
pub struct NewPacketHistoryRecord<'a> {
    pub station_id: i32,
    pub raw_packet: &'a str,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub path: String,
    pub received_at: i64,
}

/// A station as tracked by the service
#[derive(Debug, Clone, PartialEq)]
pub struct Station {
    pub id: i32,
    pub callsign: String,
    /// Last known fix; kept across packets that carry no position
    pub coordinates: Option<Coordinates>,
    pub symbol: String,
    pub symbol_table: String,
    pub comment: String,
    pub last_heard: DateTime<Utc>,
    pub packet_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<StationRecord> for Station {
    fn from(record: StationRecord) -> Self {
        Self {
            id: record.id,
            callsign: record.callsign,
            coordinates: coordinates_from_columns(record.latitude, record.longitude),
            symbol: record.symbol,
            symbol_table: record.symbol_table,
            comment: record.comment,
            last_heard: from_millis(record.last_heard),
            packet_count: u64::try_from(record.packet_count).unwrap_or(0),
            created_at: from_millis(record.created_at),
            updated_at: from_millis(record.updated_at),
        }
    }
}

/// One stored packet from a station's history
#[derive(Debug, Clone, PartialEq)]
pub struct PacketHistoryEntry {
    pub id: i32,
    pub station_id: i32,
    pub raw_info: String,
    pub coordinates: Option<Coordinates>,
    pub path: Vec<String>,
    pub received_at: DateTime<Utc>,
}

impl From<PacketHistoryRecord> for PacketHistoryEntry {
    fn from(record: PacketHistoryRecord) -> Self {
        let path = if record.path.is_empty() {
            Vec::new()
        } else {
            record.path.split(',').map(str::to_string).collect()
        };

        Self {
            id: record.id,
            station_id: record.station_id,
            raw_info: record.raw_packet,
            coordinates: coordinates_from_columns(record.latitude, record.longitude),
            path,
            received_at: from_millis(record.received_at),
        }
    }
}

/// Aggregate counts, derived on demand
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub total_stations: u64,
    pub stations_with_position: u64,
    pub total_packets: u64,
}
