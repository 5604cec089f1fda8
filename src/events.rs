//! State events and their downstream JSON payloads.
//!
//! `StateEvent` is what the tracker produces. `WireEvent` is what leaves the
//! process; the only transformation between the two is the station
//! projection, which drops implausible coordinates and adds distance and
//! bearing from the receiving station.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::aprs::AprsPacket;
use crate::geo::Coordinates;
use crate::stations::{PacketHistoryEntry, Station, Stats};

#[derive(Debug, Clone, PartialEq)]
pub enum StateEvent {
    StationUpdate { station: Station, is_new: bool },
    StatsUpdate { stats: Stats },
    TncConnected,
    TncDisconnected,
    RawPacket(RawPacket),
}

impl StateEvent {
    /// Short name used in logs and metric labels
    pub fn kind(&self) -> &'static str {
        match self {
            StateEvent::StationUpdate { .. } => "station_update",
            StateEvent::StatsUpdate { .. } => "stats_update",
            StateEvent::TncConnected => "kiss_connected",
            StateEvent::TncDisconnected => "kiss_disconnected",
            StateEvent::RawPacket(_) => "aprs_packet",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawPacket {
    pub source: String,
    pub destination: String,
    pub path: Vec<String>,
    pub comment: String,
    pub raw_info: String,
    pub received_at: DateTime<Utc>,
}

impl From<&AprsPacket> for RawPacket {
    fn from(packet: &AprsPacket) -> Self {
        Self {
            source: packet.source.clone(),
            destination: packet.destination.clone(),
            path: packet.path.clone(),
            comment: packet.comment.clone(),
            raw_info: packet.raw_info.clone(),
            received_at: packet.received_at,
        }
    }
}

fn iso8601(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiStation {
    pub callsign: String,
    pub coordinates: Option<Coordinates>,
    pub symbol: String,
    pub symbol_table: String,
    pub comment: String,
    pub last_heard: String,
    pub distance: Option<f64>,
    pub bearing: Option<f64>,
    pub packet_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiStats {
    pub total_stations: u64,
    pub stations_with_position: u64,
    pub total_packets: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kiss_connected: Option<bool>,
}

impl ApiStats {
    pub fn new(stats: &Stats) -> Self {
        Self {
            total_stations: stats.total_stations,
            stations_with_position: stats.stations_with_position,
            total_packets: stats.total_packets,
            kiss_connected: None,
        }
    }

    pub fn with_connection(stats: &Stats, kiss_connected: bool) -> Self {
        Self {
            kiss_connected: Some(kiss_connected),
            ..Self::new(stats)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiPacket {
    pub raw: String,
    pub source: String,
    pub destination: String,
    pub path: Vec<String>,
    pub comment: String,
    pub timestamp: String,
}

impl From<&RawPacket> for ApiPacket {
    fn from(packet: &RawPacket) -> Self {
        Self {
            raw: packet.raw_info.clone(),
            source: packet.source.clone(),
            destination: packet.destination.clone(),
            path: packet.path.clone(),
            comment: packet.comment.clone(),
            timestamp: iso8601(&packet.received_at),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiHistoryEntry {
    pub raw: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub path: Vec<String>,
    pub received_at: String,
}

impl From<&PacketHistoryEntry> for ApiHistoryEntry {
    fn from(entry: &PacketHistoryEntry) -> Self {
        Self {
            raw: entry.raw_info.clone(),
            latitude: entry.coordinates.map(|c| c.latitude),
            longitude: entry.coordinates.map(|c| c.longitude),
            path: entry.path.clone(),
            received_at: iso8601(&entry.received_at),
        }
    }
}

/// JSON payloads sent to live subscribers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum WireEvent {
    /// Snapshot sent once when a subscriber connects
    Init {
        stations: Vec<ApiStation>,
        stats: ApiStats,
    },
    StationUpdate {
        station: ApiStation,
        is_new: bool,
    },
    StatsUpdate {
        stats: ApiStats,
    },
    KissConnected,
    KissDisconnected,
    AprsPacket {
        packet: ApiPacket,
    },
}

/// Projects stations for transmission relative to the receiving station
#[derive(Debug, Clone, Copy)]
pub struct StationProjector {
    reference: Coordinates,
}

impl StationProjector {
    pub fn new(reference: Coordinates) -> Self {
        Self { reference }
    }

    pub fn project(&self, station: &Station) -> ApiStation {
        let coordinates = station.coordinates.filter(Coordinates::is_plausible);

        ApiStation {
            callsign: station.callsign.clone(),
            coordinates,
            symbol: station.symbol.clone(),
            symbol_table: station.symbol_table.clone(),
            comment: station.comment.clone(),
            last_heard: iso8601(&station.last_heard),
            distance: coordinates.map(|c| self.reference.distance_km(&c)),
            bearing: coordinates.map(|c| self.reference.bearing_to(&c)),
            packet_count: station.packet_count,
        }
    }

    pub fn to_wire(&self, event: &StateEvent) -> WireEvent {
        match event {
            StateEvent::StationUpdate { station, is_new } => WireEvent::StationUpdate {
                station: self.project(station),
                is_new: *is_new,
            },
            StateEvent::StatsUpdate { stats } => WireEvent::StatsUpdate {
                stats: ApiStats::new(stats),
            },
            StateEvent::TncConnected => WireEvent::KissConnected,
            StateEvent::TncDisconnected => WireEvent::KissDisconnected,
            StateEvent::RawPacket(packet) => WireEvent::AprsPacket {
                packet: ApiPacket::from(packet),
            },
        }
    }
}
