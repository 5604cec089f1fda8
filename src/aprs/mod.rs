//! APRS information-field parsing.
//!
//! `parse` never fails: content it cannot classify comes back as
//! `DataType::Unknown` with the raw text preserved, and a position report
//! whose coordinates cannot be decoded is still a `Position` packet, just
//! without a `position`.

pub mod mic_e;
pub mod position;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::ax25::Ax25Frame;
use crate::geo::Coordinates;

pub const DEFAULT_SYMBOL_CODE: char = '-';
pub const DEFAULT_SYMBOL_TABLE: char = '/';

pub(crate) const KNOTS_TO_KMH: f64 = 1.852;
pub(crate) const FEET_TO_METRES: f64 = 0.3048;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Position,
    Status,
    Message,
    Telemetry,
    Weather,
    Unknown,
}

impl DataType {
    /// Classify by the data type identifier (first byte of the information field)
    pub fn from_identifier(identifier: Option<u8>) -> Self {
        match identifier {
            Some(b'!' | b'=' | b'/' | b'@' | b'`' | b'\'') => DataType::Position,
            Some(b'>') => DataType::Status,
            Some(b':') => DataType::Message,
            Some(b'T') => DataType::Telemetry,
            Some(b'_') => DataType::Weather,
            _ => DataType::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Position => "position",
            DataType::Status => "status",
            DataType::Message => "message",
            DataType::Telemetry => "telemetry",
            DataType::Weather => "weather",
            DataType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mic-E current (`) and old (') data type identifiers
fn is_mic_e_identifier(identifier: u8) -> bool {
    identifier == b'`' || identifier == b'\''
}

/// A decoded position. Altitude is in metres, course in degrees true and
/// speed in km/h.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude: None,
            course: None,
            speed: None,
        }
    }

    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }
}

/// APRS uses 0 for "course unknown" and 360 for due north
pub(crate) fn known_course(degrees: i64) -> Option<f64> {
    (1..=360).contains(&degrees).then_some(degrees as f64)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AprsPacket {
    pub source: String,
    pub destination: String,
    pub path: Vec<String>,
    pub data_type: DataType,
    pub position: Option<Position>,
    pub symbol_code: char,
    pub symbol_table: char,
    pub comment: String,
    pub raw_info: String,
    pub received_at: DateTime<Utc>,
}

impl AprsPacket {
    /// Parse the information field of a decoded UI frame and attach the
    /// frame's addressing.
    pub fn from_frame(frame: &Ax25Frame<'_>) -> Self {
        let mut packet = parse(frame.info, &frame.destination.callsign);
        packet.source = frame.source.to_string();
        packet.destination = frame.destination.to_string();
        packet.path = frame.path();
        packet
    }

    pub fn coordinates(&self) -> Option<Coordinates> {
        self.position.as_ref().map(Position::coordinates)
    }
}

/// Parse an information field. `destination` is the destination callsign
/// without SSID; Mic-E packets carry their latitude in it.
///
/// The returned packet has no source or path; see [`AprsPacket::from_frame`].
pub fn parse(info: &[u8], destination: &str) -> AprsPacket {
    let raw_info = String::from_utf8_lossy(info).into_owned();
    let data_type = DataType::from_identifier(info.first().copied());

    let mut position = None;
    let mut symbol_code = DEFAULT_SYMBOL_CODE;
    let mut symbol_table = DEFAULT_SYMBOL_TABLE;
    let mut comment = String::new();

    match data_type {
        DataType::Position if is_mic_e_identifier(info[0]) => {
            position = mic_e::decode(destination, info);
            if info.len() > 8 {
                symbol_code = info[7] as char;
                symbol_table = info[8] as char;
                comment = String::from_utf8_lossy(&info[9..]).trim().to_string();
            }
        }
        DataType::Position => {
            let report = position::decode_uncompressed(&raw_info)
                .or_else(|| position::decode_compressed(&raw_info));
            if let Some(report) = report {
                position = Some(report.position);
                symbol_table = report.symbol_table;
                if let Some(code) = report.symbol_code {
                    symbol_code = code;
                }
                comment = report.comment;
            }
        }
        _ => {
            let mut chars = raw_info.chars();
            chars.next();
            comment = chars.as_str().trim().to_string();
        }
    }

    AprsPacket {
        source: String::new(),
        destination: destination.to_string(),
        path: Vec::new(),
        data_type,
        position,
        symbol_code,
        symbol_table,
        comment,
        raw_info,
        received_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ax25::{self, Ax25Address};

    #[test]
    fn test_classification_by_identifier() {
        let cases: [(&[u8], DataType); 12] = [
            (b"!", DataType::Position),
            (b"=", DataType::Position),
            (b"/", DataType::Position),
            (b"@", DataType::Position),
            (b"`", DataType::Position),
            (b"'", DataType::Position),
            (b">", DataType::Status),
            (b":", DataType::Message),
            (b"T", DataType::Telemetry),
            (b"_", DataType::Weather),
            (b"$", DataType::Unknown),
            (b"", DataType::Unknown),
        ];
        for (info, expected) in cases {
            assert_eq!(
                DataType::from_identifier(info.first().copied()),
                expected,
                "identifier {info:?}"
            );
        }
    }

    #[test]
    fn test_uncompressed_position_example() {
        let packet = parse(b"!5144.50N/00009.00E-test", "APRS");

        assert_eq!(packet.data_type, DataType::Position);
        let position = packet.position.unwrap();
        assert!((position.latitude - 51.7417).abs() < 0.0001);
        assert!((position.longitude - 0.15).abs() < 0.0001);
        assert_eq!(packet.symbol_code, '-');
        assert_eq!(packet.symbol_table, '/');
        assert_eq!(packet.comment, "test");
        assert_eq!(packet.raw_info, "!5144.50N/00009.00E-test");
    }

    #[test]
    fn test_timestamped_position_with_alternate_table() {
        let packet = parse(b"@092345z4903.50S\\07201.75W#  digi ", "APRS");

        let position = packet.position.unwrap();
        assert!((position.latitude + 49.058333).abs() < 0.0001);
        assert!((position.longitude + 72.029167).abs() < 0.0001);
        assert_eq!(packet.symbol_table, '\\');
        assert_eq!(packet.symbol_code, '#');
        assert_eq!(packet.comment, "digi");
    }

    #[test]
    fn test_compressed_position_packet() {
        let packet = parse(b"=/5L!!<*e7>7P[Mobile", "APRS");

        let position = packet.position.unwrap();
        assert!((position.latitude - 49.5).abs() < 0.0001);
        assert!((position.longitude + 72.75).abs() < 0.0001);
        assert_eq!(packet.symbol_table, '/');
        assert_eq!(packet.symbol_code, '>');
        assert_eq!(packet.comment, "Mobile");
    }

    #[test]
    fn test_undecodable_position_is_still_a_position_packet() {
        let packet = parse(b"!garbage", "APRS");

        assert_eq!(packet.data_type, DataType::Position);
        assert!(packet.position.is_none());
        assert_eq!(packet.symbol_code, DEFAULT_SYMBOL_CODE);
        assert_eq!(packet.symbol_table, DEFAULT_SYMBOL_TABLE);
        assert_eq!(packet.comment, "");
    }

    #[test]
    fn test_status_comment_is_rest_of_field() {
        let packet = parse(b">  Net tonight 2000z ", "APRS");

        assert_eq!(packet.data_type, DataType::Status);
        assert!(packet.position.is_none());
        assert_eq!(packet.comment, "Net tonight 2000z");
        assert_eq!(packet.symbol_code, '-');
        assert_eq!(packet.symbol_table, '/');
    }

    #[test]
    fn test_unknown_content_is_preserved() {
        let packet = parse(b"$GPRMC,123519,A", "GPS");

        assert_eq!(packet.data_type, DataType::Unknown);
        assert_eq!(packet.raw_info, "$GPRMC,123519,A");
        assert_eq!(packet.comment, "GPRMC,123519,A");
    }

    #[test]
    fn test_empty_info_is_unknown() {
        let packet = parse(b"", "APRS");

        assert_eq!(packet.data_type, DataType::Unknown);
        assert_eq!(packet.raw_info, "");
        assert_eq!(packet.comment, "");
    }

    #[test]
    fn test_mic_e_packet_symbol_and_comment() {
        let packet = parse(b"`(+N(PI>/ hello ", "423PUP");

        assert!(packet.position.is_some());
        assert_eq!(packet.symbol_code, '>');
        assert_eq!(packet.symbol_table, '/');
        assert_eq!(packet.comment, "hello");
    }

    #[test]
    fn test_short_mic_e_keeps_default_symbol() {
        let packet = parse(b"`(+N(PI>", "423PUP");

        assert_eq!(packet.data_type, DataType::Position);
        assert!(packet.position.is_none());
        assert_eq!(packet.symbol_code, '-');
        assert_eq!(packet.comment, "");
    }

    #[test]
    fn test_from_frame_attaches_addressing() {
        let bytes = ax25::encode_ui_frame(
            &Ax25Address::new("APRS", 0),
            &Ax25Address::new("N0CALL", 7),
            &[Ax25Address::new("WIDE1", 1)],
            b"!5144.50N/00009.00E-test",
        );
        let frame = ax25::decode(&bytes).unwrap();
        let packet = AprsPacket::from_frame(&frame);

        assert_eq!(packet.source, "N0CALL-7");
        assert_eq!(packet.destination, "APRS");
        assert_eq!(packet.path, vec!["WIDE1-1"]);
        assert!(packet.coordinates().is_some());
    }

    #[test]
    fn test_known_course() {
        assert_eq!(known_course(0), None);
        assert_eq!(known_course(360), Some(360.0));
        assert_eq!(known_course(88), Some(88.0));
        assert_eq!(known_course(361), None);
    }
}
