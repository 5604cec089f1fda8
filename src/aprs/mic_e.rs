//! Mic-E position decoding.
//!
//! Latitude digits and three flag bits travel in the six destination
//! characters; longitude, speed and course are packed into bytes 1-6 of the
//! information field, each offset by 28.

use once_cell::sync::Lazy;
use regex::Regex;

use super::position::decode_base91;
use super::{KNOTS_TO_KMH, Position, known_course};

/// Altitude as three base-91 digits followed by '}', in metres above -10 km
static ALTITUDE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"([!-{]{3})\}").unwrap());

const BYTE_OFFSET: i32 = 28;

/// One decoded destination character
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DestinationDigit {
    digit: u8,
    /// Latitude hemisphere bit: 1 is north
    north: u8,
    /// Longitude offset / hemisphere bit
    lon_flag: u8,
}

fn decode_destination_char(c: u8) -> Option<DestinationDigit> {
    let (digit, north, lon_flag) = match c {
        b'0'..=b'9' => (c - b'0', 0, 0),
        b'A'..=b'J' => (c - b'A', 0, 1),
        b'K' => (0, 0, 1),
        b'L' => (0, 0, 0),
        b'P'..=b'Y' => (c - b'P', 1, 1),
        b'Z' => (0, 1, 1),
        _ => return None,
    };
    Some(DestinationDigit {
        digit,
        north,
        lon_flag,
    })
}

/// Decode the position of a Mic-E packet.
///
/// Returns `None` when the destination is shorter than six characters or
/// contains a character outside the Mic-E table, or the information field is
/// too short to carry longitude and symbol.
pub fn decode(destination: &str, info: &[u8]) -> Option<Position> {
    if destination.len() < 6 || info.len() < 9 {
        return None;
    }

    let mut digits = [DestinationDigit {
        digit: 0,
        north: 0,
        lon_flag: 0,
    }; 6];
    for (slot, &c) in digits.iter_mut().zip(destination.as_bytes()) {
        *slot = decode_destination_char(c)?;
    }

    let d = |i: usize| f64::from(digits[i].digit);
    let lat_degrees = d(0) * 10.0 + d(1);
    let lat_minutes = d(2) * 10.0 + d(3) + (d(4) * 10.0 + d(5)) / 100.0;
    let mut latitude = lat_degrees + lat_minutes / 60.0;
    if digits[3].north == 0 {
        latitude = -latitude;
    }

    let byte = |i: usize| i32::from(info[i]) - BYTE_OFFSET;

    let mut lon_degrees = byte(1);
    if digits[4].lon_flag == 1 {
        lon_degrees += 100;
    }
    if (180..=189).contains(&lon_degrees) {
        lon_degrees -= 80;
    }
    if (190..=199).contains(&lon_degrees) {
        lon_degrees -= 190;
    }

    let mut lon_minutes = byte(2);
    if lon_minutes >= 60 {
        lon_minutes -= 60;
    }
    let lon_hundredths = byte(3);

    let mut longitude =
        f64::from(lon_degrees) + (f64::from(lon_minutes) + f64::from(lon_hundredths) / 100.0) / 60.0;
    if digits[5].lon_flag == 0 {
        longitude = -longitude;
    }

    let mut position = Position::new(latitude, longitude);

    // Speed is SP*10 + DC/10 knots, course is (DC%10)*100 + SE degrees
    let (sp, dc, se) = (byte(4), byte(5), byte(6));
    if sp >= 0 && dc >= 0 && se >= 0 {
        let mut knots = sp * 10 + dc / 10;
        if knots >= 800 {
            knots -= 800;
        }
        let mut course = (dc % 10) * 100 + se;
        if course >= 400 {
            course -= 400;
        }
        position.speed = Some(f64::from(knots) * KNOTS_TO_KMH);
        position.course = known_course(i64::from(course));
    }

    let comment = String::from_utf8_lossy(&info[9..]);
    position.altitude = ALTITUDE_RE
        .captures(&comment)
        .map(|caps| decode_base91(&caps[1]) as f64 - 10000.0);

    Some(position)
}
