//! Uncompressed (`DDMM.hhN/DDDMM.hhW`) and base-91 compressed position formats.

use once_cell::sync::Lazy;
use regex::Regex;

use super::{FEET_TO_METRES, KNOTS_TO_KMH, Position, known_course};

static UNCOMPRESSED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([0-9]{2})([0-9]{2}\.[0-9]+)([NS])([/\\])([0-9]{3})([0-9]{2}\.[0-9]+)([EW])")
        .unwrap()
});

static COMPRESSED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([/\\])([!-{]{4})([!-{]{4})(.)").unwrap());

/// CSE/SPD data extension immediately following the symbol code
static COURSE_SPEED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([0-9]{3})/([0-9]{3})").unwrap());

/// Altitude in feet anywhere in the comment
static ALTITUDE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"/A=(-[0-9]{5}|[0-9]{6})").unwrap());

/// Latitude units per degree in the compressed format
const COMPRESSED_LAT_SCALE: f64 = 380926.0;
/// Longitude units per degree in the compressed format
const COMPRESSED_LON_SCALE: f64 = 190463.0;

/// A position found in an information field, with the symbol and the free
/// text that follows it
#[derive(Debug, Clone, PartialEq)]
pub struct PositionReport {
    pub position: Position,
    pub symbol_table: char,
    /// `None` when the field ends right after the coordinates
    pub symbol_code: Option<char>,
    pub comment: String,
}

pub fn decode_uncompressed(text: &str) -> Option<PositionReport> {
    let caps = UNCOMPRESSED_RE.captures(text)?;

    let lat_degrees: f64 = caps[1].parse().ok()?;
    let lat_minutes: f64 = caps[2].parse().ok()?;
    let lon_degrees: f64 = caps[5].parse().ok()?;
    let lon_minutes: f64 = caps[6].parse().ok()?;

    let mut latitude = lat_degrees + lat_minutes / 60.0;
    if &caps[3] == "S" {
        latitude = -latitude;
    }
    let mut longitude = lon_degrees + lon_minutes / 60.0;
    if &caps[7] == "W" {
        longitude = -longitude;
    }

    let symbol_table = caps[4].chars().next()?;
    let mut rest = text[caps.get(0)?.end()..].chars();
    let symbol_code = rest.next();
    let tail = rest.as_str();

    let mut position = Position::new(latitude, longitude);
    if let Some(ext) = COURSE_SPEED_RE.captures(tail) {
        position.course = ext[1].parse().ok().and_then(known_course);
        position.speed = ext[2].parse::<f64>().ok().map(|knots| knots * KNOTS_TO_KMH);
    }
    position.altitude = altitude_from_comment(tail);

    Some(PositionReport {
        position,
        symbol_table,
        symbol_code,
        comment: tail.trim().to_string(),
    })
}

pub fn decode_compressed(text: &str) -> Option<PositionReport> {
    let caps = COMPRESSED_RE.captures(text)?;

    let lat_value = decode_base91(&caps[2]) as f64;
    let lon_value = decode_base91(&caps[3]) as f64;
    let mut position = Position::new(
        90.0 - lat_value / COMPRESSED_LAT_SCALE,
        -180.0 + lon_value / COMPRESSED_LON_SCALE,
    );

    let symbol_table = caps[1].chars().next()?;
    let symbol_code = caps[4].chars().next();

    let mut rest = text[caps.get(0)?.end()..].chars();
    let cs: Vec<char> = rest.by_ref().take(3).collect();
    apply_compressed_extension(&mut position, &cs);

    Some(PositionReport {
        position,
        symbol_table,
        symbol_code,
        comment: rest.as_str().trim().to_string(),
    })
}

/// Big-endian base-91 with '!' as zero
pub fn decode_base91(chars: &str) -> u64 {
    chars
        .bytes()
        .fold(0u64, |value, b| value * 91 + u64::from(b.saturating_sub(33)))
}

/// Interpret the `cs` byte pair and compression-type byte following a
/// compressed position.
fn apply_compressed_extension(position: &mut Position, cs: &[char]) {
    let (Some(&c), Some(&s)) = (cs.first(), cs.get(1)) else {
        return;
    };
    // Space means no course/speed/altitude data
    if c == ' ' {
        return;
    }

    let c_value = i64::from(u32::from(c)) - 33;
    let s_value = i64::from(u32::from(s)) - 33;
    if !(0..=90).contains(&c_value) || !(0..=90).contains(&s_value) {
        return;
    }

    // Bits 3-4 of the compression type select the NMEA source; 0b10 is GGA,
    // in which case cs carries altitude rather than course/speed.
    let from_gga = cs
        .get(2)
        .map(|&t| i64::from(u32::from(t)) - 33)
        .filter(|t| (0..=90).contains(t))
        .is_some_and(|t| (t >> 3) & 0x03 == 0x02);

    if from_gga {
        let feet = 1.002f64.powi((c_value * 91 + s_value) as i32);
        position.altitude = Some(feet * FEET_TO_METRES);
    } else if c_value <= 89 {
        position.course = known_course(c_value * 4);
        position.speed = Some((1.08f64.powi(s_value as i32) - 1.0) * KNOTS_TO_KMH);
    }
    // c == '{' is a pre-calculated radio range, not a position attribute
}

pub(crate) fn altitude_from_comment(comment: &str) -> Option<f64> {
    let caps = ALTITUDE_RE.captures(comment)?;
    let feet: f64 = caps[1].parse().ok()?;
    Some(feet * FEET_TO_METRES)
}
