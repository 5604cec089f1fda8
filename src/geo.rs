//! Great-circle helpers for projecting station positions relative to the
//! receiving station.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in kilometres
const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// True when the coordinates describe a real fix.
    ///
    /// Both components must be finite and in range. Exactly (0, 0) is the
    /// "no fix" sentinel many trackers transmit before they acquire GPS lock.
    pub fn is_plausible(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
            && !(self.latitude == 0.0 && self.longitude == 0.0)
    }

    /// Haversine distance to `other` in kilometres
    pub fn distance_km(&self, other: &Coordinates) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let delta_lat = (other.latitude - self.latitude).to_radians();
        let delta_lon = (other.longitude - self.longitude).to_radians();

        let a = (delta_lat / 2.0).sin().powi(2)
            + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        EARTH_RADIUS_KM * c
    }

    /// Initial bearing towards `other`, normalised to [0, 360)
    pub fn bearing_to(&self, other: &Coordinates) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let delta_lon = (other.longitude - self.longitude).to_radians();

        let y = delta_lon.sin() * lat2.cos();
        let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * delta_lon.cos();

        (y.atan2(x).to_degrees() + 360.0) % 360.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_london_paris() {
        let london = Coordinates::new(51.5074, -0.1278);
        let paris = Coordinates::new(48.8566, 2.3522);

        let d = london.distance_km(&paris);
        assert!((d - 343.5).abs() < 1.0, "got {d}");
    }

    #[test]
    fn test_distance_to_self_is_zero() {
        let here = Coordinates::new(40.0, -75.0);
        assert!(here.distance_km(&here).abs() < 1e-9);
    }

    #[test]
    fn test_bearing_cardinal_directions() {
        let origin = Coordinates::new(10.0, 10.0);

        let north = origin.bearing_to(&Coordinates::new(11.0, 10.0));
        let east = origin.bearing_to(&Coordinates::new(10.0, 11.0));
        let south = origin.bearing_to(&Coordinates::new(9.0, 10.0));
        let west = origin.bearing_to(&Coordinates::new(10.0, 9.0));

        assert!(north.abs() < 0.01 || (north - 360.0).abs() < 0.01);
        assert!((east - 90.0).abs() < 0.5);
        assert!((south - 180.0).abs() < 0.01);
        assert!((west - 270.0).abs() < 0.5);
    }

    #[test]
    fn test_null_island_is_not_plausible() {
        assert!(!Coordinates::new(0.0, 0.0).is_plausible());
        assert!(Coordinates::new(0.0, 12.5).is_plausible());
        assert!(Coordinates::new(-33.9, 0.0).is_plausible());
    }

    #[test]
    fn test_out_of_range_is_not_plausible() {
        assert!(!Coordinates::new(90.5, 10.0).is_plausible());
        assert!(!Coordinates::new(10.0, -180.1).is_plausible());
        assert!(!Coordinates::new(f64::NAN, 10.0).is_plausible());
        assert!(!Coordinates::new(10.0, f64::INFINITY).is_plausible());
    }
}
