//! Canonical position sample and great-circle geometry.

use serde::{Deserialize, Serialize};

/// Mean Earth radius used for all distance computations (meters).
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A normalized position sample.
///
/// Latitude must be within [-90, 90] and longitude within [-180, 180].
/// This is a precondition and is not validated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    /// Degrees north
    pub latitude: f64,

    /// Degrees east
    pub longitude: f64,

    /// Horizontal accuracy radius in meters
    pub accuracy: f64,

    /// Ground speed in m/s, if the producer reported one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,

    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl Position {
    /// Creates a position without speed.
    pub fn new(latitude: f64, longitude: f64, accuracy: f64, timestamp: i64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy,
            speed: None,
            timestamp,
        }
    }

    /// Sets the ground speed (m/s).
    pub fn with_speed(mut self, speed_mps: f64) -> Self {
        self.speed = Some(speed_mps);
        self
    }

    /// Great-circle distance to `other` in meters.
    pub fn distance_to(&self, other: &Position) -> f64 {
        haversine_m(self.latitude, self.longitude, other.latitude, other.longitude)
    }

    /// The point reached by travelling `distance_m` from here along the
    /// initial bearing `bearing_deg` (0 = north, 90 = east).
    ///
    /// Accuracy, speed and timestamp are carried over unchanged.
    pub fn destination(&self, bearing_deg: f64, distance_m: f64) -> Position {
        let (lat, lon) = destination_point(self.latitude, self.longitude, bearing_deg, distance_m);
        Position {
            latitude: lat,
            longitude: lon,
            ..*self
        }
    }
}

/// Haversine distance between two points given in degrees, in meters.
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).max(0.0).sqrt());

    EARTH_RADIUS_M * c
}

/// Direct geodesic problem on a sphere: start point, bearing and distance
/// to end point. Returns `(lat, lon)` in degrees.
pub fn destination_point(lat: f64, lon: f64, bearing_deg: f64, distance_m: f64) -> (f64, f64) {
    let delta = distance_m / EARTH_RADIUS_M;
    let theta = bearing_deg.to_radians();
    let phi1 = lat.to_radians();
    let lambda1 = lon.to_radians();

    let sin_phi2 = phi1.sin() * delta.cos() + phi1.cos() * delta.sin() * theta.cos();
    let phi2 = sin_phi2.asin();
    let y = theta.sin() * delta.sin() * phi1.cos();
    let x = delta.cos() - phi1.sin() * sin_phi2;
    let lambda2 = lambda1 + y.atan2(x);

    // Normalize longitude into [-180, 180)
    let lon2 = (lambda2.to_degrees() + 540.0) % 360.0 - 180.0;
    (phi2.to_degrees(), lon2)
}

/// Total path length of a sequence of positions, in meters.
pub fn path_length_m(points: &[Position]) -> f64 {
    points.windows(2).map(|w| w[0].distance_to(&w[1])).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_haversine_zero() {
        assert_eq!(haversine_m(50.0, 30.0, 50.0, 30.0), 0.0);
    }

    #[test]
    fn test_haversine_small_latitude_step() {
        // 0.00005 deg of latitude is ~5.56 m anywhere on the sphere
        let d = haversine_m(50.0, 30.0, 50.00005, 30.0);
        assert_relative_eq!(d, 5.5597, epsilon = 1e-3);
    }

    #[test]
    fn test_haversine_one_degree_longitude_at_equator() {
        let d = haversine_m(0.0, 0.0, 0.0, 1.0);
        assert_relative_eq!(d, EARTH_RADIUS_M * std::f64::consts::PI / 180.0, epsilon = 1e-6);
    }

    #[test]
    fn test_destination_roundtrips_distance() {
        let origin = Position::new(50.4501, 30.5234, 5.0, 0);
        for bearing in [0.0, 45.0, 90.0, 180.0, 271.0] {
            let dest = origin.destination(bearing, 501.0);
            assert_relative_eq!(origin.distance_to(&dest), 501.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_destination_wraps_antimeridian() {
        let (_, lon) = destination_point(0.0, 179.9999, 90.0, 1_000.0);
        assert!(lon < -179.0);
    }

    #[test]
    fn test_path_length() {
        let a = Position::new(50.0, 30.0, 5.0, 0);
        let b = Position::new(50.00005, 30.0, 5.0, 1);
        let c = Position::new(50.0001, 30.0, 5.0, 2);
        assert_relative_eq!(path_length_m(&[a, b, c]), 11.1195, epsilon = 1e-3);
        assert_eq!(path_length_m(&[a]), 0.0);
    }

    #[test]
    fn test_position_serializes_camel_case() {
        let json = serde_json::to_value(Position::new(1.0, 2.0, 3.0, 4).with_speed(2.5)).unwrap();
        assert_eq!(json["latitude"], 1.0);
        assert_eq!(json["speed"], 2.5);
        assert_eq!(json["timestamp"], 4);
    }
}
