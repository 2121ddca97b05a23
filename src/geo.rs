//! Great-circle geometry on a spherical Earth.
//!
//! Distances use the Haversine formula with a mean radius of 6371 km and are
//! rounded to two decimals, so `distance_km(a, b) == distance_km(b, a)` holds
//! exactly and a point is always `0.00` km from itself.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Mean Earth radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A validated latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("Invalid coordinates ({lat}, {lng}). Lat: -90..90, Lng: -180..180")]
pub struct InvalidCoordinates {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Result<Self, InvalidCoordinates> {
        if is_valid(lat, lng) {
            Ok(Self { lat, lng })
        } else {
            Err(InvalidCoordinates { lat, lng })
        }
    }
}

impl fmt::Display for LatLng {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format_coords(self.lat, self.lng))
    }
}

/// True when both components are finite and inside the physical domain.
pub fn is_valid(lat: f64, lng: f64) -> bool {
    lat.is_finite()
        && lng.is_finite()
        && (-90.0..=90.0).contains(&lat)
        && (-180.0..=180.0).contains(&lng)
}

/// One of the eight principal compass points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Compass {
    N,
    NE,
    E,
    SE,
    S,
    SW,
    W,
    NW,
}

const COMPASS_POINTS: [Compass; 8] = [
    Compass::N,
    Compass::NE,
    Compass::E,
    Compass::SE,
    Compass::S,
    Compass::SW,
    Compass::W,
    Compass::NW,
];

impl fmt::Display for Compass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::N => "N",
            Self::NE => "NE",
            Self::E => "E",
            Self::SE => "SE",
            Self::S => "S",
            Self::SW => "SW",
            Self::W => "W",
            Self::NW => "NW",
        };
        f.write_str(label)
    }
}

/// Great-circle distance in kilometers, rounded to 2 decimals.
pub fn distance_km(a: LatLng, b: LatLng) -> f64 {
    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let d_phi = (b.lat - a.lat).to_radians();
    let d_lambda = (b.lng - a.lng).to_radians();

    let h = (d_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    // Rounding noise can push h a hair past 1 for antipodal points.
    let c = 2.0 * h.sqrt().min(1.0).asin();

    round2(EARTH_RADIUS_KM * c)
}

/// Initial compass bearing from `a` towards `b`, in `[0, 360)`.
pub fn bearing_deg(a: LatLng, b: LatLng) -> f64 {
    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let d_lambda = (b.lng - a.lng).to_radians();

    let y = d_lambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * d_lambda.cos();

    normalize_degrees(y.atan2(x).to_degrees())
}

/// Map a bearing onto the nearest of the eight compass points.
pub fn compass_label(bearing: f64) -> Compass {
    let sector = (bearing / 45.0).round() as i64;
    COMPASS_POINTS[sector.rem_euclid(8) as usize]
}

fn normalize_degrees(deg: f64) -> f64 {
    let d = deg.rem_euclid(360.0);
    // rem_euclid of a tiny negative value rounds up to exactly 360.0
    if d >= 360.0 {
        0.0
    } else {
        d
    }
}

pub(crate) fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Format coordinates for display: `26.8467°N, 80.9462°E`.
pub fn format_coords(lat: f64, lng: f64) -> String {
    let ns = if lat >= 0.0 { 'N' } else { 'S' };
    let ew = if lng >= 0.0 { 'E' } else { 'W' };
    format!("{:.4}\u{00B0}{}, {:.4}\u{00B0}{}", lat.abs(), ns, lng.abs(), ew)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn p(lat: f64, lng: f64) -> LatLng {
        LatLng::new(lat, lng).unwrap()
    }

    fn sample_points() -> Vec<LatLng> {
        let mut pts = Vec::new();
        for lat in [-89.5, -45.0, -12.3, 0.0, 26.8467, 59.3293, 90.0] {
            for lng in [-180.0, -74.006, -0.1278, 0.0, 80.9462, 139.65, 180.0] {
                pts.push(p(lat, lng));
            }
        }
        pts
    }

    #[test]
    fn test_distance_to_self_is_zero() {
        for a in sample_points() {
            assert_eq!(distance_km(a, a), 0.0);
        }
    }

    #[test]
    fn test_distance_symmetric() {
        let pts = sample_points();
        for a in &pts {
            for b in &pts {
                assert_eq!(distance_km(*a, *b), distance_km(*b, *a));
            }
        }
    }

    #[test]
    fn test_bearing_in_range() {
        let pts = sample_points();
        for a in &pts {
            for b in &pts {
                let brg = bearing_deg(*a, *b);
                assert!((0.0..360.0).contains(&brg), "bearing {} out of range", brg);
            }
        }
    }

    #[test]
    fn test_known_distance_lucknow_delhi() {
        // Lucknow → New Delhi is roughly 417 km great-circle.
        let d = distance_km(p(26.8467, 80.9462), p(28.6139, 77.2090));
        assert!((410.0..425.0).contains(&d), "got {}", d);
    }

    #[test]
    fn test_distance_rounded_to_two_decimals() {
        let d = distance_km(p(26.8467, 80.9462), p(26.8500, 80.9500));
        assert_abs_diff_eq!(d, round2(d));
    }

    #[test]
    fn test_antipodal_distance() {
        let d = distance_km(p(0.0, 0.0), p(0.0, 180.0));
        assert_abs_diff_eq!(d, 20015.09, epsilon = 0.01);
    }

    #[test]
    fn test_bearing_cardinal_directions() {
        let origin = p(0.0, 0.0);
        assert_abs_diff_eq!(bearing_deg(origin, p(1.0, 0.0)), 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(bearing_deg(origin, p(0.0, 1.0)), 90.0, epsilon = 1e-9);
        assert_abs_diff_eq!(bearing_deg(origin, p(-1.0, 0.0)), 180.0, epsilon = 1e-9);
        assert_abs_diff_eq!(bearing_deg(origin, p(0.0, -1.0)), 270.0, epsilon = 1e-9);
    }

    #[test]
    fn test_bearing_not_symmetric() {
        let a = p(26.8467, 80.9462);
        let b = p(28.6139, 77.2090);
        assert!((bearing_deg(a, b) - bearing_deg(b, a)).abs() > 1.0);
    }

    #[test]
    fn test_compass_labels() {
        assert_eq!(compass_label(0.0), Compass::N);
        assert_eq!(compass_label(22.4), Compass::N);
        assert_eq!(compass_label(22.6), Compass::NE);
        assert_eq!(compass_label(90.0), Compass::E);
        assert_eq!(compass_label(200.0), Compass::S);
        assert_eq!(compass_label(315.0), Compass::NW);
        assert_eq!(compass_label(350.0), Compass::N);
        assert_eq!(Compass::SW.to_string(), "SW");
    }

    #[test]
    fn test_latlng_validation() {
        assert!(LatLng::new(91.0, 0.0).is_err());
        assert!(LatLng::new(0.0, -180.5).is_err());
        assert!(LatLng::new(f64::NAN, 0.0).is_err());
        assert!(LatLng::new(-90.0, 180.0).is_ok());
    }

    #[test]
    fn test_format_coords() {
        assert_eq!(format_coords(26.8467, 80.9462), "26.8467°N, 80.9462°E");
        assert_eq!(format_coords(-33.8688, -70.6693), "33.8688°S, 70.6693°W");
    }
}
