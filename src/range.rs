//! Distance-window filtering and ranking of venue candidates.
//!
//! Pure functions only: the caller decides what to show when nothing falls
//! inside the window (see `location::session::Listing`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::geo::{self, Compass, LatLng};
use crate::location::ResolvedLocation;

/// A venue from the external catalog. Metadata is passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl Candidate {
    pub fn new(id: impl Into<String>, lat: f64, lng: f64) -> Self {
        Self {
            id: id.into(),
            lat: Some(lat),
            lng: Some(lng),
            metadata: serde_json::Value::Null,
        }
    }

    /// Usable coordinates, if any.
    ///
    /// Missing, non-finite, out-of-domain and the (0, 0) placeholder all count
    /// as "no location data".
    pub fn coords(&self) -> Option<LatLng> {
        let (lat, lng) = (self.lat?, self.lng?);
        if lat == 0.0 && lng == 0.0 {
            return None;
        }
        LatLng::new(lat, lng).ok()
    }
}

/// A candidate with its distance and direction from the origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    #[serde(flatten)]
    pub candidate: Candidate,
    /// Kilometers, rounded to 2 decimals.
    pub distance_km: f64,
    /// Initial bearing from the origin, `[0, 360)`.
    pub bearing_deg: f64,
    pub direction: Compass,
}

impl RankedCandidate {
    pub fn measure(candidate: Candidate, coords: LatLng, origin: LatLng) -> Self {
        let bearing_deg = geo::bearing_deg(origin, coords);
        Self {
            distance_km: geo::distance_km(origin, coords),
            bearing_deg,
            direction: geo::compass_label(bearing_deg),
            candidate,
        }
    }
}

// ─── Distance range ─────────────────────────────────────────────

/// Inclusive distance window in whole kilometers, written `"<min>-<max>"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DistanceRange {
    pub min_km: u32,
    pub max_km: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeParseError {
    #[error("Invalid range '{0}'. Expected \"<min>-<max>\" in whole kilometers, e.g. \"5-10\"")]
    InvalidFormat(String),
    #[error("Invalid range '{0}': minimum exceeds maximum")]
    Inverted(String),
}

impl DistanceRange {
    pub fn new(min_km: u32, max_km: u32) -> Self {
        Self { min_km, max_km }
    }

    pub fn contains(&self, distance_km: f64) -> bool {
        distance_km >= self.min_km as f64 && distance_km <= self.max_km as f64
    }
}

impl FromStr for DistanceRange {
    type Err = RangeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || RangeParseError::InvalidFormat(s.to_string());
        let parts: Vec<&str> = s.trim().split('-').collect();
        let [min, max] = parts.as_slice() else {
            return Err(invalid());
        };
        let parse = |p: &str| -> Result<u32, RangeParseError> {
            let p = p.trim();
            if p.is_empty() || !p.chars().all(|c| c.is_ascii_digit()) {
                return Err(invalid());
            }
            p.parse().map_err(|_| invalid())
        };
        let range = Self::new(parse(*min)?, parse(*max)?);
        if range.min_km > range.max_km {
            return Err(RangeParseError::Inverted(s.to_string()));
        }
        Ok(range)
    }
}

impl fmt::Display for DistanceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min_km, self.max_km)
    }
}

impl TryFrom<String> for DistanceRange {
    type Error = RangeParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<DistanceRange> for String {
    fn from(r: DistanceRange) -> Self {
        r.to_string()
    }
}

// ─── Filtering ──────────────────────────────────────────────────

/// Result of a filter call with a known origin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangeReport {
    /// In range, nearest first.
    pub kept: Vec<RankedCandidate>,
    pub excluded_no_coords: usize,
    pub excluded_out_of_range: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterOutcome {
    /// No origin: the input, untouched and in its original order.
    Unfiltered(Vec<Candidate>),
    Ranked(RangeReport),
}

/// Keep candidates whose distance from `origin` lies inside `range`.
///
/// Returns an empty `kept` list faithfully when nothing matches.
pub fn filter_candidates(
    candidates: &[Candidate],
    origin: Option<&ResolvedLocation>,
    range: DistanceRange,
) -> FilterOutcome {
    let Some(origin) = origin else {
        return FilterOutcome::Unfiltered(candidates.to_vec());
    };
    let from = origin.coords();

    let mut report = RangeReport {
        kept: Vec::new(),
        excluded_no_coords: 0,
        excluded_out_of_range: 0,
    };

    for candidate in candidates {
        let Some(coords) = candidate.coords() else {
            report.excluded_no_coords += 1;
            continue;
        };
        let ranked = RankedCandidate::measure(candidate.clone(), coords, from);
        if range.contains(ranked.distance_km) {
            report.kept.push(ranked);
        } else {
            report.excluded_out_of_range += 1;
        }
    }

    sort_by_distance(&mut report.kept);
    FilterOutcome::Ranked(report)
}

/// Nearest first; equal distances keep input order.
pub fn sort_by_distance(ranked: &mut [RankedCandidate]) {
    ranked.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::{Position, ResolvedLocation};

    const LUCKNOW: (f64, f64) = (26.8467, 80.9462);

    fn origin() -> ResolvedLocation {
        ResolvedLocation::detected(Position::now(LUCKNOW.0, LUCKNOW.1, Some(20.0)).unwrap(), None)
    }

    /// Point `km` kilometers due north of Lucknow.
    fn north_of_origin(id: &str, km: f64) -> Candidate {
        let dlat = km / geo::EARTH_RADIUS_KM * (180.0 / std::f64::consts::PI);
        Candidate::new(id, LUCKNOW.0 + dlat, LUCKNOW.1)
    }

    fn ids(report: &RangeReport) -> Vec<&str> {
        report.kept.iter().map(|r| r.candidate.id.as_str()).collect()
    }

    fn ranked(outcome: FilterOutcome) -> RangeReport {
        match outcome {
            FilterOutcome::Ranked(r) => r,
            FilterOutcome::Unfiltered(_) => panic!("expected ranked outcome"),
        }
    }

    #[test]
    fn test_parse_range() {
        assert_eq!("5-10".parse::<DistanceRange>().unwrap(), DistanceRange::new(5, 10));
        assert_eq!(" 0 - 25 ".parse::<DistanceRange>().unwrap(), DistanceRange::new(0, 25));
        assert_eq!("7-7".parse::<DistanceRange>().unwrap(), DistanceRange::new(7, 7));
    }

    #[test]
    fn test_parse_range_malformed() {
        for bad in ["", "5", "5-", "-10", "a-b", "5-10-15", "5.5-10", "-5-10", "5_10", "+5-10"] {
            assert!(
                matches!(bad.parse::<DistanceRange>(), Err(RangeParseError::InvalidFormat(_))),
                "'{}' should be rejected",
                bad
            );
        }
        assert_eq!(
            "10-5".parse::<DistanceRange>(),
            Err(RangeParseError::Inverted("10-5".into()))
        );
    }

    #[test]
    fn test_range_serde_as_string() {
        let r: DistanceRange = serde_json::from_str("\"5-10\"").unwrap();
        assert_eq!(r, DistanceRange::new(5, 10));
        assert_eq!(serde_json::to_string(&r).unwrap(), "\"5-10\"");
        assert!(serde_json::from_str::<DistanceRange>("\"ten\"").is_err());
    }

    #[test]
    fn test_filter_keeps_inclusive_window_sorted() {
        let candidates = vec![
            north_of_origin("twelve", 12.0),
            north_of_origin("eight", 8.0),
            north_of_origin("three", 3.0),
            north_of_origin("five", 5.0),
            north_of_origin("ten", 10.0),
            north_of_origin("six", 6.0),
        ];
        let report = ranked(filter_candidates(&candidates, Some(&origin()), "5-10".parse().unwrap()));
        assert_eq!(ids(&report), vec!["five", "six", "eight", "ten"]);
        assert_eq!(report.excluded_out_of_range, 2);
        assert_eq!(report.excluded_no_coords, 0);
        for r in &report.kept {
            assert!((5.0..=10.0).contains(&r.distance_km));
        }
    }

    #[test]
    fn test_same_coordinates_distance_zero() {
        let candidates = vec![Candidate::new("here", LUCKNOW.0, LUCKNOW.1)];
        let report = ranked(filter_candidates(&candidates, Some(&origin()), "0-10".parse().unwrap()));
        assert_eq!(report.kept.len(), 1);
        assert_eq!(report.kept[0].distance_km, 0.0);
    }

    #[test]
    fn test_no_origin_returns_input_unchanged() {
        let candidates = vec![
            north_of_origin("far", 500.0),
            Candidate { lat: None, ..north_of_origin("nowhere", 1.0) },
            north_of_origin("near", 1.0),
        ];
        let outcome = filter_candidates(&candidates, None, "5-10".parse().unwrap());
        assert_eq!(outcome, FilterOutcome::Unfiltered(candidates));
    }

    #[test]
    fn test_nothing_in_range_is_empty_not_error() {
        let candidates = vec![north_of_origin("far", 50.0)];
        let report = ranked(filter_candidates(&candidates, Some(&origin()), "0-10".parse().unwrap()));
        assert!(report.kept.is_empty());
        assert_eq!(report.excluded_out_of_range, 1);
    }

    #[test]
    fn test_invalid_coordinates_counted_separately() {
        let candidates = vec![
            Candidate { lat: None, ..Candidate::new("missing", 0.0, 0.0) },
            Candidate::new("null-island", 0.0, 0.0),
            Candidate::new("nan", f64::NAN, 80.0),
            Candidate::new("out-of-domain", 120.0, 80.0),
            north_of_origin("ok", 2.0),
        ];
        let report = ranked(filter_candidates(&candidates, Some(&origin()), "0-10".parse().unwrap()));
        assert_eq!(ids(&report), vec!["ok"]);
        assert_eq!(report.excluded_no_coords, 4);
    }

    #[test]
    fn test_ranked_carries_bearing_and_metadata() {
        let mut c = north_of_origin("cafe", 3.0);
        c.metadata = serde_json::json!({"name": "Cafe"});
        let report = ranked(filter_candidates(&[c], Some(&origin()), "0-10".parse().unwrap()));
        let r = &report.kept[0];
        assert!(r.bearing_deg < 1.0 || r.bearing_deg > 359.0);
        assert_eq!(r.direction, Compass::N);
        assert_eq!(r.candidate.metadata["name"], "Cafe");
    }

    #[test]
    fn test_equal_distances_keep_input_order() {
        let candidates = vec![
            Candidate::new("b", LUCKNOW.0, LUCKNOW.1),
            Candidate::new("a", LUCKNOW.0, LUCKNOW.1),
        ];
        let report = ranked(filter_candidates(&candidates, Some(&origin()), "0-1".parse().unwrap()));
        assert_eq!(ids(&report), vec!["b", "a"]);
    }
}
