//! Core types for the location subsystem.

use crate::geo::{self, InvalidCoordinates, LatLng};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A single sensor reading. Immutable once captured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub coords: LatLng,
    /// Reported horizontal accuracy radius in meters, if the sensor gave one.
    #[serde(default)]
    pub accuracy_m: Option<f64>,
    pub captured_at: DateTime<Utc>,
}

impl Position {
    pub fn new(
        lat: f64,
        lng: f64,
        accuracy_m: Option<f64>,
        captured_at: DateTime<Utc>,
    ) -> Result<Self, InvalidCoordinates> {
        let coords = LatLng::new(lat, lng)?;
        // A negative or non-finite accuracy carries no information.
        let accuracy_m = accuracy_m.filter(|a| a.is_finite() && *a >= 0.0);
        Ok(Self { coords, accuracy_m, captured_at })
    }

    /// Position captured now.
    pub fn now(lat: f64, lng: f64, accuracy_m: Option<f64>) -> Result<Self, InvalidCoordinates> {
        Self::new(lat, lng, accuracy_m, Utc::now())
    }
}

/// How much a geocoding source is trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTrust {
    /// Commercial mapping service.
    High,
    /// Secondary or open-data service.
    Open,
    #[default]
    Unrated,
}

/// An address produced by one provider call.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GeocodedAddress {
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    /// ISO 3166-1 alpha-2 country code (e.g. "IN", "US")
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    /// Provider id that produced this address ("google", "nominatim", "manual", ...)
    pub source: String,
    pub trust: SourceTrust,
}

impl GeocodedAddress {
    /// "City, Region, Country" from whichever parts are present.
    pub fn label(&self) -> String {
        let parts: Vec<&str> = [&self.city, &self.region, &self.country]
            .into_iter()
            .filter_map(|p| p.as_deref())
            .filter(|s| !s.trim().is_empty())
            .collect();
        if parts.is_empty() {
            self.display_name.clone().unwrap_or_default()
        } else {
            parts.join(", ")
        }
    }
}

/// Something noticed while scoring that lowers trust in an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityIssue {
    /// Sensor accuracy worse than 5 km.
    LowAccuracy,
    AccuracyUnknown,
    MissingCity,
}

/// A provider result with its confidence score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredAddress {
    pub address: GeocodedAddress,
    /// 0..=100
    pub confidence: u8,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<QualityIssue>,
}

/// How a location was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocationSource {
    Detected,
    Manual,
    Fallback,
}

impl fmt::Display for LocationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Detected => write!(f, "Detected"),
            Self::Manual => write!(f, "Manual"),
            Self::Fallback => write!(f, "Default"),
        }
    }
}

/// Address attached to a resolved location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LocationAddress {
    /// Picked by reconciliation, carries a confidence.
    Scored(ScoredAddress),
    /// Supplied by the user or configuration; confidence does not apply.
    Given(GeocodedAddress),
}

/// The authoritative "where is the user" value.
///
/// Only ever replaced as a whole. Use the constructors so that `source`,
/// `is_manually_set` and the address kind stay consistent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedLocation {
    pub position: Position,
    #[serde(default)]
    pub address: Option<LocationAddress>,
    pub is_manually_set: bool,
    pub source: LocationSource,
}

impl ResolvedLocation {
    /// Result of automatic detection. `None` address means degraded.
    pub fn detected(position: Position, best: Option<ScoredAddress>) -> Self {
        Self {
            position,
            address: best.map(LocationAddress::Scored),
            is_manually_set: false,
            source: LocationSource::Detected,
        }
    }

    pub fn manual(position: Position, address: Option<GeocodedAddress>) -> Self {
        Self {
            position,
            address: address.map(LocationAddress::Given),
            is_manually_set: true,
            source: LocationSource::Manual,
        }
    }

    /// Configured last-resort location.
    pub fn fallback(position: Position, address: GeocodedAddress) -> Self {
        Self {
            position,
            address: Some(LocationAddress::Given(address)),
            is_manually_set: false,
            source: LocationSource::Fallback,
        }
    }

    pub fn coords(&self) -> LatLng {
        self.position.coords
    }

    pub fn geocoded(&self) -> Option<&GeocodedAddress> {
        match &self.address {
            Some(LocationAddress::Scored(s)) => Some(&s.address),
            Some(LocationAddress::Given(a)) => Some(a),
            None => None,
        }
    }

    /// Reconciliation confidence. `None` for manual/fallback and degraded locations.
    pub fn confidence(&self) -> Option<u8> {
        match &self.address {
            Some(LocationAddress::Scored(s)) => Some(s.confidence),
            _ => None,
        }
    }

    /// Coordinates without any address.
    pub fn is_degraded(&self) -> bool {
        self.address.is_none()
    }

    pub fn display_line(&self) -> String {
        let place = self
            .geocoded()
            .map(|a| a.label())
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| "Unknown place".into());
        let coords = geo::format_coords(self.position.coords.lat, self.position.coords.lng);
        let trust = match self.confidence() {
            Some(c) => format!("confidence {}/100", c),
            None => self.source.to_string(),
        };
        let accuracy = match self.position.accuracy_m {
            Some(a) => format!(" \u{00B1}{:.0} m", a),
            None => String::new(),
        };
        format!(
            "\u{1F4CD} {} ({})\n  \u{1F4D0} {}{}",
            place, trust, coords, accuracy
        )
    }
}

// ─── Errors ──────────────────────────────────────────────────────

/// Errors a position sensor can report for a single request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SensorError {
    #[error("Location permission denied")]
    PermissionDenied,
    #[error("Position unavailable: {0}")]
    Unavailable(String),
    #[error("Position request timed out")]
    Timeout,
}

/// Terminal failures of position acquisition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AcquireError {
    #[error("Location permission denied")]
    PermissionDenied,
    #[error("Position unavailable: {0}")]
    PositionUnavailable(String),
    #[error("Position acquisition timed out after {attempts} attempt(s)")]
    AcquisitionTimeout { attempts: u32 },
}

/// Per-provider failures. Recovered inside reconciliation, never escalated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("Provider unreachable: {0}")]
    Unreachable(String),
    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),
    #[error("No result for '{0}'")]
    NoResult(String),
    #[error("Operation not supported by provider")]
    Unsupported,
    #[error("Provider timed out")]
    Timeout,
}

/// Manual override could not produce a location.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OverrideError {
    #[error(transparent)]
    InvalidCoordinates(#[from] InvalidCoordinates),
    #[error("No location specified. Give coordinates or at least a city, region or postal code")]
    NoInput,
    #[error("Both latitude and longitude are required")]
    IncompleteCoordinates,
    #[error("Location not found: '{0}'")]
    NotFound(String),
}

/// Automatic resolution failed and nothing could stand in for it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Acquire(#[from] AcquireError),
    #[error(transparent)]
    Override(#[from] OverrideError),
}
