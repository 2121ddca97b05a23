//! Manual location override.
//!
//! Coordinates flow: explicit lat/lng → authoritative position
//! Address flow:     gazetteer exact name → provider forward search →
//!                   gazetteer typo match → NotFound
//!
//! Manual locations are never scored; the user is taken at their word.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use super::gazetteer;
use super::providers::GeocodingProvider;
use super::types::{GeocodedAddress, OverrideError, Position, ResolvedLocation, SourceTrust};
use crate::geo::LatLng;

/// What the user typed: coordinates, an address, or both.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManualInput {
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
}

impl ManualInput {
    pub fn city(city: impl Into<String>) -> Self {
        Self {
            city: Some(city.into()),
            ..Self::default()
        }
    }

    pub fn coordinates(lat: f64, lng: f64) -> Self {
        Self {
            lat: Some(lat),
            lng: Some(lng),
            ..Self::default()
        }
    }

    fn has_address(&self) -> bool {
        [&self.city, &self.region, &self.country, &self.postal_code]
            .iter()
            .any(|f| f.as_deref().is_some_and(|s| !s.trim().is_empty()))
    }

    /// Free-text search string, most specific part first.
    fn query(&self) -> String {
        [&self.city, &self.region, &self.postal_code, &self.country]
            .iter()
            .filter_map(|f| f.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Address exactly as entered, gaps filled from `found` when given.
    fn to_address(&self, found: Option<&GeocodedAddress>) -> GeocodedAddress {
        let pick = |given: &Option<String>, fallback: Option<&Option<String>>| -> Option<String> {
            given
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .or_else(|| fallback.and_then(|f| f.clone()))
        };
        GeocodedAddress {
            city: pick(&self.city, found.map(|f| &f.city)),
            region: pick(&self.region, found.map(|f| &f.region)),
            country: pick(&self.country, found.map(|f| &f.country)),
            country_code: found.and_then(|f| f.country_code.clone()),
            postal_code: pick(&self.postal_code, found.map(|f| &f.postal_code)),
            display_name: found.and_then(|f| f.display_name.clone()),
            source: "manual".into(),
            trust: SourceTrust::Unrated,
        }
    }
}

/// How a typed city name relates to the place it resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Match {
    AsTyped,
    Corrected,
}

/// Turns manual input into an authoritative location.
#[derive(Clone, Default)]
pub struct ManualOverride {
    /// Searched in order when the gazetteer does not know the place.
    providers: Vec<Arc<dyn GeocodingProvider>>,
}

impl ManualOverride {
    pub fn new(providers: Vec<Arc<dyn GeocodingProvider>>) -> Self {
        Self { providers }
    }

    pub async fn resolve(&self, input: &ManualInput) -> Result<ResolvedLocation, OverrideError> {
        let address = input.has_address().then(|| input.to_address(None));

        match (input.lat, input.lng) {
            (Some(lat), Some(lng)) => {
                let position = Position::now(lat, lng, None)?;
                info!("manual override at {}", position.coords);
                return Ok(ResolvedLocation::manual(position, address));
            }
            (None, None) => {}
            _ => return Err(OverrideError::IncompleteCoordinates),
        }

        if address.is_none() {
            return Err(OverrideError::NoInput);
        }

        let (coords, found, kind) = self.locate(input).await?;
        let position = Position::now(coords.lat, coords.lng, None)?;
        info!("manual override '{}' located at {}", input.query(), coords);

        let address = match kind {
            Match::AsTyped => input.to_address(Some(&found)),
            // The typed city was a misspelling; keep the place that was actually found.
            Match::Corrected => ManualInput { city: None, ..input.clone() }.to_address(Some(&found)),
        };
        Ok(ResolvedLocation::manual(position, Some(address)))
    }

    async fn locate(&self, input: &ManualInput) -> Result<(LatLng, GeocodedAddress, Match), OverrideError> {
        let city = input.city.as_deref().map(str::trim).filter(|c| !c.is_empty());
        let country = input.country.as_deref();

        if let Some(city) = city {
            if let Some((coords, found)) = gazetteer::lookup_exact(city, country) {
                debug!("'{}' found in built-in gazetteer", city);
                return Ok((coords, found, Match::AsTyped));
            }
        }

        let query = input.query();
        for provider in &self.providers {
            match provider.forward_geocode(&query).await {
                Ok((coords, found)) => {
                    debug!("'{}' found by {}", query, provider.id());
                    return Ok((coords, found, Match::AsTyped));
                }
                Err(e) => debug!("{} could not locate '{}': {}", provider.id(), query, e),
            }
        }

        if let Some(city) = city {
            if let Some((coords, found)) = gazetteer::lookup_fuzzy(city, country) {
                info!("'{}' not found; using closest known place {}", city, found.label());
                return Ok((coords, found, Match::Corrected));
            }
        }

        Err(OverrideError::NotFound(query))
    }
}
