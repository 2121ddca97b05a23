//! Geocoding providers: Google Maps (high trust) and OpenStreetMap Nominatim (open data).
//!
//! Both are blocking `ureq` clients driven from `spawn_blocking`, so a slow
//! provider only ties up its own task.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use super::types::{GeocodedAddress, ProviderError, SourceTrust};
use crate::geo::LatLng;

/// A pluggable geocoding backend.
#[async_trait]
pub trait GeocodingProvider: Send + Sync {
    /// Stable identifier recorded as the address source.
    fn id(&self) -> &str;

    fn trust(&self) -> SourceTrust;

    async fn reverse_geocode(&self, at: LatLng) -> Result<GeocodedAddress, ProviderError>;

    /// Free-text search. Providers without search keep the default.
    async fn forward_geocode(&self, _query: &str) -> Result<(LatLng, GeocodedAddress), ProviderError> {
        Err(ProviderError::Unsupported)
    }
}

fn transport_error(e: ureq::Error) -> ProviderError {
    match e {
        ureq::Error::Status(code, _) => ProviderError::Unreachable(format!("HTTP {}", code)),
        ureq::Error::Transport(t) => ProviderError::Unreachable(t.to_string()),
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, ProviderError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ProviderError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ProviderError::Unreachable(e.to_string()))?
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

// ─── Nominatim provider ─────────────────────────────────────────

pub const NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org";

#[derive(Deserialize, Debug, Default)]
struct NominatimAddress {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    municipality: Option<String>,
    county: Option<String>,
    state: Option<String>,
    country: Option<String>,
    country_code: Option<String>,
    postcode: Option<String>,
}

#[derive(Deserialize, Debug)]
struct NominatimResult {
    #[serde(default)]
    lat: Option<String>,
    #[serde(default)]
    lon: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    address: Option<NominatimAddress>,
    #[serde(default)]
    error: Option<String>,
}

/// OpenStreetMap Nominatim. Open-data, secondary trust.
#[derive(Clone)]
pub struct NominatimGeocoder {
    base_url: String,
    user_agent: String,
    timeout: Duration,
}

impl NominatimGeocoder {
    pub fn new(base_url: impl Into<String>, user_agent: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user_agent: user_agent.into(),
            timeout,
        }
    }

    fn to_address(result: NominatimResult) -> GeocodedAddress {
        let a = result.address.unwrap_or_default();
        // Nominatim files smaller places under town/village instead of city.
        let city = non_empty(a.city)
            .or_else(|| non_empty(a.town))
            .or_else(|| non_empty(a.village))
            .or_else(|| non_empty(a.municipality))
            .or_else(|| non_empty(a.county));
        GeocodedAddress {
            city,
            region: non_empty(a.state),
            country: non_empty(a.country),
            country_code: non_empty(a.country_code).map(|c| c.to_uppercase()),
            postal_code: non_empty(a.postcode),
            display_name: non_empty(result.display_name),
            source: "nominatim".into(),
            trust: SourceTrust::Open,
        }
    }

    fn get(&self, url: &str) -> Result<ureq::Response, ProviderError> {
        ureq::get(url)
            .set("User-Agent", &self.user_agent)
            .timeout(self.timeout)
            .call()
            .map_err(transport_error)
    }
}

#[async_trait]
impl GeocodingProvider for NominatimGeocoder {
    fn id(&self) -> &str {
        "nominatim"
    }

    fn trust(&self) -> SourceTrust {
        SourceTrust::Open
    }

    async fn reverse_geocode(&self, at: LatLng) -> Result<GeocodedAddress, ProviderError> {
        let url = format!(
            "{}/reverse?lat={}&lon={}&format=json&addressdetails=1&zoom=14",
            self.base_url, at.lat, at.lng
        );
        let this = self.clone();
        run_blocking(move || {
            let result: NominatimResult = this
                .get(&url)?
                .into_json()
                .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;
            if let Some(err) = result.error {
                return Err(ProviderError::NoResult(err));
            }
            Ok(Self::to_address(result))
        })
        .await
    }

    async fn forward_geocode(&self, query: &str) -> Result<(LatLng, GeocodedAddress), ProviderError> {
        let url = format!(
            "{}/search?q={}&format=json&limit=1&addressdetails=1",
            self.base_url,
            urlencode(query)
        );
        let this = self.clone();
        let query = query.to_string();
        run_blocking(move || {
            let results: Vec<NominatimResult> = this
                .get(&url)?
                .into_json()
                .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;
            let top = results
                .into_iter()
                .next()
                .ok_or_else(|| ProviderError::NoResult(query.clone()))?;
            let parse = |v: &Option<String>| v.as_deref().and_then(|s| s.parse::<f64>().ok());
            let (lat, lng) = match (parse(&top.lat), parse(&top.lon)) {
                (Some(lat), Some(lng)) => (lat, lng),
                _ => return Err(ProviderError::MalformedResponse("missing lat/lon".into())),
            };
            let coords = LatLng::new(lat, lng)
                .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;
            Ok((coords, Self::to_address(top)))
        })
        .await
    }
}

// ─── Google Maps provider ───────────────────────────────────────

pub const GOOGLE_GEOCODE_URL: &str = "https://maps.googleapis.com/maps/api/geocode/json";

#[derive(Deserialize, Debug)]
struct GoogleResponse {
    status: String,
    #[serde(default)]
    results: Vec<GoogleResult>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Deserialize, Debug)]
struct GoogleResult {
    #[serde(default)]
    address_components: Vec<GoogleComponent>,
    #[serde(default)]
    formatted_address: Option<String>,
}

#[derive(Deserialize, Debug)]
struct GoogleComponent {
    long_name: String,
    short_name: String,
    #[serde(default)]
    types: Vec<String>,
}

/// Google Maps Geocoding API. Commercial, high trust. Needs an API key.
pub struct GoogleGeocoder {
    api_key: String,
    user_agent: String,
    timeout: Duration,
}

impl GoogleGeocoder {
    pub fn new(api_key: impl Into<String>, user_agent: impl Into<String>, timeout: Duration) -> Self {
        Self {
            api_key: api_key.into(),
            user_agent: user_agent.into(),
            timeout,
        }
    }

    fn to_address(response: GoogleResponse) -> Result<GeocodedAddress, ProviderError> {
        match response.status.as_str() {
            "OK" => {}
            "ZERO_RESULTS" => return Err(ProviderError::NoResult("no address at location".into())),
            other => {
                let detail = response.error_message.unwrap_or_default();
                return Err(ProviderError::Unreachable(format!("{} {}", other, detail).trim().to_string()));
            }
        }

        let top = response
            .results
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::MalformedResponse("status OK but no results".into()))?;

        let find = |kind: &str| {
            top.address_components
                .iter()
                .find(|c| c.types.iter().any(|t| t == kind))
        };

        Ok(GeocodedAddress {
            city: find("locality")
                .or_else(|| find("postal_town"))
                .or_else(|| find("administrative_area_level_2"))
                .map(|c| c.long_name.clone()),
            region: find("administrative_area_level_1").map(|c| c.long_name.clone()),
            country: find("country").map(|c| c.long_name.clone()),
            country_code: find("country").map(|c| c.short_name.to_uppercase()),
            postal_code: find("postal_code").map(|c| c.long_name.clone()),
            display_name: non_empty(top.formatted_address.clone()),
            source: "google".into(),
            trust: SourceTrust::High,
        })
    }
}

#[async_trait]
impl GeocodingProvider for GoogleGeocoder {
    fn id(&self) -> &str {
        "google"
    }

    fn trust(&self) -> SourceTrust {
        SourceTrust::High
    }

    async fn reverse_geocode(&self, at: LatLng) -> Result<GeocodedAddress, ProviderError> {
        let url = format!(
            "{}?latlng={},{}&key={}",
            GOOGLE_GEOCODE_URL,
            at.lat,
            at.lng,
            urlencode(&self.api_key)
        );
        let user_agent = self.user_agent.clone();
        let timeout = self.timeout;
        run_blocking(move || {
            let response: GoogleResponse = ureq::get(&url)
                .set("User-Agent", &user_agent)
                .timeout(timeout)
                .call()
                .map_err(transport_error)?
                .into_json()
                .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;
            Self::to_address(response)
        })
        .await
    }
}

// ─── URL encoding (minimal, no extra dep) ───────────────────────

pub(crate) fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            b' ' => out.push_str("%20"),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}
