//! File-based configuration at ~/.wayfinder/config.json.
//!
//! Every field has a default, so a missing or partial file is fine.
//! `WAYFINDER_GOOGLE_API_KEY` overrides the Google key from the file.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::geo::InvalidCoordinates;
use crate::location::acquire::AcquireOptions;
use crate::location::providers::{GeocodingProvider, GoogleGeocoder, NominatimGeocoder, NOMINATIM_URL};
use crate::location::{GeocodedAddress, Position, ResolvedLocation, SourceTrust};

pub const GOOGLE_KEY_ENV: &str = "WAYFINDER_GOOGLE_API_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub user_agent: String,
    pub acquisition: AcquisitionConfig,
    /// Per-provider timeout during reconciliation.
    pub provider_timeout_ms: u64,
    /// Priority order: earlier providers win score ties.
    pub providers: Vec<ProviderConfig>,
    /// Last-resort location when detection fails and nobody enters one.
    pub fallback: Option<FallbackLocation>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            user_agent: format!("Wayfinder/{} (location-resolver)", env!("CARGO_PKG_VERSION")),
            acquisition: AcquisitionConfig::default(),
            provider_timeout_ms: 5000,
            providers: vec![
                ProviderConfig::Google { api_key: None },
                ProviderConfig::Nominatim { base_url: NOMINATIM_URL.to_string() },
            ],
            fallback: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    pub max_attempts: u32,
    pub accuracy_threshold_m: f64,
    pub attempt_timeout_ms: u64,
    pub backoff_ms: u64,
    pub high_accuracy: bool,
    pub max_cache_age_ms: u64,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            accuracy_threshold_m: 1000.0,
            attempt_timeout_ms: 10_000,
            backoff_ms: 1500,
            high_accuracy: true,
            max_cache_age_ms: 60_000,
        }
    }
}

impl AcquisitionConfig {
    pub fn options(&self) -> AcquireOptions {
        AcquireOptions {
            max_attempts: self.max_attempts.max(1),
            accuracy_threshold_m: self.accuracy_threshold_m,
            per_attempt_timeout: Duration::from_millis(self.attempt_timeout_ms),
            backoff: Duration::from_millis(self.backoff_ms),
            high_accuracy: self.high_accuracy,
            max_cache_age: Duration::from_millis(self.max_cache_age_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderConfig {
    Google {
        #[serde(default)]
        api_key: Option<String>,
    },
    Nominatim {
        #[serde(default = "default_nominatim_url")]
        base_url: String,
    },
}

fn default_nominatim_url() -> String {
    NOMINATIM_URL.to_string()
}

/// A configured default place, e.g. a service's home city.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackLocation {
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

impl FallbackLocation {
    pub fn to_resolved(&self) -> Result<ResolvedLocation, InvalidCoordinates> {
        let position = Position::now(self.lat, self.lng, None)?;
        let address = GeocodedAddress {
            city: self.city.clone(),
            region: self.region.clone(),
            country: self.country.clone(),
            source: "fallback".into(),
            trust: SourceTrust::Unrated,
            ..Default::default()
        };
        Ok(ResolvedLocation::fallback(position, address))
    }
}

impl Config {
    /// Load from the default location, falling back to defaults on any problem.
    pub fn load() -> Self {
        let path = Self::default_path();
        if !path.exists() {
            debug!("no config at {}, using defaults", path.display());
            return Self::default().with_env();
        }
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!("{}; using defaults", e);
                Self::default().with_env()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(config.with_env())
    }

    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".wayfinder")
            .join("config.json")
    }

    fn with_env(mut self) -> Self {
        if let Ok(key) = std::env::var(GOOGLE_KEY_ENV) {
            if !key.trim().is_empty() {
                for p in &mut self.providers {
                    if let ProviderConfig::Google { api_key } = p {
                        *api_key = Some(key.trim().to_string());
                    }
                }
            }
        }
        self
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }

    /// Instantiate the configured providers in priority order.
    ///
    /// Google without an API key is skipped.
    pub fn build_providers(&self) -> Vec<Arc<dyn GeocodingProvider>> {
        let timeout = self.provider_timeout();
        self.providers
            .iter()
            .filter_map(|p| -> Option<Arc<dyn GeocodingProvider>> {
                match p {
                    ProviderConfig::Google { api_key: Some(key) } if !key.is_empty() => {
                        Some(Arc::new(GoogleGeocoder::new(key.clone(), self.user_agent.clone(), timeout)))
                    }
                    ProviderConfig::Google { .. } => {
                        debug!("google provider configured without API key, skipping");
                        None
                    }
                    ProviderConfig::Nominatim { base_url } => Some(Arc::new(NominatimGeocoder::new(
                        base_url.clone(),
                        self.user_agent.clone(),
                        timeout,
                    ))),
                }
            })
            .collect()
    }
}
