//! Position sensors: where raw device coordinates come from.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

use super::types::{Position, SensorError};

/// Parameters for one sensor request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorRequest {
    pub high_accuracy: bool,
    pub timeout: Duration,
    /// A cached reading younger than this may be returned instead of a fresh one.
    pub max_cache_age: Duration,
}

/// A device position sensor.
#[async_trait]
pub trait PositionSensor: Send + Sync {
    async fn request(&self, req: &SensorRequest) -> Result<Position, SensorError>;
}

// ─── Fixed coordinates ──────────────────────────────────────────

/// Sensor that always reports the same coordinates (e.g. `--lat/--lng`).
pub struct FixedSensor {
    lat: f64,
    lng: f64,
    accuracy_m: Option<f64>,
}

impl FixedSensor {
    pub fn new(lat: f64, lng: f64, accuracy_m: Option<f64>) -> Self {
        Self { lat, lng, accuracy_m }
    }
}

#[async_trait]
impl PositionSensor for FixedSensor {
    async fn request(&self, _req: &SensorRequest) -> Result<Position, SensorError> {
        Position::now(self.lat, self.lng, self.accuracy_m)
            .map_err(|e| SensorError::Unavailable(e.to_string()))
    }
}

// ─── IP-based geolocation ───────────────────────────────────────

/// IP lookups resolve to roughly the city the ISP routes through.
pub const IP_ACCURACY_M: f64 = 5000.0;

const IPAPI_URL: &str = "https://ipapi.co/json/";

#[derive(Deserialize)]
struct IpApiResult {
    latitude: Option<f64>,
    longitude: Option<f64>,
    #[serde(default)]
    error: Option<bool>,
    #[serde(default)]
    reason: Option<String>,
}

/// Position from the public IP address via ipapi.co.
pub struct IpSensor {
    user_agent: String,
    last: Mutex<Option<Position>>,
}

impl IpSensor {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            last: Mutex::new(None),
        }
    }

    fn cached(&self, max_age: Duration) -> Option<Position> {
        let last = self.last.lock().ok()?;
        let pos = last.as_ref()?;
        let age = chrono::Utc::now().signed_duration_since(pos.captured_at);
        let max_age = chrono::Duration::from_std(max_age).ok()?;
        (age <= max_age).then(|| pos.clone())
    }
}

#[async_trait]
impl PositionSensor for IpSensor {
    async fn request(&self, req: &SensorRequest) -> Result<Position, SensorError> {
        if let Some(pos) = self.cached(req.max_cache_age) {
            debug!("ip sensor: returning cached reading from {}", pos.captured_at);
            return Ok(pos);
        }

        let user_agent = self.user_agent.clone();
        let timeout = req.timeout;
        let pos = tokio::task::spawn_blocking(move || ip_geolocate(&user_agent, timeout))
            .await
            .map_err(|e| SensorError::Unavailable(e.to_string()))??;

        if let Ok(mut last) = self.last.lock() {
            *last = Some(pos.clone());
        }
        Ok(pos)
    }
}

fn ip_geolocate(user_agent: &str, timeout: Duration) -> Result<Position, SensorError> {
    let response = ureq::get(IPAPI_URL)
        .set("User-Agent", user_agent)
        .timeout(timeout)
        .call()
        .map_err(|e| match e {
            ureq::Error::Status(code, _) => SensorError::Unavailable(format!("HTTP {}", code)),
            ureq::Error::Transport(t) => SensorError::Unavailable(t.to_string()),
        })?;

    let r: IpApiResult = response
        .into_json()
        .map_err(|e| SensorError::Unavailable(format!("invalid response: {}", e)))?;

    if r.error.unwrap_or(false) {
        return Err(SensorError::Unavailable(
            r.reason.unwrap_or_else(|| "lookup failed".into()),
        ));
    }

    let lat = r.latitude.ok_or_else(|| SensorError::Unavailable("no latitude".into()))?;
    let lng = r.longitude.ok_or_else(|| SensorError::Unavailable("no longitude".into()))?;

    Position::now(lat, lng, Some(IP_ACCURACY_M)).map_err(|e| SensorError::Unavailable(e.to_string()))
}
