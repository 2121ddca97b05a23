use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::geo::format_coords;
use crate::location::gazetteer::{place_list, PlaceInfo};
use crate::location::session::describe;
use crate::location::{AcquireError, Listing, ManualInput, OverrideError, ResolveError, ResolvedLocation, SessionState};
use crate::range::{Candidate, DistanceRange};

use super::state::AppState;

// ─── Error response ──────────────────────────────────────────────

#[derive(Serialize)]
struct ApiErrorBody {
    error: String,
    code: u16,
}

#[derive(Debug)]
pub struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            error: self.1,
            code: self.0.as_u16(),
        };
        (self.0, Json(body)).into_response()
    }
}

fn api_error(status: StatusCode, msg: impl Into<String>) -> ApiError {
    ApiError(status, msg.into())
}

impl From<OverrideError> for ApiError {
    fn from(e: OverrideError) -> Self {
        let status = match e {
            OverrideError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::BAD_REQUEST,
        };
        api_error(status, e.to_string())
    }
}

impl From<ResolveError> for ApiError {
    fn from(e: ResolveError) -> Self {
        match e {
            ResolveError::Acquire(AcquireError::PermissionDenied) => api_error(StatusCode::FORBIDDEN, e.to_string()),
            ResolveError::Acquire(_) => api_error(StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
            ResolveError::Override(o) => o.into(),
        }
    }
}

// ─── Location ────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct LocationResponse {
    pub state: SessionState,
    pub display: String,
    pub formatted_coords: String,
    pub location: ResolvedLocation,
}

fn location_response(state: &AppState, location: &ResolvedLocation) -> LocationResponse {
    let c = location.coords();
    LocationResponse {
        state: state.session.state(),
        display: location.display_line(),
        formatted_coords: format_coords(c.lat, c.lng),
        location: location.clone(),
    }
}

/// GET /api/location: the current location, detecting it on first use.
pub async fn location(State(state): State<Arc<AppState>>) -> Result<Json<LocationResponse>, ApiError> {
    let current = match state.session.current() {
        Some(current) => current,
        None => state.session.resolve_location().await?,
    };
    Ok(Json(location_response(&state, &current)))
}

/// POST /api/location/override
pub async fn override_location(
    State(state): State<Arc<AppState>>,
    Json(input): Json<ManualInput>,
) -> Result<Json<LocationResponse>, ApiError> {
    let location = state.session.override_location(&input).await?;
    info!("POST /api/location/override -> {}", location.coords());
    Ok(Json(location_response(&state, &location)))
}

/// POST /api/location/redetect
pub async fn redetect(State(state): State<Arc<AppState>>) -> Result<Json<LocationResponse>, ApiError> {
    let start = Instant::now();
    let location = state.session.redetect().await?;
    info!(
        "POST /api/location/redetect -> {} ({:.1}ms)",
        location.coords(),
        start.elapsed().as_secs_f64() * 1000.0
    );
    Ok(Json(location_response(&state, &location)))
}

// ─── POST /api/candidates ────────────────────────────────────────

#[derive(Deserialize)]
pub struct CandidatesRequest {
    pub candidates: Vec<Candidate>,
    pub range: String,
}

pub async fn candidates(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CandidatesRequest>,
) -> Result<Json<Listing>, ApiError> {
    let range: DistanceRange = req
        .range
        .parse()
        .map_err(|e: crate::range::RangeParseError| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;

    let listing = state.session.candidates_near(&req.candidates, range);
    info!("POST /api/candidates ({} in) -> {}", req.candidates.len(), describe(&listing));
    Ok(Json(listing))
}

// ─── GET /api/places ─────────────────────────────────────────────

pub async fn places() -> Json<Vec<PlaceInfo>> {
    Json(place_list())
}
