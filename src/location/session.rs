//! Location session: owns the current location and orchestrates resolution.
//!
//! Auto flow:    acquire → reconcile → Resolved | Degraded
//! On failure:   manual input callback → configured fallback → error
//! Manual flow:  override → Overridden (sticky until `redetect`)
//!
//! The current location is swapped as a whole `Arc`. Every resolution takes a
//! generation number; a result whose generation is no longer current (because
//! an override or a newer request arrived) is dropped on arrival.
//!
//! Only one automatic resolution runs at a time. A caller arriving while one
//! is in flight waits for it and shares its result.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use super::acquire::{acquire, AcquireOptions};
use super::manual::{ManualInput, ManualOverride};
use super::reconcile::ProviderReconciler;
use super::sensor::PositionSensor;
use super::types::{AcquireError, LocationSource, OverrideError, ResolveError, ResolvedLocation, ScoredAddress};
use crate::config::FallbackLocation;
use crate::geo::Compass;
use crate::range::{filter_candidates, Candidate, DistanceRange, FilterOutcome, RankedCandidate};

/// Asks the user to type a location when detection fails.
#[async_trait]
pub trait ManualInputSource: Send + Sync {
    /// `None` means the user declined.
    async fn request_manual_input(&self, reason: &AcquireError) -> Option<ManualInput>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Acquiring,
    Reconciling,
    Resolved { confidence: u8 },
    /// Coordinates only, every provider failed.
    Degraded,
    /// Detection failed; the configured default location is in use.
    Fallback,
    Overridden,
    /// Detection failed and nothing could stand in.
    Failed,
}

impl SessionState {
    /// The settled state that goes with an installed location.
    fn of(location: &ResolvedLocation) -> Self {
        match (location.source, location.confidence()) {
            (LocationSource::Manual, _) => Self::Overridden,
            (LocationSource::Fallback, _) => Self::Fallback,
            (LocationSource::Detected, Some(confidence)) => Self::Resolved { confidence },
            (LocationSource::Detected, None) => Self::Degraded,
        }
    }
}

struct Inner {
    current: Option<Arc<ResolvedLocation>>,
    /// Provider answers behind `current`, best first. Empty unless detected.
    answers: Vec<ScoredAddress>,
    state: SessionState,
    generation: u64,
}

pub struct Session {
    sensor: Arc<dyn PositionSensor>,
    reconciler: ProviderReconciler,
    manual: ManualOverride,
    acquire_opts: AcquireOptions,
    manual_input: Option<Arc<dyn ManualInputSource>>,
    fallback: Option<FallbackLocation>,
    inner: Mutex<Inner>,
    /// Held for the whole of an automatic resolution.
    resolving: tokio::sync::Mutex<()>,
}

impl Session {
    pub fn new(sensor: Arc<dyn PositionSensor>, reconciler: ProviderReconciler) -> Self {
        let manual = ManualOverride::new(reconciler.providers().to_vec());
        Self {
            sensor,
            reconciler,
            manual,
            acquire_opts: AcquireOptions::default(),
            manual_input: None,
            fallback: None,
            inner: Mutex::new(Inner {
                current: None,
                answers: Vec::new(),
                state: SessionState::Idle,
                generation: 0,
            }),
            resolving: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_acquire_options(mut self, opts: AcquireOptions) -> Self {
        self.acquire_opts = opts;
        self
    }

    pub fn with_manual_input(mut self, source: Arc<dyn ManualInputSource>) -> Self {
        self.manual_input = Some(source);
        self
    }

    pub fn with_fallback(mut self, fallback: Option<FallbackLocation>) -> Self {
        self.fallback = fallback;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // State is replaced whole under the lock, so a poisoned guard still holds a consistent value.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn current(&self) -> Option<Arc<ResolvedLocation>> {
        self.lock().current.clone()
    }

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    /// Every provider answer from the resolution that produced the current
    /// location, best first.
    pub fn provider_answers(&self) -> Vec<ScoredAddress> {
        self.lock().answers.clone()
    }

    /// Detect the user's location automatically.
    ///
    /// A manual override stays in place: it is returned as-is and no sensor
    /// is touched. Use [`Session::redetect`] to leave it.
    pub async fn resolve_location(&self) -> Result<Arc<ResolvedLocation>, ResolveError> {
        let _turn = match self.resolving.try_lock() {
            Ok(turn) => turn,
            Err(_) => {
                let turn = self.resolving.lock().await;
                if let Some(current) = self.current() {
                    debug!("joined a resolution already in flight");
                    return Ok(current);
                }
                turn
            }
        };

        let generation = {
            let mut inner = self.lock();
            if inner.state == SessionState::Overridden {
                if let Some(current) = &inner.current {
                    return Ok(Arc::clone(current));
                }
            }
            inner.generation += 1;
            inner.state = SessionState::Acquiring;
            inner.generation
        };

        let position = match acquire(self.sensor.as_ref(), &self.acquire_opts).await {
            Ok(p) => p,
            Err(e) => return self.recover(generation, e).await,
        };

        if !self.advance(generation, SessionState::Reconciling) {
            if let Some(newer) = self.newer_than(generation) {
                return Ok(newer);
            }
        }

        let answers = self.reconciler.reconcile_ranked(&position).await;
        let location = ResolvedLocation::detected(position, answers.first().cloned());
        if location.is_degraded() {
            warn!("no geocoding provider answered; keeping bare coordinates");
        }
        Ok(self.commit(generation, location, answers))
    }

    /// User-initiated "detect again": leaves the manual state and resolves afresh.
    pub async fn redetect(&self) -> Result<Arc<ResolvedLocation>, ResolveError> {
        {
            let mut inner = self.lock();
            if inner.state == SessionState::Overridden {
                info!("leaving manual location for fresh detection");
                inner.state = SessionState::Idle;
            }
        }
        self.resolve_location().await
    }

    /// Install a manual location. Takes precedence over anything in flight.
    pub async fn override_location(&self, input: &ManualInput) -> Result<Arc<ResolvedLocation>, OverrideError> {
        let location = self.manual.resolve(input).await?;
        Ok(self.install_override(location))
    }

    fn install_override(&self, location: ResolvedLocation) -> Arc<ResolvedLocation> {
        let location = Arc::new(location);
        let mut inner = self.lock();
        inner.generation += 1;
        inner.current = Some(Arc::clone(&location));
        inner.answers.clear();
        inner.state = SessionState::Overridden;
        location
    }

    /// Move to `state` if `generation` is still current.
    fn advance(&self, generation: u64, state: SessionState) -> bool {
        let mut inner = self.lock();
        if inner.generation != generation {
            return false;
        }
        inner.state = state;
        true
    }

    /// Install an automatic result unless it has been superseded.
    fn commit(&self, generation: u64, location: ResolvedLocation, answers: Vec<ScoredAddress>) -> Arc<ResolvedLocation> {
        let mut inner = self.lock();
        if inner.generation != generation {
            if let Some(current) = &inner.current {
                info!("discarding late automatic result; a newer location is in place");
                return Arc::clone(current);
            }
        }
        let location = Arc::new(location);
        inner.state = SessionState::of(&location);
        inner.current = Some(Arc::clone(&location));
        inner.answers = answers;
        location
    }

    /// The installed location, if it was installed after `generation` started.
    fn newer_than(&self, generation: u64) -> Option<Arc<ResolvedLocation>> {
        let inner = self.lock();
        match &inner.current {
            Some(current) if inner.generation != generation => Some(Arc::clone(current)),
            _ => None,
        }
    }

    async fn recover(&self, generation: u64, err: AcquireError) -> Result<Arc<ResolvedLocation>, ResolveError> {
        warn!("location detection failed: {}", err);

        // An override may have arrived while we were acquiring.
        if let Some(newer) = self.newer_than(generation) {
            return Ok(newer);
        }

        if let Some(source) = &self.manual_input {
            if let Some(input) = source.request_manual_input(&err).await {
                match self.manual.resolve(&input).await {
                    Ok(location) => return Ok(self.install_override(location)),
                    Err(e) => warn!("manual location rejected: {}", e),
                }
            }
        }

        if let Some(fallback) = &self.fallback {
            match fallback.to_resolved() {
                Ok(location) => {
                    info!("using configured default location");
                    return Ok(self.commit(generation, location, Vec::new()));
                }
                Err(e) => warn!("configured default location is invalid: {}", e),
            }
        }

        let mut inner = self.lock();
        if inner.generation == generation {
            // A location from before this attempt stays in place, and so does its state.
            let settled = inner.current.as_deref().map(SessionState::of);
            inner.state = settled.unwrap_or(SessionState::Failed);
        } else if let Some(newer) = &inner.current {
            return Ok(Arc::clone(newer));
        }
        Err(ResolveError::Acquire(err))
    }

    /// Candidates near the current location, never empty when there is anything to show.
    pub fn candidates_near(&self, candidates: &[Candidate], range: DistanceRange) -> Listing {
        let origin = self.current();
        listing_for(candidates, origin.as_deref(), range)
    }
}

// ─── Listing (caller-facing fallback policy) ────────────────────

/// Why a listing shows candidates outside the requested range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingFallback {
    /// Location unknown; nothing could be filtered.
    NoOrigin,
    /// Location known but no candidate is in range.
    NothingInRange,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListingEntry {
    #[serde(flatten)]
    pub candidate: Candidate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearing_deg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<Compass>,
}

impl From<RankedCandidate> for ListingEntry {
    fn from(r: RankedCandidate) -> Self {
        Self {
            candidate: r.candidate,
            distance_km: Some(r.distance_km),
            bearing_deg: Some(r.bearing_deg),
            direction: Some(r.direction),
        }
    }
}

impl ListingEntry {
    fn unranked(candidate: Candidate) -> Self {
        Self {
            candidate,
            distance_km: None,
            bearing_deg: None,
            direction: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Listing {
    pub range: DistanceRange,
    pub entries: Vec<ListingEntry>,
    /// How many candidates actually fell inside `range`.
    pub matched_in_range: usize,
    pub excluded_no_coords: usize,
    pub excluded_out_of_range: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<ListingFallback>,
}

/// Apply the range filter and, when it would leave the user with nothing,
/// fall back to every candidate while reporting why.
pub fn listing_for(candidates: &[Candidate], origin: Option<&ResolvedLocation>, range: DistanceRange) -> Listing {
    match filter_candidates(candidates, origin, range) {
        FilterOutcome::Unfiltered(all) => Listing {
            range,
            entries: all.into_iter().map(ListingEntry::unranked).collect(),
            matched_in_range: 0,
            excluded_no_coords: 0,
            excluded_out_of_range: 0,
            fallback: Some(ListingFallback::NoOrigin),
        },
        FilterOutcome::Ranked(report) if report.kept.is_empty() && !candidates.is_empty() => {
            // Origin is Some here: Unfiltered is only produced without one.
            let entries = match origin {
                Some(origin) => everything_by_distance(candidates, origin),
                None => candidates.iter().cloned().map(ListingEntry::unranked).collect(),
            };
            Listing {
                range,
                entries,
                matched_in_range: 0,
                excluded_no_coords: report.excluded_no_coords,
                excluded_out_of_range: report.excluded_out_of_range,
                fallback: Some(ListingFallback::NothingInRange),
            }
        }
        FilterOutcome::Ranked(report) => Listing {
            range,
            matched_in_range: report.kept.len(),
            excluded_no_coords: report.excluded_no_coords,
            excluded_out_of_range: report.excluded_out_of_range,
            entries: report.kept.into_iter().map(ListingEntry::from).collect(),
            fallback: None,
        },
    }
}

/// Every candidate: located ones nearest first, then the rest in input order.
fn everything_by_distance(candidates: &[Candidate], origin: &ResolvedLocation) -> Vec<ListingEntry> {
    let from = origin.coords();
    let mut ranked = Vec::new();
    let mut unlocated = Vec::new();
    for c in candidates {
        match c.coords() {
            Some(coords) => ranked.push(RankedCandidate::measure(c.clone(), coords, from)),
            None => unlocated.push(ListingEntry::unranked(c.clone())),
        }
    }
    crate::range::sort_by_distance(&mut ranked);
    ranked.into_iter().map(ListingEntry::from).chain(unlocated).collect()
}

/// One-line summary of a listing for logs and the CLI.
pub fn describe(listing: &Listing) -> String {
    let mut parts = vec![format!("{} in {} km", listing.matched_in_range, listing.range)];
    if listing.excluded_no_coords > 0 {
        parts.push(format!("{} excluded for missing location data", listing.excluded_no_coords));
    }
    match listing.fallback {
        Some(ListingFallback::NoOrigin) => parts.push("location unknown, showing all".into()),
        Some(ListingFallback::NothingInRange) => parts.push("none in range, showing all".into()),
        None => {}
    }
    if let Some(nearest) = listing.entries.first().and_then(|e| e.distance_km) {
        parts.push(format!("nearest {:.2} km", nearest));
    }
    parts.join("; ")
}
