//! Location resolution for Wayfinder.
//!
//! Acquires a device position with retries, reverse geocodes it against
//! several providers at once, scores each answer and keeps the best.
//! Users can always override the detected location by hand.

pub mod acquire;
pub mod gazetteer;
pub mod manual;
pub mod providers;
pub mod reconcile;
pub mod scoring;
pub mod sensor;
pub mod session;
pub mod types;

pub use acquire::{acquire, AcquireOptions};
pub use manual::{ManualInput, ManualOverride};
pub use providers::GeocodingProvider;
pub use reconcile::ProviderReconciler;
pub use sensor::{FixedSensor, IpSensor, PositionSensor};
pub use session::{listing_for, Listing, ListingEntry, ListingFallback, ManualInputSource, Session, SessionState};
pub use types::{
    AcquireError, GeocodedAddress, LocationAddress, LocationSource, OverrideError, Position, ProviderError,
    QualityIssue, ResolveError, ResolvedLocation, ScoredAddress, SensorError, SourceTrust,
};
