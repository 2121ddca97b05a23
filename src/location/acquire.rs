//! Position acquisition with accuracy-driven retries.
//!
//! Attempt flow: request → accuracy within threshold? accept
//!                       → attempts left? back off, retry
//!                       → last attempt: accept whatever came back
//!
//! Timeouts and unavailable readings consume an attempt. A denied permission
//! ends acquisition immediately.

use std::time::Duration;
use tracing::{debug, info, warn};

use super::sensor::{PositionSensor, SensorRequest};
use super::types::{AcquireError, Position, SensorError};

#[derive(Debug, Clone, PartialEq)]
pub struct AcquireOptions {
    pub max_attempts: u32,
    pub accuracy_threshold_m: f64,
    pub per_attempt_timeout: Duration,
    pub backoff: Duration,
    pub high_accuracy: bool,
    pub max_cache_age: Duration,
}

impl Default for AcquireOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            accuracy_threshold_m: 1000.0,
            per_attempt_timeout: Duration::from_secs(10),
            backoff: Duration::from_millis(1500),
            high_accuracy: true,
            max_cache_age: Duration::ZERO,
        }
    }
}

/// Obtain a position from `sensor`, retrying while accuracy is poor.
pub async fn acquire(sensor: &dyn PositionSensor, opts: &AcquireOptions) -> Result<Position, AcquireError> {
    let max_attempts = opts.max_attempts.max(1);
    let req = SensorRequest {
        high_accuracy: opts.high_accuracy,
        timeout: opts.per_attempt_timeout,
        max_cache_age: opts.max_cache_age,
    };

    let mut last_err = AcquireError::AcquisitionTimeout { attempts: 0 };

    for attempt in 1..=max_attempts {
        let is_last = attempt == max_attempts;

        // The sensor is asked to honor the timeout too; this is the hard stop.
        let outcome = match tokio::time::timeout(opts.per_attempt_timeout, sensor.request(&req)).await {
            Ok(result) => result,
            Err(_) => Err(SensorError::Timeout),
        };

        match outcome {
            Ok(pos) => {
                let acceptable = match pos.accuracy_m {
                    Some(acc) => acc <= opts.accuracy_threshold_m,
                    None => false,
                };
                if acceptable || is_last {
                    if !acceptable {
                        info!(
                            "accepting position from final attempt {} despite accuracy {:?} m",
                            attempt, pos.accuracy_m
                        );
                    }
                    debug!("position accepted on attempt {}/{}", attempt, max_attempts);
                    return Ok(pos);
                }
                debug!(
                    "attempt {}/{}: accuracy {:?} m exceeds {} m, retrying",
                    attempt, max_attempts, pos.accuracy_m, opts.accuracy_threshold_m
                );
            }
            Err(SensorError::PermissionDenied) => {
                warn!("location permission denied");
                return Err(AcquireError::PermissionDenied);
            }
            Err(SensorError::Timeout) => {
                warn!("attempt {}/{}: sensor timed out", attempt, max_attempts);
                last_err = AcquireError::AcquisitionTimeout { attempts: attempt };
            }
            Err(SensorError::Unavailable(reason)) => {
                warn!("attempt {}/{}: position unavailable: {}", attempt, max_attempts, reason);
                last_err = AcquireError::PositionUnavailable(reason);
            }
        }

        if !is_last && !opts.backoff.is_zero() {
            tokio::time::sleep(opts.backoff).await;
        }
    }

    Err(last_err)
}
