//! Great-circle distance and movement-plausibility checks
//!
//! All distances are computed with the haversine formula on a spherical
//! Earth, rounded to 6 decimal places. Results under a 1-meter noise floor
//! collapse to exactly 0.0 to suppress GPS jitter.

use crate::domain::error::ValidationError;
use crate::domain::location::Location;
use chrono::TimeDelta;

/// Earth's mean radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Distances below this (1 m, in km) are treated as GPS noise.
pub const MIN_DISTANCE_KM: f64 = 0.001;

/// Maximum plausible speed for a walk (km/h). Anything faster is a
/// spoofed or corrupted sample.
pub const MAX_SPEED_KMH: f64 = 35.0;

/// Raw haversine distance in kilometers between two coordinate pairs.
/// No validation, noise floor, or rounding; callers go through
/// [`distance_km`] for the full pipeline.
fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

/// Distance in kilometers between two validated GPS samples.
///
/// Returns exactly 0.0 when the raw distance is under the noise floor;
/// otherwise the result is rounded to 6 decimal places.
pub fn distance_km(a: &Location, b: &Location) -> Result<f64, ValidationError> {
    a.validate()?;
    b.validate()?;

    let distance = haversine_km(a.latitude, a.longitude, b.latitude, b.longitude);
    if distance < MIN_DISTANCE_KM {
        return Ok(0.0);
    }
    Ok((distance * 1e6).round() / 1e6)
}

/// Total route distance over an ordered series of samples.
///
/// Requires at least two points. Segments under the noise floor are
/// skipped, not errored on.
pub fn route_distance_km(points: &[Location]) -> Result<f64, ValidationError> {
    if points.len() < 2 {
        return Err(ValidationError::TooFewPoints(points.len()));
    }

    let mut total = 0.0;
    for pair in points.windows(2) {
        let segment = distance_km(&pair[0], &pair[1])?;
        if segment >= MIN_DISTANCE_KM {
            total += segment;
        }
    }
    Ok((total * 1e6).round() / 1e6)
}

/// Check whether movement between two samples over `dt` is physically
/// plausible.
///
/// Sub-noise-floor distance counts as "no movement" and is valid. An
/// implied speed above [`MAX_SPEED_KMH`] returns `Ok(false)` with no
/// error; this is the sole gate against spoofed or corrupted GPS jumps
/// and against out-of-order or duplicate samples (whose `dt` is not
/// positive).
pub fn is_valid_movement(
    a: &Location,
    b: &Location,
    dt: TimeDelta,
) -> Result<bool, ValidationError> {
    if dt <= TimeDelta::zero() {
        return Err(ValidationError::NonPositiveDuration);
    }

    let distance = distance_km(a, b)?;
    if distance < MIN_DISTANCE_KM {
        // Standing still is valid movement.
        return Ok(true);
    }

    let hours = dt.num_milliseconds() as f64 / 3_600_000.0;
    let speed = distance / hours;
    Ok(speed <= MAX_SPEED_KMH)
}

/// Implied speed in km/h between two samples, for logging.
pub fn implied_speed_kmh(a: &Location, b: &Location, dt: TimeDelta) -> Option<f64> {
    if dt <= TimeDelta::zero() {
        return None;
    }
    let distance = distance_km(a, b).ok()?;
    let hours = dt.num_milliseconds() as f64 / 3_600_000.0;
    Some(distance / hours)
}
