//! Circular geofence with violation tracking
//!
//! A geofence is bound to one walk and lives through a one-way
//! Active -> Inactive lifecycle. The containment check is deliberately
//! not a pure predicate: a miss increments the boundary-violation
//! counter as part of the same call (containment check with violation
//! tracking). Once deactivated the fence is permanently read-only.

use crate::domain::error::ValidationError;
use crate::domain::geodesy;
use crate::domain::location::{Location, MAX_LATITUDE, MAX_LONGITUDE, MIN_LATITUDE, MIN_LONGITUDE};
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

/// Default radius in kilometers for standard walking zones.
pub const DEFAULT_RADIUS_KM: f64 = 0.5;
/// Smallest meaningful boundary.
pub const MIN_RADIUS_KM: f64 = 0.1;
/// Largest allowed boundary.
pub const MAX_RADIUS_KM: f64 = 5.0;

#[derive(Debug, Error, PartialEq)]
pub enum GeofenceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("geofence is inactive")]
    Inactive,

    #[error("geofence is already inactive")]
    AlreadyInactive,
}

/// Circular boundary for one walk.
#[derive(Debug, Clone)]
pub struct Geofence {
    id: String,
    walk_id: String,
    center_latitude: f64,
    center_longitude: f64,
    radius_km: f64,
    active: bool,
    boundary_violations: u32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Validate center coordinates and radius for creation or update.
///
/// Rejects non-finite values, out-of-range coordinates, and a radius
/// outside [MIN_RADIUS_KM, MAX_RADIUS_KM]. Note that [`Geofence::new`]
/// clamps an out-of-bound radius instead of rejecting it; this function
/// is the strict form for callers validating user input up front.
pub fn validate_parameters(
    latitude: f64,
    longitude: f64,
    radius_km: f64,
) -> Result<(), ValidationError> {
    validate_center(latitude, longitude)?;
    if !radius_km.is_finite() {
        return Err(ValidationError::NonFinite { field: "radius" });
    }
    if !(MIN_RADIUS_KM..=MAX_RADIUS_KM).contains(&radius_km) {
        return Err(ValidationError::RadiusOutOfRange(radius_km));
    }
    Ok(())
}

fn validate_center(latitude: f64, longitude: f64) -> Result<(), ValidationError> {
    if !latitude.is_finite() {
        return Err(ValidationError::NonFinite { field: "latitude" });
    }
    if !longitude.is_finite() {
        return Err(ValidationError::NonFinite { field: "longitude" });
    }
    if !(MIN_LATITUDE..=MAX_LATITUDE).contains(&latitude) {
        return Err(ValidationError::LatitudeOutOfRange(latitude));
    }
    if !(MIN_LONGITUDE..=MAX_LONGITUDE).contains(&longitude) {
        return Err(ValidationError::LongitudeOutOfRange(longitude));
    }
    Ok(())
}

impl Geofence {
    /// Create an active geofence for a walk.
    ///
    /// The center must be a valid finite coordinate pair. An out-of-bound
    /// radius is clamped to the nearest bound rather than rejected; a
    /// non-finite radius is still an error.
    pub fn new(
        walk_id: &str,
        latitude: f64,
        longitude: f64,
        radius_km: f64,
    ) -> Result<Self, ValidationError> {
        validate_center(latitude, longitude)?;
        if !radius_km.is_finite() {
            return Err(ValidationError::NonFinite { field: "radius" });
        }

        let now = Utc::now();
        Ok(Self {
            id: Uuid::now_v7().to_string(),
            walk_id: walk_id.to_string(),
            center_latitude: latitude,
            center_longitude: longitude,
            radius_km: radius_km.clamp(MIN_RADIUS_KM, MAX_RADIUS_KM),
            active: true,
            boundary_violations: 0,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn walk_id(&self) -> &str {
        &self.walk_id
    }

    pub fn radius_km(&self) -> f64 {
        self.radius_km
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn boundary_violations(&self) -> u32 {
        self.boundary_violations
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Containment check with violation tracking.
    ///
    /// Fails if the fence is inactive or the location invalid. Returns
    /// true iff the point is within the radius of the center; a false
    /// result increments `boundary_violations` before returning.
    pub fn contains_point(&mut self, point: &Location) -> Result<bool, GeofenceError> {
        if !self.active {
            return Err(GeofenceError::Inactive);
        }
        point.validate().map_err(GeofenceError::Validation)?;

        let center = Location::new(&self.walk_id, self.center_latitude, self.center_longitude);
        let distance = geodesy::distance_km(&center, point)?;

        if distance <= self.radius_km {
            return Ok(true);
        }
        self.boundary_violations += 1;
        Ok(false)
    }

    /// Change the radius of an active fence, clamping as in construction.
    pub fn update_radius(&mut self, new_radius_km: f64) -> Result<(), GeofenceError> {
        if !self.active {
            return Err(GeofenceError::Inactive);
        }
        if !new_radius_km.is_finite() {
            return Err(ValidationError::NonFinite { field: "radius" }.into());
        }
        self.radius_km = new_radius_km.clamp(MIN_RADIUS_KM, MAX_RADIUS_KM);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Retire the fence. Irreversible; all further checks and updates fail.
    pub fn deactivate(&mut self) -> Result<(), GeofenceError> {
        if !self.active {
            return Err(GeofenceError::AlreadyInactive);
        }
        self.active = false;
        self.updated_at = Utc::now();
        Ok(())
    }
}
