//! GPS location sample with validation and wire (de)serialization

use crate::domain::error::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Minimum valid latitude in degrees.
pub const MIN_LATITUDE: f64 = -90.0;
/// Maximum valid latitude in degrees.
pub const MAX_LATITUDE: f64 = 90.0;
/// Minimum valid longitude in degrees.
pub const MIN_LONGITUDE: f64 = -180.0;
/// Maximum valid longitude in degrees.
pub const MAX_LONGITUDE: f64 = 180.0;
/// Default GPS accuracy in meters when the client does not report one.
pub const DEFAULT_ACCURACY_M: f64 = 10.0;
/// Maximum acceptable GPS accuracy in meters.
pub const MAX_ACCURACY_M: f64 = 100.0;

/// A single GPS sample belonging to one walk.
///
/// Immutable once validated. Created by the transport adapter on message
/// receipt and consumed by the geodesy and geofence checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    /// Owning walk/session identifier.
    pub walk_id: String,
    /// Latitude in degrees, WGS84.
    pub latitude: f64,
    /// Longitude in degrees, WGS84.
    pub longitude: f64,
    /// Height above sea level in meters, if reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    /// Client-reported speed in km/h, if reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// Positional accuracy in meters.
    #[serde(default = "default_accuracy")]
    pub accuracy: f64,
    /// Time the sample was recorded; stamped on receipt when absent.
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

fn default_accuracy() -> f64 {
    DEFAULT_ACCURACY_M
}

impl Location {
    /// Create a sample with default accuracy and a receipt timestamp.
    pub fn new(walk_id: &str, latitude: f64, longitude: f64) -> Self {
        Self {
            walk_id: walk_id.to_string(),
            latitude,
            longitude,
            altitude: None,
            speed: None,
            accuracy: DEFAULT_ACCURACY_M,
            timestamp: Utc::now(),
        }
    }

    /// Builder for tests and clients that carry an explicit timestamp.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Check coordinates, accuracy and walk id against WGS84 bounds.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.walk_id.is_empty() {
            return Err(ValidationError::EmptyWalkId);
        }
        if !self.latitude.is_finite() {
            return Err(ValidationError::NonFinite { field: "latitude" });
        }
        if !self.longitude.is_finite() {
            return Err(ValidationError::NonFinite { field: "longitude" });
        }
        if !(MIN_LATITUDE..=MAX_LATITUDE).contains(&self.latitude) {
            return Err(ValidationError::LatitudeOutOfRange(self.latitude));
        }
        if !(MIN_LONGITUDE..=MAX_LONGITUDE).contains(&self.longitude) {
            return Err(ValidationError::LongitudeOutOfRange(self.longitude));
        }
        if !self.accuracy.is_finite() || !(0.0..=MAX_ACCURACY_M).contains(&self.accuracy) {
            return Err(ValidationError::AccuracyOutOfRange(self.accuracy));
        }
        Ok(())
    }

    /// Decode a sample from a JSON wire payload and validate it.
    pub fn from_json(payload: &[u8]) -> Result<Self, ValidationError> {
        let loc: Location = serde_json::from_slice(payload)
            .map_err(|e| ValidationError::MalformedPayload(e.to_string()))?;
        loc.validate()?;
        Ok(loc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_ok() {
        let loc = Location::new("walk-1", 40.0, -75.0);
        assert!(loc.validate().is_ok());
        assert_eq!(loc.accuracy, DEFAULT_ACCURACY_M);
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let mut loc = Location::new("walk-1", 91.0, 0.0);
        assert_eq!(loc.validate(), Err(ValidationError::LatitudeOutOfRange(91.0)));

        loc = Location::new("walk-1", 0.0, -180.5);
        assert_eq!(loc.validate(), Err(ValidationError::LongitudeOutOfRange(-180.5)));
    }

    #[test]
    fn test_validate_rejects_non_finite() {
        let loc = Location::new("walk-1", f64::NAN, 0.0);
        assert_eq!(loc.validate(), Err(ValidationError::NonFinite { field: "latitude" }));

        let loc = Location::new("walk-1", 0.0, f64::INFINITY);
        assert_eq!(loc.validate(), Err(ValidationError::NonFinite { field: "longitude" }));
    }

    #[test]
    fn test_validate_rejects_empty_walk_id() {
        let loc = Location::new("", 40.0, -75.0);
        assert_eq!(loc.validate(), Err(ValidationError::EmptyWalkId));
    }

    #[test]
    fn test_json_round_trip_with_optional_fields() {
        let json = r#"{
            "walkId": "abc123",
            "latitude": 40.0,
            "longitude": -75.0,
            "altitude": 12.5,
            "speed": 4.2
        }"#;

        let loc = Location::from_json(json.as_bytes()).unwrap();
        assert_eq!(loc.walk_id, "abc123");
        assert_eq!(loc.altitude, Some(12.5));
        assert_eq!(loc.speed, Some(4.2));
        // timestamp is stamped on receipt when absent
        assert!(loc.timestamp <= Utc::now());
    }

    #[test]
    fn test_from_json_rejects_invalid_coordinates() {
        let json = r#"{"walkId": "abc123", "latitude": 95.0, "longitude": 0.0}"#;
        assert!(Location::from_json(json.as_bytes()).is_err());
    }
}
