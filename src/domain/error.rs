//! Domain error taxonomy
//!
//! Validation errors cover malformed inputs and are never retried.
//! Session errors cover illegal state transitions on a walk's lifecycle.
//! Transport-level errors live in `io::mqtt`.

use crate::domain::session::SessionStatus;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("{field} is not a finite number")]
    NonFinite { field: &'static str },

    #[error("latitude {0} out of range [-90, 90]")]
    LatitudeOutOfRange(f64),

    #[error("longitude {0} out of range [-180, 180]")]
    LongitudeOutOfRange(f64),

    #[error("accuracy {0} out of range [0, 100] m")]
    AccuracyOutOfRange(f64),

    #[error("radius {0} km out of range [0.1, 5.0]")]
    RadiusOutOfRange(f64),

    #[error("walk id must not be empty")]
    EmptyWalkId,

    #[error("time difference must be positive")]
    NonPositiveDuration,

    #[error("route distance requires at least two points, got {0}")]
    TooFewPoints(usize),

    #[error("malformed location payload: {0}")]
    MalformedPayload(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum SessionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("session is already completed")]
    AlreadyCompleted,

    #[error("cannot add location while session is {0}")]
    NotActive(SessionStatus),

    #[error("illegal transition from {from} to {to}")]
    InvalidTransition { from: SessionStatus, to: SessionStatus },

    #[error("location history is full ({0} samples)")]
    HistoryFull(usize),

    #[error("location accuracy {0} m is worse than the accepted threshold")]
    AccuracyTooLow(f64),

    #[error("implied speed {speed_kmh:.1} km/h exceeds plausible movement")]
    ImplausibleMovement { speed_kmh: f64 },
}
