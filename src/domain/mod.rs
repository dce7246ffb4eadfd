//! Domain models - core tracking types and geodesy
//!
//! This module contains the canonical data types used throughout the system:
//! - `Location` - a single validated GPS sample
//! - `TrackingSession` - per-walk lifecycle state and accepted samples
//! - `geodesy` - haversine distance, route accumulation, movement plausibility
//! - `ValidationError` / `SessionError` - the domain error taxonomy

pub mod error;
pub mod geodesy;
pub mod location;
pub mod session;

// Re-export commonly used types at module level
pub use error::{SessionError, ValidationError};
pub use location::Location;
pub use session::{SessionSnapshot, SessionStatus, TrackingSession};
