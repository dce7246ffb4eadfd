//! Services - geofencing and live-session bookkeeping
//!
//! - `geofence` - circular boundary model with violation tracking
//! - `registry` - concurrency-safe map of live walks keyed by session id

pub mod geofence;
pub mod registry;

// Re-export commonly used types
pub use geofence::{Geofence, GeofenceError};
pub use registry::{LiveWalk, SessionRegistry};
