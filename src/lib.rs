//! Walk tracker library
//!
//! Real-time location tracking and geofencing core for dog-walking
//! sessions. Exposes modules for integration testing and binary reuse.

pub mod domain;
pub mod infra;
pub mod io;
pub mod services;
