//! Input/output adapters
//!
//! - `mqtt`: broker transport for location ingest, session control and
//!   live rebroadcast
//! - `store`: durable session snapshot sink

pub mod mqtt;
pub mod store;

pub use mqtt::{MqttTransport, OutboundMessage, TransportError};
pub use store::{JsonlStore, SessionStore};
