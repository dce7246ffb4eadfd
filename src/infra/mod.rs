//! Infrastructure - configuration, metrics, retry policy, and broker
//!
//! - `config` - application configuration (TOML loading, defaults)
//! - `metrics` - lock-free metrics collection
//! - `retry` - bounded retry with configurable backoff growth
//! - `broker` - embedded MQTT broker (rumqttd) for standalone runs

pub mod broker;
pub mod config;
pub mod metrics;
pub mod retry;

// Re-export commonly used types
pub use config::Config;
pub use metrics::Metrics;
pub use retry::{BackoffStrategy, RetryPolicy};
