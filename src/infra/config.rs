//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use crate::infra::retry::{BackoffStrategy, RetryPolicy};
use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub tls: bool,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,
    #[serde(default = "default_health_check_interval_secs")]
    pub health_check_interval_secs: u64,
}

fn default_keep_alive_secs() -> u64 {
    30
}

fn default_connection_timeout_ms() -> u64 {
    5000
}

fn default_health_check_interval_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_retry_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub backoff_ms: u64,
    #[serde(default)]
    pub strategy: BackoffStrategy,
}

fn default_retry_max_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    500
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_retry_max_attempts(),
            backoff_ms: default_retry_backoff_ms(),
            strategy: BackoffStrategy::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeofenceConfig {
    #[serde(default = "default_geofence_radius_km")]
    pub default_radius_km: f64,
}

fn default_geofence_radius_km() -> f64 {
    0.5
}

impl Default for GeofenceConfig {
    fn default() -> Self {
        Self { default_radius_km: default_geofence_radius_km() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_session_max_history")]
    pub max_history: usize,
    #[serde(default = "default_session_store_file")]
    pub store_file: String,
}

fn default_session_max_history() -> usize {
    1000
}

fn default_session_store_file() -> String {
    "sessions.jsonl".to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_history: default_session_max_history(),
            store_file: default_session_store_file(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    #[serde(default)]
    pub embedded: bool,
    #[serde(default = "default_broker_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_broker_port")]
    pub port: u16,
}

fn default_broker_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_broker_port() -> u16 {
    1883
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self { embedded: false, bind_address: default_broker_bind_address(), port: default_broker_port() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval_secs")]
    pub interval_secs: u64,
}

fn default_metrics_interval_secs() -> u64 {
    10
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval_secs() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub geofence: GeofenceConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    mqtt_host: String,
    mqtt_port: u16,
    mqtt_username: Option<String>,
    mqtt_password: Option<String>,
    mqtt_tls: bool,
    mqtt_keep_alive_secs: u64,
    mqtt_connection_timeout_ms: u64,
    health_check_interval_secs: u64,
    retry_max_attempts: u32,
    retry_backoff_ms: u64,
    retry_strategy: BackoffStrategy,
    geofence_default_radius_km: f64,
    session_max_history: usize,
    session_store_file: String,
    broker_embedded: bool,
    broker_bind_address: String,
    broker_port: u16,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mqtt_host: "localhost".to_string(),
            mqtt_port: 1883,
            mqtt_username: None,
            mqtt_password: None,
            mqtt_tls: false,
            mqtt_keep_alive_secs: 30,
            mqtt_connection_timeout_ms: 5000,
            health_check_interval_secs: 10,
            retry_max_attempts: 3,
            retry_backoff_ms: 500,
            retry_strategy: BackoffStrategy::Linear,
            geofence_default_radius_km: 0.5,
            session_max_history: 1000,
            session_store_file: "sessions.jsonl".to_string(),
            broker_embedded: false,
            broker_bind_address: "0.0.0.0".to_string(),
            broker_port: 1883,
            metrics_interval_secs: 10,
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    /// Determine config file path from args or environment
    pub fn resolve_config_path(args: &[String]) -> String {
        for (i, arg) in args.iter().enumerate() {
            if arg == "--config" {
                if let Some(path) = args.get(i + 1) {
                    return path.clone();
                }
            }
            if let Some(path) = arg.strip_prefix("--config=") {
                return path.to_string();
            }
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self {
            mqtt_host: toml_config.mqtt.host,
            mqtt_port: toml_config.mqtt.port,
            mqtt_username: toml_config.mqtt.username,
            mqtt_password: toml_config.mqtt.password,
            mqtt_tls: toml_config.mqtt.tls,
            mqtt_keep_alive_secs: toml_config.mqtt.keep_alive_secs,
            mqtt_connection_timeout_ms: toml_config.mqtt.connection_timeout_ms,
            health_check_interval_secs: toml_config.mqtt.health_check_interval_secs,
            retry_max_attempts: toml_config.retry.max_attempts,
            retry_backoff_ms: toml_config.retry.backoff_ms,
            retry_strategy: toml_config.retry.strategy,
            geofence_default_radius_km: toml_config.geofence.default_radius_km,
            session_max_history: toml_config.session.max_history,
            session_store_file: toml_config.session.store_file,
            broker_embedded: toml_config.broker.embedded,
            broker_bind_address: toml_config.broker.bind_address,
            broker_port: toml_config.broker.port,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            config_file: path.display().to_string(),
        })
    }

    /// Load configuration from a path - falls back to defaults on error
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {}. Using defaults.", e);
                Self::default()
            }
        }
    }

    pub fn mqtt_host(&self) -> &str {
        &self.mqtt_host
    }

    pub fn mqtt_port(&self) -> u16 {
        self.mqtt_port
    }

    pub fn mqtt_username(&self) -> Option<&str> {
        self.mqtt_username.as_deref()
    }

    pub fn mqtt_password(&self) -> Option<&str> {
        self.mqtt_password.as_deref()
    }

    pub fn mqtt_tls(&self) -> bool {
        self.mqtt_tls
    }

    pub fn mqtt_keep_alive(&self) -> Duration {
        Duration::from_secs(self.mqtt_keep_alive_secs)
    }

    pub fn mqtt_connection_timeout(&self) -> Duration {
        Duration::from_millis(self.mqtt_connection_timeout_ms)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_max_attempts,
            Duration::from_millis(self.retry_backoff_ms),
            self.retry_strategy,
        )
    }

    pub fn geofence_default_radius_km(&self) -> f64 {
        self.geofence_default_radius_km
    }

    pub fn session_max_history(&self) -> usize {
        self.session_max_history
    }

    pub fn session_store_file(&self) -> &str {
        &self.session_store_file
    }

    pub fn broker_embedded(&self) -> bool {
        self.broker_embedded
    }

    pub fn broker_bind_address(&self) -> &str {
        &self.broker_bind_address
    }

    pub fn broker_port(&self) -> u16 {
        self.broker_port
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.mqtt_host(), "localhost");
        assert_eq!(config.mqtt_port(), 1883);
        assert!(!config.mqtt_tls());
        assert_eq!(config.mqtt_keep_alive(), Duration::from_secs(30));
        assert_eq!(config.geofence_default_radius_km(), 0.5);
        assert_eq!(config.session_max_history(), 1000);
        assert_eq!(config.metrics_interval_secs(), 10);
    }

    #[test]
    fn test_default_retry_policy_is_linear() {
        let policy = Config::default().retry_policy();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.delay(2), Duration::from_millis(1000));
    }

    #[test]
    fn test_resolve_config_path_default() {
        let args: Vec<String> = vec!["walk-tracker".to_string()];
        assert_eq!(Config::resolve_config_path(&args), "config/dev.toml");
    }

    #[test]
    fn test_resolve_config_path_from_arg() {
        let args: Vec<String> = vec![
            "walk-tracker".to_string(),
            "--config".to_string(),
            "config/prod.toml".to_string(),
        ];
        assert_eq!(Config::resolve_config_path(&args), "config/prod.toml");
    }

    #[test]
    fn test_resolve_config_path_from_arg_equals() {
        let args: Vec<String> =
            vec!["walk-tracker".to_string(), "--config=config/staging.toml".to_string()];
        assert_eq!(Config::resolve_config_path(&args), "config/staging.toml");
    }
}
