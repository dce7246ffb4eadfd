//! walk-tracker - real-time dog walk location tracking over MQTT
//!
//! Module structure:
//! - `domain/` - Core types (Location, geodesy, TrackingSession)
//! - `services/` - Business logic (Geofence, SessionRegistry)
//! - `io/` - External interfaces (MQTT transport, session store)
//! - `infra/` - Infrastructure (Config, Metrics, Retry, Broker)

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;
use walk_tracker::domain::TrackingSession;
use walk_tracker::infra::{Config, Metrics};
use walk_tracker::io::{JsonlStore, MqttTransport};
use walk_tracker::services::{Geofence, LiveWalk, SessionRegistry};

/// walk-tracker - GPS tracking and geofencing for dog walks
#[derive(Parser, Debug)]
#[command(name = "walk-tracker", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,

    /// Walk ids to start tracking immediately (repeatable)
    #[arg(short, long = "walk")]
    walks: Vec<String>,

    /// Geofence center as "lat,lon" applied to walks started via --walk
    #[arg(long)]
    fence: Option<String>,
}

fn parse_fence(raw: &str) -> Option<(f64, f64)> {
    let (lat, lon) = raw.split_once(',')?;
    Some((lat.trim().parse().ok()?, lon.trim().parse().ok()?))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Structured logging with configurable level via RUST_LOG env var
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!("walk-tracker starting");

    let args = Args::parse();
    let config = Config::load_from_path(&args.config);

    if config.broker_embedded() {
        walk_tracker::infra::broker::start_embedded_broker(&config);
    }

    info!(
        config_file = %config.config_file(),
        mqtt_host = %config.mqtt_host(),
        mqtt_port = %config.mqtt_port(),
        mqtt_tls = %config.mqtt_tls(),
        geofence_radius_km = %config.geofence_default_radius_km(),
        session_max_history = %config.session_max_history(),
        store_file = %config.session_store_file(),
        "config_loaded"
    );

    let registry = SessionRegistry::new();
    let metrics = Arc::new(Metrics::new());
    let store = Arc::new(JsonlStore::new(config.session_store_file()));

    let mut transport =
        MqttTransport::new(&config, registry.clone(), metrics.clone(), store.clone());
    transport.connect().await?;

    // Sessions requested on the command line; everything else arrives
    // through control topics at runtime.
    let fence_center = args.fence.as_deref().and_then(parse_fence);
    for walk_id in &args.walks {
        let session = TrackingSession::new(walk_id, config.session_max_history());
        let fence = match fence_center {
            Some((lat, lon)) => {
                match Geofence::new(walk_id, lat, lon, config.geofence_default_radius_km()) {
                    Ok(f) => Some(f),
                    Err(e) => {
                        error!(walk_id = %walk_id, error = %e, "geofence_rejected");
                        None
                    }
                }
            }
            None => None,
        };
        let session_id = session.id().to_string();
        match transport.subscribe_to_session(Arc::new(LiveWalk::new(session, fence))).await {
            Ok(()) => info!(walk_id = %walk_id, session_id = %session_id, "walk_started"),
            Err(e) => error!(walk_id = %walk_id, error = %e, "walk_start_failed"),
        }
    }

    // Periodic metrics reporter
    let reporter_metrics = metrics.clone();
    let reporter_registry = registry.clone();
    let interval_secs = config.metrics_interval_secs();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
        loop {
            interval.tick().await;
            reporter_metrics.report(reporter_registry.len()).log();
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("shutdown_signal_received");
    transport.disconnect().await;

    info!("walk-tracker shutdown complete");
    Ok(())
}
