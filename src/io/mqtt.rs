//! MQTT transport for location ingest and session control
//!
//! Topic layout per walk session:
//! - `walks/location/{session_id}`: inbound GPS samples (QoS 1)
//! - `walks/location/{session_id}/live`: accepted samples rebroadcast
//!   to watchers (QoS 0)
//! - `walks/control/{session_id}`: pause/resume/complete commands (QoS 1)
//! - `walks/control/{session_id}/ack`: command acknowledgements (QoS 1)
//!
//! Routing is a pure function over the session registry so the full
//! inbound path is testable without a broker; the connected transport
//! wraps it with the rumqttc event loop and publish retries.

use crate::domain::error::ValidationError;
use crate::domain::location::Location;
use crate::domain::session::{SessionSnapshot, SessionStatus};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::infra::retry::RetryPolicy;
use crate::io::store::SessionStore;
use crate::services::registry::{LiveWalk, SessionRegistry};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS, Transport};
use serde::Deserialize;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Topic prefix for inbound location samples.
pub const TOPIC_LOCATION_PREFIX: &str = "walks/location/";
/// Topic prefix for session control commands.
pub const TOPIC_CONTROL_PREFIX: &str = "walks/control/";
/// System topic observed for broker liveness.
pub const TOPIC_HEARTBEAT: &str = "service/heartbeat";

/// Suffix distinguishing rebroadcast samples from inbound ones.
const LIVE_SUFFIX: &str = "/live";
const ACK_SUFFIX: &str = "/ack";

pub fn location_topic(session_id: &str) -> String {
    format!("{TOPIC_LOCATION_PREFIX}{session_id}")
}

pub fn control_topic(session_id: &str) -> String {
    format!("{TOPIC_CONTROL_PREFIX}{session_id}")
}

pub fn live_topic(session_id: &str) -> String {
    format!("{TOPIC_LOCATION_PREFIX}{session_id}{LIVE_SUFFIX}")
}

pub fn ack_topic(control_topic: &str) -> String {
    format!("{control_topic}{ACK_SUFFIX}")
}

/// Extract the session id segment from a location or control topic.
fn session_id_from_topic<'a>(topic: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = topic.strip_prefix(prefix)?;
    if rest.is_empty() || rest.contains('/') {
        return None;
    }
    Some(rest)
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to reach broker after {0} attempts")]
    ConnectExhausted(u32),
    #[error("publish to {topic} failed after {attempts} attempts")]
    PublishExhausted { topic: String, attempts: u32 },
    #[error("subscribe to {topic} failed: {source}")]
    Subscribe {
        topic: String,
        #[source]
        source: rumqttc::ClientError,
    },
    #[error("session {0} is already completed")]
    SessionCompleted(String),
    #[error("transport is already connected")]
    AlreadyConnected,
    #[error(transparent)]
    InvalidLocation(#[from] ValidationError),
}

/// A message the router wants published back to the broker.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
}

/// Result of routing one inbound message.
#[derive(Debug, Default)]
pub struct Routed {
    pub outbound: Vec<OutboundMessage>,
    /// Snapshots of sessions completed by this message, awaiting topic
    /// unsubscription and persistence. The sessions stay registered so
    /// they remain queryable until disconnect evicts them.
    pub completed: Vec<SessionSnapshot>,
}

#[derive(Deserialize)]
struct ControlPayload {
    #[serde(default)]
    command: String,
}

/// Route one inbound broker message to the owning session.
///
/// Pure with respect to the broker: all side effects are confined to the
/// registry and metrics, and anything to publish comes back in `Routed`.
pub fn route_message(
    registry: &SessionRegistry,
    metrics: &Metrics,
    topic: &str,
    payload: &[u8],
) -> Routed {
    if topic == TOPIC_HEARTBEAT {
        debug!("heartbeat_received");
        return Routed::default();
    }
    if topic.starts_with(TOPIC_LOCATION_PREFIX) && !topic.ends_with(LIVE_SUFFIX) {
        return handle_location_update(registry, metrics, topic, payload);
    }
    if topic.starts_with(TOPIC_CONTROL_PREFIX) && !topic.ends_with(ACK_SUFFIX) {
        return handle_session_control(registry, metrics, topic, payload);
    }
    debug!(topic = %topic, "unhandled_topic");
    Routed::default()
}

fn handle_location_update(
    registry: &SessionRegistry,
    metrics: &Metrics,
    topic: &str,
    payload: &[u8],
) -> Routed {
    metrics.record_sample_received();

    let Some(session_id) = session_id_from_topic(topic, TOPIC_LOCATION_PREFIX) else {
        warn!(topic = %topic, "malformed_location_topic");
        metrics.record_sample_rejected();
        return Routed::default();
    };
    let Some(walk) = registry.get(session_id) else {
        metrics.record_sample_unmatched();
        debug!(session_id = %session_id, "sample_for_unknown_session");
        return Routed::default();
    };

    let location = match Location::from_json(payload) {
        Ok(loc) => loc,
        Err(e) => {
            metrics.record_sample_rejected();
            warn!(session_id = %session_id, error = %e, "sample_rejected");
            return Routed::default();
        }
    };

    match walk.session.add_location(location.clone()) {
        Ok(()) => {
            metrics.record_sample_accepted();
            // Containment is checked only for accepted samples, so a
            // spoofed jump the plausibility gate rejects cannot count
            // as a boundary violation. An out-of-fence sample is still
            // a real position and stays recorded.
            if let Some(fence) = &walk.geofence {
                let mut fence = fence.lock();
                match fence.contains_point(&location) {
                    Ok(true) => {}
                    Ok(false) => {
                        metrics.record_boundary_violation();
                        warn!(
                            session_id = %session_id,
                            walk_id = %location.walk_id,
                            violations = %fence.boundary_violations(),
                            "boundary_violation"
                        );
                    }
                    Err(e) => {
                        debug!(session_id = %session_id, error = %e, "geofence_check_skipped")
                    }
                }
            }
            let payload = match serde_json::to_vec(&location) {
                Ok(p) => p,
                Err(e) => {
                    error!(session_id = %session_id, error = %e, "live_encode_failed");
                    return Routed::default();
                }
            };
            Routed {
                outbound: vec![OutboundMessage {
                    topic: live_topic(session_id),
                    payload,
                    qos: QoS::AtMostOnce,
                }],
                completed: Vec::new(),
            }
        }
        Err(e) => {
            metrics.record_sample_rejected();
            warn!(session_id = %session_id, error = %e, "sample_rejected");
            Routed::default()
        }
    }
}

fn handle_session_control(
    registry: &SessionRegistry,
    metrics: &Metrics,
    topic: &str,
    payload: &[u8],
) -> Routed {
    metrics.record_control_command();

    let Some(session_id) = session_id_from_topic(topic, TOPIC_CONTROL_PREFIX) else {
        warn!(topic = %topic, "malformed_control_topic");
        return Routed::default();
    };
    let Some(walk) = registry.get(session_id) else {
        debug!(session_id = %session_id, "control_for_unknown_session");
        return Routed::default();
    };

    let command = match serde_json::from_slice::<ControlPayload>(payload) {
        Ok(p) => p.command.trim().to_lowercase(),
        Err(e) => {
            warn!(session_id = %session_id, error = %e, "malformed_control_payload");
            return Routed::default();
        }
    };
    if command.is_empty() {
        warn!(session_id = %session_id, "empty_control_command");
        return Routed::default();
    }

    let mut routed = Routed::default();
    let applied = match command.as_str() {
        "pause" => walk.session.pause(),
        "resume" => walk.session.resume(),
        "complete" => walk.session.complete(),
        other => {
            warn!(session_id = %session_id, command = %other, "unrecognized_command");
            return routed;
        }
    };

    match applied {
        Ok(()) => {
            info!(session_id = %session_id, command = %command, "command_applied");
            if command == "complete" {
                // The entry stays in the registry until disconnect; a
                // redelivered complete is refused by the session itself.
                routed.completed.push(walk.session.snapshot());
            }
            // Acked only when the transition actually happened.
            let ack = format!(
                r#"{{"sessionID":"{}","command":"{}","status":"ack"}}"#,
                session_id, command
            );
            metrics.record_ack_sent();
            routed.outbound.push(OutboundMessage {
                topic: ack_topic(topic),
                payload: ack.into_bytes(),
                qos: QoS::AtLeastOnce,
            });
        }
        Err(e) => {
            warn!(session_id = %session_id, command = %command, error = %e, "command_refused");
        }
    }
    routed
}

/// Connected MQTT transport
///
/// Owns the rumqttc client and the background dispatch and health-check
/// tasks. One instance per process.
pub struct MqttTransport {
    client: AsyncClient,
    eventloop: Option<EventLoop>,
    registry: SessionRegistry,
    metrics: Arc<Metrics>,
    store: Arc<dyn SessionStore>,
    retry: RetryPolicy,
    connection_timeout: Duration,
    health_check_interval: Duration,
    connected: Arc<AtomicBool>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl MqttTransport {
    pub fn new(
        config: &Config,
        registry: SessionRegistry,
        metrics: Arc<Metrics>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        let client_id = format!("walk-tracker-{}", Uuid::now_v7().simple());
        let mut options = MqttOptions::new(client_id, config.mqtt_host(), config.mqtt_port());
        options.set_keep_alive(config.mqtt_keep_alive());
        if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
            options.set_credentials(username, password);
        }
        if config.mqtt_tls() {
            options.set_transport(Transport::tls_with_default_config());
        }

        let (client, eventloop) = AsyncClient::new(options, 100);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            client,
            eventloop: Some(eventloop),
            registry,
            metrics,
            store,
            retry: config.retry_policy(),
            connection_timeout: config.mqtt_connection_timeout(),
            health_check_interval: config.health_check_interval(),
            connected: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            shutdown_rx,
            tasks: Vec::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Establish the broker connection and start the background tasks.
    ///
    /// Drives the event loop until the broker acknowledges the connection,
    /// retrying per the configured policy. Fails once attempts are
    /// exhausted.
    pub async fn connect(&mut self) -> Result<(), TransportError> {
        let mut eventloop = self.eventloop.take().ok_or(TransportError::AlreadyConnected)?;

        let mut attempt = 1u32;
        loop {
            match tokio::time::timeout(self.connection_timeout, eventloop.poll()).await {
                Ok(Ok(Event::Incoming(Packet::ConnAck(_)))) => {
                    info!(attempt = %attempt, "broker_connected");
                    self.connected.store(true, Ordering::Relaxed);
                    break;
                }
                Ok(Ok(_)) => continue,
                Ok(Err(e)) => {
                    warn!(attempt = %attempt, error = %e, "broker_connect_failed");
                    if attempt >= self.retry.max_attempts() {
                        return Err(TransportError::ConnectExhausted(attempt));
                    }
                    tokio::time::sleep(self.retry.delay(attempt)).await;
                    attempt += 1;
                }
                Err(_) => {
                    warn!(attempt = %attempt, "broker_connect_timeout");
                    if attempt >= self.retry.max_attempts() {
                        return Err(TransportError::ConnectExhausted(attempt));
                    }
                    attempt += 1;
                }
            }
        }

        // Liveness topic; losing it is not fatal.
        if let Err(e) = self.client.subscribe(TOPIC_HEARTBEAT, QoS::AtLeastOnce).await {
            warn!(topic = %TOPIC_HEARTBEAT, error = %e, "heartbeat_subscribe_failed");
        }

        self.tasks.push(tokio::spawn(dispatch_loop(
            eventloop,
            self.client.clone(),
            self.registry.clone(),
            self.metrics.clone(),
            self.store.clone(),
            self.connected.clone(),
            self.shutdown_rx.clone(),
        )));
        self.tasks.push(tokio::spawn(health_check_loop(
            self.connected.clone(),
            self.health_check_interval,
            self.shutdown_rx.clone(),
        )));

        Ok(())
    }

    /// Subscribe to the location and control topics for a session and
    /// register it for routing.
    ///
    /// Completed sessions are refused. If the control subscription fails
    /// after the location one succeeded, the location subscription is
    /// rolled back so the session is either fully wired or not at all.
    pub async fn subscribe_to_session(&self, walk: Arc<LiveWalk>) -> Result<(), TransportError> {
        let session_id = walk.session.id().to_string();
        if walk.session.status() == SessionStatus::Completed {
            return Err(TransportError::SessionCompleted(session_id));
        }

        let loc_topic = location_topic(&session_id);
        self.client
            .subscribe(&loc_topic, QoS::AtLeastOnce)
            .await
            .map_err(|source| TransportError::Subscribe { topic: loc_topic.clone(), source })?;

        let ctrl_topic = control_topic(&session_id);
        if let Err(source) = self.client.subscribe(&ctrl_topic, QoS::AtLeastOnce).await {
            // Roll back so we never route samples for a session that
            // cannot receive control commands.
            if let Err(e) = self.client.unsubscribe(&loc_topic).await {
                warn!(topic = %loc_topic, error = %e, "rollback_unsubscribe_failed");
            }
            return Err(TransportError::Subscribe { topic: ctrl_topic, source });
        }

        self.registry.insert(&session_id, walk);
        info!(session_id = %session_id, "session_subscribed");
        Ok(())
    }

    /// Publish a location sample on behalf of a session (QoS 1).
    ///
    /// Retries per the configured policy before giving up.
    pub async fn publish_location(
        &self,
        session_id: &str,
        location: &Location,
    ) -> Result<(), TransportError> {
        location.validate()?;
        let payload = serde_json::to_vec(location)
            .map_err(|e| ValidationError::MalformedPayload(e.to_string()))?;
        let topic = location_topic(session_id);

        let mut attempt = 1u32;
        loop {
            match self.client.publish(&topic, QoS::AtLeastOnce, false, payload.clone()).await {
                Ok(()) => {
                    self.metrics.record_publish();
                    debug!(session_id = %session_id, topic = %topic, "location_published");
                    return Ok(());
                }
                Err(e) => {
                    warn!(topic = %topic, attempt = %attempt, error = %e, "publish_failed");
                    if attempt >= self.retry.max_attempts() {
                        self.metrics.record_publish_failure();
                        return Err(TransportError::PublishExhausted { topic, attempts: attempt });
                    }
                    self.metrics.record_publish_retry();
                    tokio::time::sleep(self.retry.delay(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Graceful shutdown: stop background tasks, unsubscribe, persist a
    /// snapshot for every registered session, and close the connection.
    pub async fn disconnect(&mut self) {
        let _ = self.shutdown_tx.send(true);

        for (session_id, walk) in self.registry.drain() {
            if let Err(e) = self.client.unsubscribe(location_topic(&session_id)).await {
                debug!(session_id = %session_id, error = %e, "unsubscribe_failed");
            }
            if let Err(e) = self.client.unsubscribe(control_topic(&session_id)).await {
                debug!(session_id = %session_id, error = %e, "unsubscribe_failed");
            }
            let snapshot = walk.session.snapshot();
            if let Err(e) = self.store.persist(&snapshot).await {
                error!(session_id = %session_id, error = %e, "snapshot_persist_failed");
            }
        }
        if let Err(e) = self.client.unsubscribe(TOPIC_HEARTBEAT).await {
            debug!(error = %e, "unsubscribe_failed");
        }

        match tokio::time::timeout(Duration::from_secs(2), self.client.disconnect()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "broker_disconnect_failed"),
            Err(_) => warn!("broker_disconnect_timeout"),
        }
        self.connected.store(false, Ordering::Relaxed);

        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
        info!("transport_disconnected");
    }
}

/// Drive the event loop: route inbound publishes, publish what routing
/// asks for, persist completed sessions, track connection liveness.
async fn dispatch_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    registry: SessionRegistry,
    metrics: Arc<Metrics>,
    store: Arc<dyn SessionStore>,
    connected: Arc<AtomicBool>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("dispatch_shutdown");
                    return;
                }
            }
            result = eventloop.poll() => {
                match result {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        // A malformed payload must never take down the
                        // event loop.
                        let routed = match std::panic::catch_unwind(AssertUnwindSafe(|| {
                            route_message(&registry, &metrics, &publish.topic, &publish.payload)
                        })) {
                            Ok(routed) => routed,
                            Err(_) => {
                                error!(topic = %publish.topic, "routing_panicked");
                                continue;
                            }
                        };

                        for msg in routed.outbound {
                            match client.publish(&msg.topic, msg.qos, false, msg.payload).await {
                                Ok(()) => metrics.record_publish(),
                                Err(e) => {
                                    metrics.record_publish_failure();
                                    warn!(topic = %msg.topic, error = %e, "outbound_publish_failed");
                                }
                            }
                        }
                        for snapshot in routed.completed {
                            let session_id = snapshot.id.clone();
                            if let Err(e) = client.unsubscribe(location_topic(&session_id)).await {
                                debug!(session_id = %session_id, error = %e, "unsubscribe_failed");
                            }
                            if let Err(e) = client.unsubscribe(control_topic(&session_id)).await {
                                debug!(session_id = %session_id, error = %e, "unsubscribe_failed");
                            }
                            if let Err(e) = store.persist(&snapshot).await {
                                error!(session_id = %session_id, error = %e, "snapshot_persist_failed");
                            }
                        }
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        // The event loop reconnects on its own; every
                        // ConnAck seen here is a reconnect.
                        connected.store(true, Ordering::Relaxed);
                        metrics.record_reconnect();
                        info!("broker_reconnected");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        connected.store(false, Ordering::Relaxed);
                        error!(error = %e, "broker_connection_lost");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }
    }
}

/// Periodic broker liveness report.
///
/// Reconnection itself is owned by the rumqttc event loop, which redials
/// automatically after an error; this task only observes the liveness
/// flag the dispatch loop maintains and raises a warning while the
/// broker stays unreachable.
async fn health_check_loop(
    connected: Arc<AtomicBool>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return;
                }
            }
            _ = ticker.tick() => {
                if connected.load(Ordering::Relaxed) {
                    debug!("health_check_ok");
                } else {
                    warn!("health_check_broker_unreachable");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::session::TrackingSession;
    use crate::io::store::JsonlStore;
    use crate::services::geofence::Geofence;
    use chrono::{TimeDelta, Utc};

    fn registry_with_session(fence: Option<Geofence>) -> (SessionRegistry, String) {
        let registry = SessionRegistry::new();
        let session = TrackingSession::new("walk-1", 1000);
        let session_id = session.id().to_string();
        registry.insert(&session_id, Arc::new(LiveWalk::new(session, fence)));
        (registry, session_id)
    }

    fn sample_payload(lat: f64, lon: f64, offset_secs: i64) -> Vec<u8> {
        let loc = Location::new("walk-1", lat, lon)
            .with_timestamp(Utc::now() + TimeDelta::seconds(offset_secs));
        serde_json::to_vec(&loc).unwrap()
    }

    #[test]
    fn test_topic_helpers() {
        assert_eq!(location_topic("abc"), "walks/location/abc");
        assert_eq!(control_topic("abc"), "walks/control/abc");
        assert_eq!(live_topic("abc"), "walks/location/abc/live");
        assert_eq!(ack_topic("walks/control/abc"), "walks/control/abc/ack");

        assert_eq!(session_id_from_topic("walks/location/abc", TOPIC_LOCATION_PREFIX), Some("abc"));
        assert_eq!(session_id_from_topic("walks/location/", TOPIC_LOCATION_PREFIX), None);
        assert_eq!(session_id_from_topic("walks/location/a/b", TOPIC_LOCATION_PREFIX), None);
    }

    #[test]
    fn test_route_location_rebroadcasts_live() {
        let (registry, session_id) = registry_with_session(None);
        let metrics = Metrics::new();

        let routed = route_message(
            &registry,
            &metrics,
            &location_topic(&session_id),
            &sample_payload(40.0, -75.0, 0),
        );

        assert_eq!(routed.outbound.len(), 1);
        assert_eq!(routed.outbound[0].topic, live_topic(&session_id));
        assert_eq!(routed.outbound[0].qos, QoS::AtMostOnce);
        assert_eq!(registry.get(&session_id).unwrap().session.location_count(), 1);
        assert_eq!(metrics.samples_accepted(), 1);
    }

    #[test]
    fn test_route_location_unknown_session() {
        let registry = SessionRegistry::new();
        let metrics = Metrics::new();

        let routed = route_message(
            &registry,
            &metrics,
            "walks/location/nobody",
            &sample_payload(40.0, -75.0, 0),
        );

        assert!(routed.outbound.is_empty());
        assert_eq!(metrics.samples_total(), 1);
        assert_eq!(metrics.samples_accepted(), 0);
    }

    #[test]
    fn test_route_location_malformed_payload() {
        let (registry, session_id) = registry_with_session(None);
        let metrics = Metrics::new();

        let routed =
            route_message(&registry, &metrics, &location_topic(&session_id), b"not json");
        assert!(routed.outbound.is_empty());
        assert_eq!(registry.get(&session_id).unwrap().session.location_count(), 0);
    }

    #[test]
    fn test_route_location_counts_boundary_violation() {
        let fence = Geofence::new("walk-1", 40.0, -75.0, 0.5).unwrap();
        let (registry, session_id) = registry_with_session(Some(fence));
        let metrics = Metrics::new();

        // ~1.1 km north of the fence center
        let routed = route_message(
            &registry,
            &metrics,
            &location_topic(&session_id),
            &sample_payload(40.01, -75.0, 0),
        );

        assert_eq!(metrics.boundary_violations(), 1);
        let walk = registry.get(&session_id).unwrap();
        assert_eq!(walk.geofence.as_ref().unwrap().lock().boundary_violations(), 1);
        // the violating position is still recorded
        assert_eq!(walk.session.location_count(), 1);
        assert_eq!(routed.outbound.len(), 1);
    }

    #[test]
    fn test_rejected_sample_counts_no_boundary_violation() {
        let fence = Geofence::new("walk-1", 40.0, -75.0, 0.5).unwrap();
        let (registry, session_id) = registry_with_session(Some(fence));
        let metrics = Metrics::new();
        let loc_topic = location_topic(&session_id);

        route_message(&registry, &metrics, &loc_topic, &sample_payload(40.0, -75.0, 0));

        // a spoofed 10 km jump is outside the fence but fails the
        // plausibility gate, so it must not register as a violation
        let routed = route_message(&registry, &metrics, &loc_topic, &sample_payload(40.09, -75.0, 60));
        assert!(routed.outbound.is_empty());
        assert_eq!(metrics.samples_rejected(), 1);
        assert_eq!(metrics.boundary_violations(), 0);
        let walk = registry.get(&session_id).unwrap();
        assert_eq!(walk.geofence.as_ref().unwrap().lock().boundary_violations(), 0);
    }

    #[tokio::test]
    async fn test_subscribe_refuses_completed_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonlStore::new(
            dir.path().join("sessions.jsonl").to_str().unwrap(),
        ));
        let registry = SessionRegistry::new();
        let transport = MqttTransport::new(
            &Config::default(),
            registry.clone(),
            Arc::new(Metrics::new()),
            store,
        );

        let session = TrackingSession::new("walk-1", 1000);
        session.complete().unwrap();
        let err = transport
            .subscribe_to_session(Arc::new(LiveWalk::new(session, None)))
            .await
            .unwrap_err();

        assert!(matches!(err, TransportError::SessionCompleted(_)));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_route_control_pause_blocks_samples() {
        let (registry, session_id) = registry_with_session(None);
        let metrics = Metrics::new();
        let ctrl = control_topic(&session_id);

        let routed = route_message(&registry, &metrics, &ctrl, br#"{"command":"pause"}"#);
        assert_eq!(routed.outbound.len(), 1);
        assert_eq!(routed.outbound[0].topic, ack_topic(&ctrl));
        assert_eq!(routed.outbound[0].qos, QoS::AtLeastOnce);

        let routed = route_message(
            &registry,
            &metrics,
            &location_topic(&session_id),
            &sample_payload(40.0, -75.0, 0),
        );
        assert!(routed.outbound.is_empty());
        assert_eq!(registry.get(&session_id).unwrap().session.location_count(), 0);
    }

    #[test]
    fn test_route_control_refused_has_no_ack() {
        let (registry, session_id) = registry_with_session(None);
        let metrics = Metrics::new();
        let ctrl = control_topic(&session_id);

        // resume without a prior pause is an invalid transition
        let routed = route_message(&registry, &metrics, &ctrl, br#"{"command":"resume"}"#);
        assert!(routed.outbound.is_empty());
        assert_eq!(metrics.acks_sent(), 0);
    }

    #[test]
    fn test_route_control_unrecognized_command() {
        let (registry, session_id) = registry_with_session(None);
        let metrics = Metrics::new();

        let routed = route_message(
            &registry,
            &metrics,
            &control_topic(&session_id),
            br#"{"command":"teleport"}"#,
        );
        assert!(routed.outbound.is_empty());
        assert_eq!(
            registry.get(&session_id).unwrap().session.status(),
            SessionStatus::Active
        );
    }

    #[test]
    fn test_route_control_complete_snapshots_and_stays_registered() {
        let (registry, session_id) = registry_with_session(None);
        let metrics = Metrics::new();
        let ctrl = control_topic(&session_id);

        route_message(
            &registry,
            &metrics,
            &location_topic(&session_id),
            &sample_payload(40.0, -75.0, 0),
        );
        let routed = route_message(&registry, &metrics, &ctrl, br#"{"command":"complete"}"#);

        assert_eq!(routed.completed.len(), 1);
        assert_eq!(routed.completed[0].status, SessionStatus::Completed);
        assert_eq!(routed.completed[0].sample_count, 1);

        // the completed session stays queryable until disconnect
        let walk = registry.get(&session_id).expect("completed session evicted");
        assert_eq!(walk.session.status(), SessionStatus::Completed);

        let ack: serde_json::Value =
            serde_json::from_slice(&routed.outbound[0].payload).unwrap();
        assert_eq!(ack["sessionID"], session_id);
        assert_eq!(ack["command"], "complete");
        assert_eq!(ack["status"], "ack");

        // a redelivered complete hits the already-completed session and
        // is refused: no second ack, no second snapshot
        let routed = route_message(&registry, &metrics, &ctrl, br#"{"command":"complete"}"#);
        assert!(routed.outbound.is_empty());
        assert!(routed.completed.is_empty());
        assert_eq!(metrics.acks_sent(), 1);
        assert!(registry.get(&session_id).is_some());
    }

    #[test]
    fn test_route_ignores_own_live_and_ack_topics() {
        let (registry, session_id) = registry_with_session(None);
        let metrics = Metrics::new();

        let routed = route_message(
            &registry,
            &metrics,
            &live_topic(&session_id),
            &sample_payload(40.0, -75.0, 0),
        );
        assert!(routed.outbound.is_empty());
        assert_eq!(metrics.samples_total(), 0);

        let routed = route_message(
            &registry,
            &metrics,
            &ack_topic(&control_topic(&session_id)),
            br#"{"status":"ack"}"#,
        );
        assert!(routed.outbound.is_empty());
    }

    #[test]
    fn test_route_heartbeat_and_unknown_topics() {
        let registry = SessionRegistry::new();
        let metrics = Metrics::new();

        assert!(route_message(&registry, &metrics, TOPIC_HEARTBEAT, b"ping").outbound.is_empty());
        assert!(route_message(&registry, &metrics, "other/topic", b"x").outbound.is_empty());
        assert_eq!(metrics.samples_total(), 0);
    }

    #[test]
    fn test_walk_scenario_end_to_end() {
        let fence = Geofence::new("walk-1", 40.0, -75.0, 1.0).unwrap();
        let (registry, session_id) = registry_with_session(Some(fence));
        let metrics = Metrics::new();
        let loc_topic = location_topic(&session_id);
        let ctrl = control_topic(&session_id);

        // two in-fence samples a minute apart
        route_message(&registry, &metrics, &loc_topic, &sample_payload(40.0, -75.0, 0));
        route_message(&registry, &metrics, &loc_topic, &sample_payload(40.001, -75.0, 60));

        // pause, attempt a sample, resume
        route_message(&registry, &metrics, &ctrl, br#"{"command":"pause"}"#);
        route_message(&registry, &metrics, &loc_topic, &sample_payload(40.002, -75.0, 120));
        route_message(&registry, &metrics, &ctrl, br#"{"command":"resume"}"#);

        // one more sample, then complete
        route_message(&registry, &metrics, &loc_topic, &sample_payload(40.002, -75.0, 180));
        let routed = route_message(&registry, &metrics, &ctrl, br#"{"command":"complete"}"#);

        let snapshot = &routed.completed[0];
        assert_eq!(snapshot.sample_count, 3);
        assert!(snapshot.total_distance_km > 0.0);
        assert_eq!(metrics.samples_accepted(), 3);
        assert_eq!(metrics.samples_rejected(), 1);
        assert_eq!(metrics.acks_sent(), 3);
        let walk = registry.get(&session_id).unwrap();
        assert_eq!(walk.session.status(), SessionStatus::Completed);
    }
}
