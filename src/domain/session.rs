//! Per-walk tracking session lifecycle
//!
//! A `TrackingSession` is the authoritative in-memory state for one walk:
//! a strict Active/Paused/Completed state machine plus the ordered history
//! of accepted samples. All mutation is serialized behind an internal
//! mutex so inbound broker callbacks can share the session freely.

use crate::domain::error::SessionError;
use crate::domain::geodesy;
use crate::domain::location::Location;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use uuid::Uuid;

/// Upper bound on stored samples when config does not override it.
pub const DEFAULT_MAX_HISTORY: usize = 1000;

/// Worst accuracy (meters) a sample may report and still be accepted
/// into a session. Stricter than the wire-level accuracy bound.
pub const MIN_LOCATION_ACCURACY_M: f64 = 10.0;

/// Session lifecycle state. Completed is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Paused,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Paused => "paused",
            SessionStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable state guarded by the session mutex.
struct SessionState {
    status: SessionStatus,
    history: Vec<Location>,
    total_distance_km: f64,
    ended_at: Option<DateTime<Utc>>,
    last_update: DateTime<Utc>,
}

/// One walk's tracking lifecycle.
pub struct TrackingSession {
    id: String,
    walk_id: String,
    started_at: DateTime<Utc>,
    max_history: usize,
    state: Mutex<SessionState>,
}

impl TrackingSession {
    /// Create an active session for a walk with a fresh UUIDv7 id.
    pub fn new(walk_id: &str, max_history: usize) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7().to_string(),
            walk_id: walk_id.to_string(),
            started_at: now,
            max_history,
            state: Mutex::new(SessionState {
                status: SessionStatus::Active,
                history: Vec::new(),
                total_distance_km: 0.0,
                ended_at: None,
                last_update: now,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn walk_id(&self) -> &str {
        &self.walk_id
    }

    /// Snapshot read of the current status.
    pub fn status(&self) -> SessionStatus {
        self.state.lock().status
    }

    /// Number of accepted samples.
    pub fn location_count(&self) -> usize {
        self.state.lock().history.len()
    }

    /// Append a validated sample to the history.
    ///
    /// Fails unless the session is Active. The sample must pass accuracy
    /// and movement-plausibility checks against the previous sample;
    /// accepted samples extend the accumulated route distance.
    pub fn add_location(&self, loc: Location) -> Result<(), SessionError> {
        loc.validate()?;
        if loc.accuracy > MIN_LOCATION_ACCURACY_M {
            return Err(SessionError::AccuracyTooLow(loc.accuracy));
        }

        let mut state = self.state.lock();
        match state.status {
            SessionStatus::Active => {}
            SessionStatus::Completed => return Err(SessionError::AlreadyCompleted),
            other => return Err(SessionError::NotActive(other)),
        }
        if self.max_history > 0 && state.history.len() >= self.max_history {
            return Err(SessionError::HistoryFull(self.max_history));
        }

        if let Some(prev) = state.history.last() {
            let dt = loc.timestamp - prev.timestamp;
            match geodesy::is_valid_movement(prev, &loc, dt) {
                Ok(true) => {}
                Ok(false) => {
                    let speed_kmh =
                        geodesy::implied_speed_kmh(prev, &loc, dt).unwrap_or(f64::INFINITY);
                    return Err(SessionError::ImplausibleMovement { speed_kmh });
                }
                Err(e) => return Err(e.into()),
            }
            state.total_distance_km += geodesy::distance_km(prev, &loc)?;
        }

        state.history.push(loc);
        state.last_update = Utc::now();
        Ok(())
    }

    /// Active -> Paused.
    pub fn pause(&self) -> Result<(), SessionError> {
        let mut state = self.state.lock();
        match state.status {
            SessionStatus::Active => {
                state.status = SessionStatus::Paused;
                state.last_update = Utc::now();
                Ok(())
            }
            SessionStatus::Completed => Err(SessionError::AlreadyCompleted),
            from => Err(SessionError::InvalidTransition { from, to: SessionStatus::Paused }),
        }
    }

    /// Paused -> Active.
    pub fn resume(&self) -> Result<(), SessionError> {
        let mut state = self.state.lock();
        match state.status {
            SessionStatus::Paused => {
                state.status = SessionStatus::Active;
                state.last_update = Utc::now();
                Ok(())
            }
            SessionStatus::Completed => Err(SessionError::AlreadyCompleted),
            from => Err(SessionError::InvalidTransition { from, to: SessionStatus::Active }),
        }
    }

    /// Transition to the terminal Completed state.
    ///
    /// Legal from Active or Paused; fails if already completed. After
    /// this, only read-only status queries succeed.
    pub fn complete(&self) -> Result<(), SessionError> {
        let mut state = self.state.lock();
        if state.status == SessionStatus::Completed {
            return Err(SessionError::AlreadyCompleted);
        }
        state.status = SessionStatus::Completed;
        let now = Utc::now();
        state.ended_at = Some(now);
        state.last_update = now;
        Ok(())
    }

    /// Immutable snapshot with final statistics, for hand-off to the
    /// durable session store.
    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.lock();

        let end = state.ended_at.unwrap_or_else(Utc::now);
        let duration_secs = (end - self.started_at).num_milliseconds().max(0) as f64 / 1000.0;

        let mut max_speed_kmh = 0.0_f64;
        for pair in state.history.windows(2) {
            let dt = pair[1].timestamp - pair[0].timestamp;
            if let Some(speed) = geodesy::implied_speed_kmh(&pair[0], &pair[1], dt) {
                max_speed_kmh = max_speed_kmh.max(speed);
            }
        }
        let average_speed_kmh = if duration_secs > 0.0 {
            state.total_distance_km / (duration_secs / 3600.0)
        } else {
            0.0
        };

        SessionSnapshot {
            id: self.id.clone(),
            walk_id: self.walk_id.clone(),
            status: state.status,
            started_at: self.started_at,
            ended_at: state.ended_at,
            sample_count: state.history.len(),
            total_distance_km: state.total_distance_km,
            duration_secs,
            average_speed_kmh,
            max_speed_kmh,
        }
    }
}

/// Immutable view of a session handed to the durable store.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub id: String,
    pub walk_id: String,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    pub sample_count: usize,
    pub total_distance_km: f64,
    pub duration_secs: f64,
    pub average_speed_kmh: f64,
    pub max_speed_kmh: f64,
}
