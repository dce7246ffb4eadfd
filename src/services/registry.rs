//! Live-session registry
//!
//! Maps session ids to live walks for the transport adapter's inbound
//! callbacks. Callbacks run concurrently on the runtime's workers, so
//! the map is guarded by a rwlock and all access goes through these
//! methods; nothing outside this type touches the map.

use crate::domain::session::TrackingSession;
use crate::services::geofence::Geofence;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// One walk's live state: the tracking session plus its optional fence.
///
/// The geofence sits behind its own mutex because the containment check
/// mutates the violation counter.
pub struct LiveWalk {
    pub session: TrackingSession,
    pub geofence: Option<Mutex<Geofence>>,
}

impl LiveWalk {
    pub fn new(session: TrackingSession, geofence: Option<Geofence>) -> Self {
        Self { session, geofence: geofence.map(Mutex::new) }
    }
}

/// Concurrency-safe map of live walks keyed by session id.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<RwLock<FxHashMap<String, Arc<LiveWalk>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session_id: &str, walk: Arc<LiveWalk>) {
        self.inner.write().insert(session_id.to_string(), walk);
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<LiveWalk>> {
        self.inner.read().get(session_id).cloned()
    }

    pub fn remove(&self, session_id: &str) -> Option<Arc<LiveWalk>> {
        self.inner.write().remove(session_id)
    }

    /// Remove and return every registered walk, for disconnect cleanup.
    pub fn drain(&self) -> Vec<(String, Arc<LiveWalk>)> {
        self.inner.write().drain().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::session::{TrackingSession, DEFAULT_MAX_HISTORY};

    fn walk(id: &str) -> Arc<LiveWalk> {
        Arc::new(LiveWalk::new(TrackingSession::new(id, DEFAULT_MAX_HISTORY), None))
    }

    #[test]
    fn test_insert_get_remove() {
        let registry = SessionRegistry::new();
        assert!(registry.is_empty());

        registry.insert("abc123", walk("abc123"));
        assert_eq!(registry.len(), 1);
        assert!(registry.get("abc123").is_some());
        assert!(registry.get("missing").is_none());

        let removed = registry.remove("abc123").unwrap();
        assert_eq!(removed.session.walk_id(), "abc123");
        assert!(registry.is_empty());
    }

    #[test]
    fn test_drain_clears_all() {
        let registry = SessionRegistry::new();
        registry.insert("a", walk("a"));
        registry.insert("b", walk("b"));

        let drained = registry.drain();
        assert_eq!(drained.len(), 2);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_concurrent_access() {
        use std::thread;

        let registry = SessionRegistry::new();
        let mut handles = vec![];

        for t in 0..8 {
            let r = registry.clone();
            handles.push(thread::spawn(move || {
                for i in 0..100 {
                    let id = format!("walk-{}-{}", t, i);
                    r.insert(&id, walk(&id));
                    assert!(r.get(&id).is_some());
                    if i % 2 == 0 {
                        r.remove(&id);
                    }
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(registry.len(), 8 * 50);
    }
}
