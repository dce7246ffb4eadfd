//! Session snapshot persistence
//!
//! Completed and evicted sessions are written in JSONL format
//! (one JSON object per line) to the file specified in config.

use crate::domain::session::SessionSnapshot;
use async_trait::async_trait;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

/// Sink for session snapshots
///
/// The transport does not care where snapshots end up; tests swap in
/// an in-memory implementation.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn persist(&self, snapshot: &SessionSnapshot) -> anyhow::Result<()>;
}

/// Append-only JSONL file store
pub struct JsonlStore {
    file_path: String,
}

impl JsonlStore {
    pub fn new(file_path: &str) -> Self {
        info!(file_path = %file_path, "store_initialized");
        Self { file_path: file_path.to_string() }
    }

    fn append_line(&self, line: &str) -> std::io::Result<()> {
        let path = Path::new(&self.file_path);

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", line)?;
        debug!(file = %self.file_path, bytes = %line.len(), "snapshot_written");

        Ok(())
    }
}

#[async_trait]
impl SessionStore for JsonlStore {
    async fn persist(&self, snapshot: &SessionSnapshot) -> anyhow::Result<()> {
        let json = serde_json::to_string(snapshot)?;
        self.append_line(&json)?;
        info!(
            session_id = %snapshot.id,
            walk_id = %snapshot.walk_id,
            status = %snapshot.status,
            samples = %snapshot.sample_count,
            "session_persisted"
        );
        Ok(())
    }
}
