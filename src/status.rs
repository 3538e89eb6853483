//! # Status Module
//!
//! Diagnostic snapshot of the pipeline: last input, last action, connected
//! controllers and advisories.
//!
//! Snapshots are published on a `tokio::sync::watch` channel and, when a
//! status file is configured, written there as pretty-printed JSON:
//!
//! ```json
//! {
//!   "last_input": "#1 left/dpad_left pressed",
//!   "last_action": "tap home",
//!   "connected_controllers": 1,
//!   "side_unknown": false,
//!   "injection_authorized": true,
//!   "mapping_mode": false,
//!   "updated_at": "2026-10-18T09:30:00Z"
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tracing::{debug, warn};

/// Point-in-time pipeline status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    /// Description of the last canonical input.
    pub last_input: Option<String>,
    /// Description of the last synthesized action or why none happened.
    pub last_action: Option<String>,
    pub connected_controllers: usize,
    /// A reduced-profile controller could not be assigned a side.
    pub side_unknown: bool,
    pub injection_authorized: bool,
    pub mapping_mode: bool,
    pub updated_at: DateTime<Utc>,
}

impl Default for Status {
    fn default() -> Self {
        Self {
            last_input: None,
            last_action: None,
            connected_controllers: 0,
            side_unknown: false,
            injection_authorized: true,
            mapping_mode: false,
            updated_at: Utc::now(),
        }
    }
}

impl Status {
    /// One-line summary for logs.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "{} controller(s), last input: {}, last action: {}",
            self.connected_controllers,
            self.last_input.as_deref().unwrap_or("none"),
            self.last_action.as_deref().unwrap_or("none"),
        );
        if self.side_unknown {
            summary.push_str(", side unknown (assumed right)");
        }
        if !self.injection_authorized {
            summary.push_str(", key injection not authorized");
        }
        summary
    }
}

/// Writes snapshots to a JSON file.
#[derive(Debug, Clone)]
pub struct StatusFile {
    path: PathBuf,
}

impl StatusFile {
    #[must_use]
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replaces the file content with `status`.
    ///
    /// Written to a sibling temp file first and renamed into place, so
    /// readers never see a partial document.
    pub fn write(&self, status: &Status) -> io::Result<()> {
        let json = serde_json::to_string_pretty(status)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)
    }
}

/// Owns the sending side of the status channel.
///
/// Publishing only touches the channel; the status file is written by
/// [`persist`] on another task.
#[derive(Debug)]
pub struct StatusPublisher {
    tx: watch::Sender<Status>,
    current: Status,
}

impl StatusPublisher {
    /// Creates the publisher and its first receiver.
    #[must_use]
    pub fn new() -> (Self, watch::Receiver<Status>) {
        let current = Status::default();
        let (tx, rx) = watch::channel(current.clone());
        (Self { tx, current }, rx)
    }

    #[must_use]
    pub fn current(&self) -> &Status {
        &self.current
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Status> {
        self.tx.subscribe()
    }

    /// Applies `change`, stamps the time and publishes the result.
    pub fn update(&mut self, change: impl FnOnce(&mut Status)) {
        change(&mut self.current);
        self.current.updated_at = Utc::now();

        // No receivers left is fine
        let _ = self.tx.send(self.current.clone());
    }
}

/// Writes every published snapshot to `file` until the publisher is dropped.
///
/// Writes run on the blocking pool. Snapshots published while a write is in
/// flight are coalesced into the next one. A failing write is logged and
/// does not stop persisting.
pub async fn persist(file: StatusFile, mut rx: watch::Receiver<Status>) {
    while rx.changed().await.is_ok() {
        let status = rx.borrow_and_update().clone();
        let writer = file.clone();
        match tokio::task::spawn_blocking(move || writer.write(&status)).await {
            Ok(Ok(())) => debug!("Status written to {}", file.path().display()),
            Ok(Err(e)) => warn!("Failed to write status file {}: {}", file.path().display(), e),
            Err(e) => warn!("Status writer task failed: {}", e),
        }
    }
    debug!("Status publisher closed; persistence stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_status() {
        let status = Status::default();
        assert_eq!(status.connected_controllers, 0);
        assert!(status.injection_authorized);
        assert!(status.last_input.is_none());
    }

    #[test]
    fn test_summary_mentions_advisories() {
        let status = Status {
            side_unknown: true,
            injection_authorized: false,
            connected_controllers: 2,
            ..Status::default()
        };
        let summary = status.summary();
        assert!(summary.starts_with("2 controller(s)"));
        assert!(summary.contains("side unknown"));
        assert!(summary.contains("not authorized"));
    }

    #[test]
    fn test_publisher_broadcasts_updates() {
        let (mut publisher, rx) = StatusPublisher::new();
        publisher.update(|status| {
            status.connected_controllers = 1;
            status.last_input = Some("#1 left/dpad_left pressed".to_string());
        });

        let seen = rx.borrow().clone();
        assert_eq!(seen.connected_controllers, 1);
        assert_eq!(seen.last_input.as_deref(), Some("#1 left/dpad_left pressed"));
        assert_eq!(&seen, publisher.current());
    }

    #[test]
    fn test_status_file_write() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("status.json");
        let status = Status {
            last_action: Some("tap ctrl+c".to_string()),
            ..Status::default()
        };

        StatusFile::new(&path).write(&status).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let parsed: Status = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed.last_action.as_deref(), Some("tap ctrl+c"));
        assert!(!dir.path().join("status.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_persist_writes_latest_snapshot() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("status.json");
        let (mut publisher, rx) = StatusPublisher::new();
        let task = tokio::spawn(persist(StatusFile::new(&path), rx));

        publisher.update(|status| status.connected_controllers = 1);
        publisher.update(|status| status.last_action = Some("tap home".to_string()));
        drop(publisher);
        task.await.unwrap();

        let parsed: Status = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed.connected_controllers, 1);
        assert_eq!(parsed.last_action.as_deref(), Some("tap home"));
    }

    #[tokio::test]
    async fn test_persist_survives_failing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("status.json");
        let (mut publisher, rx) = StatusPublisher::new();
        let watcher = publisher.subscribe();
        let task = tokio::spawn(persist(StatusFile::new(&path), rx));

        publisher.update(|status| status.connected_controllers = 3);
        assert_eq!(watcher.borrow().connected_controllers, 3);
        drop(publisher);
        task.await.unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_update_without_receivers() {
        let (mut publisher, rx) = StatusPublisher::new();
        drop(rx);

        publisher.update(|status| status.connected_controllers = 2);
        assert_eq!(publisher.current().connected_controllers, 2);
    }
}
