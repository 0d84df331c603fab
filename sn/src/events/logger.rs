//! Event Logger - persists node events to a JSONL file
//!
//! One file per node: `{dir}/{peer-id}.events.jsonl`.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tokio::sync::broadcast;
use tracing::{debug, error, warn};

use super::bus::EventBus;
use super::types::{EventLogEntry, NodeEvent};

pub struct EventLogger {
    node: String,
    path: PathBuf,
    writer: BufWriter<File>,
}

impl EventLogger {
    /// Open (appending) the log file for `node` under `dir`
    pub fn open(dir: impl AsRef<Path>, node: impl Into<String>) -> eyre::Result<Self> {
        let node = node.into();
        fs::create_dir_all(dir.as_ref())?;
        let path = log_path(dir.as_ref(), &node);
        debug!(?path, %node, "EventLogger::open: opening log file");
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            node,
            path,
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event as a JSON line
    pub fn write_event(&mut self, event: &NodeEvent) -> eyre::Result<()> {
        debug!(event_type = event.event_type(), "EventLogger::write_event");
        let entry = EventLogEntry::new(self.node.clone(), event.clone());
        let json = serde_json::to_string(&entry)?;
        writeln!(self.writer, "{}", json)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Consume events from the bus until every sender is gone
    pub async fn run(mut self, bus: EventBus) {
        debug!(node = %self.node, "EventLogger::run: starting event logger");
        let mut rx = bus.subscribe();
        drop(bus);

        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Err(e) = self.write_event(&event) {
                        error!(error = %e, "EventLogger: failed to write event");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(missed = n, "EventLogger: lagged behind, missed events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("EventLogger: channel closed, shutting down");
                    break;
                }
            }
        }

        let _ = self.writer.flush();
    }
}

/// Log file location for a node
pub fn log_path(dir: &Path, node: &str) -> PathBuf {
    dir.join(format!("{}.events.jsonl", node))
}

/// Read back every parseable entry of a node's log
pub fn read_events(dir: impl AsRef<Path>, node: &str) -> eyre::Result<Vec<EventLogEntry>> {
    let path = log_path(dir.as_ref(), node);
    debug!(?path, "read_events: reading log file");
    if !path.exists() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(&path)?;
    let mut entries = Vec::new();
    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<EventLogEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                warn!(line, error = %e, "read_events: failed to parse line");
            }
        }
    }
    Ok(entries)
}

/// Spawn a logger for `node` on the given bus
pub fn spawn_event_logger(
    dir: impl AsRef<Path>,
    node: impl Into<String>,
    bus: EventBus,
) -> eyre::Result<tokio::task::JoinHandle<()>> {
    let logger = EventLogger::open(dir, node)?;
    Ok(tokio::spawn(logger.run(bus)))
}
