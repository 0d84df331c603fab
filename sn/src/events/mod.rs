//! Per-node event bus
//!
//! Every coordination step emits a `NodeEvent` on the node's bus. Tests, the
//! CLI and the optional JSONL logger subscribe to it.
//!
//! ```text
//!   TaskCoordinator ──┐
//!   StateManager ─────┼──► EventBus (broadcast) ──► subscribers
//!   ConnectionMonitor ┘                              ├─ EventLogger (.jsonl)
//!                                                    └─ CLI / tests
//! ```

mod bus;
mod logger;
mod types;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventBus};
pub use logger::{EventLogger, log_path, read_events, spawn_event_logger};
pub use types::{EventLogEntry, NodeEvent};
