//! Peer connection health
//!
//! The transport's raw connect/disconnect signals are not trusted on their
//! own. A `ConnectionMonitor` polls the live-connection set on a fixed tick,
//! heartbeats every connected peer, and retries dropped peers a bounded
//! number of times before forgetting them.

mod config;
mod monitor;

pub use config::HealthConfig;
pub use monitor::ConnectionMonitor;
