//! swarmnode - task coordination core for a peer-to-peer compute swarm
//!
//! A node publishes work as a `TaskProposal`, other nodes that can run it race
//! to claim it, and the proposer decides every claim on its own serialized
//! state so at most one claimant wins. There is no central arbiter.
//!
//! # Modules
//!
//! - [`domain`] - Proposals, lifecycle states, capabilities, peer records
//! - [`protocol`] - Protocol ids, message envelopes, line codec
//! - [`transport`] - Transport boundary with in-memory and TCP substrates
//! - [`state`] - Proposal store and lock decisions (actor)
//! - [`coordinator`] - Proposal lifecycle, claims, execution, results
//! - [`health`] - Connection health monitor (actor)
//! - [`executor`] - Workload executors
//! - [`events`] - Node event bus and JSONL logger
//! - [`node`] - One node wired together
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod coordinator;
pub mod domain;
pub mod error;
pub mod events;
pub mod executor;
pub mod health;
pub mod node;
pub mod protocol;
pub mod state;
pub mod transport;

// Re-export commonly used types
pub use config::Config;
pub use coordinator::{CoordinatorConfig, TaskCoordinator, TaskStatus};
pub use domain::{Capabilities, PeerConnection, ProposalConfig, Requirements, TaskProposal, TaskState};
pub use error::{LockDenial, SwarmError, SwarmResult};
pub use events::{EventBus, NodeEvent};
pub use health::{ConnectionMonitor, HealthConfig};
pub use node::{NodeOptions, SwarmNode};
pub use transport::{MemoryNetwork, TcpTransport, Transport};
