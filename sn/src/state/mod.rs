//! Proposal store and lock coordinator
//!
//! Actor pattern: a single task owns the proposal map and capability budget,
//! and handles talk to it over channels.

mod lock;
mod manager;
mod messages;

pub use lock::{DEFAULT_LOCK_TIMEOUT_MS, LockDecision, decide_lock, release_lock};
pub use manager::StateManager;
pub use messages::{ProposalPatch, StateCommand, StateResponse};
