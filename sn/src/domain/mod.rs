//! Domain types for swarmnode
//!
//! Plain data records shared by every component: proposals and their
//! lifecycle, node capabilities, and peer connection records.

mod capabilities;
mod id;
mod peer;
mod proposal;

pub use capabilities::{Capabilities, CapabilitiesUpdate};
pub use id::{PeerId, is_valid_proposal_id, new_lock_id, new_proposal_id, now_ms};
pub use peer::{Bandwidth, NetworkStats, PeerConnection, PeerMetrics, PeerStatus};
pub use proposal::{ContainerConfig, LockInfo, ProposalConfig, Requirements, TaskProposal, TaskState};
