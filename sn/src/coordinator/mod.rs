//! Task coordination: proposals, claims, execution and results
//!
//! ```text
//!  proposer                              claimant
//!  ────────                              ────────
//!  create_proposal ── TASK_PROPOSAL ───► handle_proposal
//!                                          │ jitter
//!  handle_lock    ◄── TASK_LOCK ─────────  attempt_accept_proposal
//!  handle_acceptance ◄ TASK_ACCEPTANCE ──  │
//!    └─ stream input files ─── file ───►  receive_file
//!  handle_status_update ◄ TASK_STATUS ───  start_task
//!  handle_result  ◄── TASK_RESULT ───────  complete_task
//! ```

mod config;
mod task_coordinator;
mod handlers;

pub use config::CoordinatorConfig;
pub use task_coordinator::{TaskCoordinator, TaskStatus};
