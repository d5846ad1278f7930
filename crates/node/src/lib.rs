//! `fsn-node`: the fsnode agent.
//!
//! A node is a storage-and-liveness endpoint in a distributed job system.
//! It registers with a coordinator, heartbeats over that connection, and
//! serves save/get requests for coordinator-owned session and log blobs.
//!
//! # Startup flow
//!
//! 1. Open the stores and load the persisted node ID (may be empty)
//! 2. Bind the inbound listener; start accepting immediately
//! 3. Dial the coordinator, send `register_node { node_id, address }`
//! 4. Adopt and persist a newly assigned ID, if any
//! 5. Start the heartbeat loop on the same connection
//!
//! # Served operations
//!
//! - `save_session` / `get_session`: keyed by `session.id`
//! - `save_log` / `get_log`: keyed by `log.job.job_id`

pub mod bootstrap;
pub mod context;
pub mod coordinator;
pub mod dispatch;
pub mod heartbeat;
pub mod listener;
pub mod registration;

// ── Re-exports for ergonomic imports ─────────────────────────────────

pub use bootstrap::{start, RunningNode};
pub use context::NodeContext;
pub use coordinator::CoordinatorClient;
pub use heartbeat::HeartbeatLoop;
pub use listener::NodeListener;
pub use registration::{register, RegistrationOutcome};
