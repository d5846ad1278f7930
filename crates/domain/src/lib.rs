//! Shared building blocks for the fsnode crates: the common error type,
//! structured trace events, and the node configuration.

pub mod config;
pub mod error;
pub mod trace;

pub use config::{NodeConfig, NodeConfigBuilder, RejectPolicy};
pub use error::{Error, Result};
pub use trace::TraceEvent;
