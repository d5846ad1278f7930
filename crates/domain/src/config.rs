//! Node configuration and its builder.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Directory (under the data dir) holding one file per session.
pub const SESSION_DIR: &str = "session";
/// Directory (under the data dir) holding one file per job log.
pub const LOG_DIR: &str = "log";
/// File (under the data dir) holding the persisted node identifier.
pub const NODE_ID_FILE: &str = "nodeID";

/// What the node does when the coordinator rejects its registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RejectPolicy {
    /// Log the rejection and keep running, heartbeat included.
    #[default]
    Continue,
    /// Treat the rejection as a fatal startup error.
    Halt,
}

/// Fully-resolved node configuration.
///
/// Create via [`NodeConfigBuilder`].
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// WebSocket URL of the coordinator.
    pub coordinator_url: String,
    /// Root for the session/log directories and the identity file.
    pub data_dir: PathBuf,
    /// Address the inbound listener binds to.
    pub listen_addr: String,
    pub heartbeat_interval: Duration,
    pub reject_policy: RejectPolicy,
    /// Maximum in-flight requests per inbound connection.
    pub max_concurrent_requests: usize,
    /// Frames larger than this are answered `malformed` without parsing.
    pub max_request_bytes: usize,
}

impl NodeConfig {
    pub fn builder(coordinator: impl Into<String>) -> NodeConfigBuilder {
        NodeConfigBuilder::new(coordinator)
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.data_dir.join(SESSION_DIR)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join(LOG_DIR)
    }

    pub fn identity_path(&self) -> PathBuf {
        self.data_dir.join(NODE_ID_FILE)
    }
}

/// Fluent builder for [`NodeConfig`].
///
/// ```rust,no_run
/// # use fsn_domain::{NodeConfigBuilder, RejectPolicy};
/// let cfg = NodeConfigBuilder::new("10.0.0.5:4000")
///     .data_dir("/var/lib/fsnode")
///     .heartbeat_interval(std::time::Duration::from_millis(500))
///     .reject_policy(RejectPolicy::Halt)
///     .build()
///     .unwrap();
/// ```
pub struct NodeConfigBuilder {
    coordinator: String,
    data_dir: PathBuf,
    listen_addr: String,
    heartbeat_interval: Duration,
    reject_policy: RejectPolicy,
    max_concurrent_requests: usize,
    max_request_bytes: usize,
}

impl NodeConfigBuilder {
    pub fn new(coordinator: impl Into<String>) -> Self {
        Self {
            coordinator: coordinator.into(),
            data_dir: PathBuf::from("."),
            listen_addr: "127.0.0.1:0".into(),
            heartbeat_interval: Duration::from_millis(500),
            reject_policy: RejectPolicy::default(),
            max_concurrent_requests: 16,
            max_request_bytes: 16 * 1024 * 1024, // 16 MB
        }
    }

    // ── Storage ──────────────────────────────────────────────────────

    /// Set the directory holding `session/`, `log/` and `nodeID` (default `.`).
    pub fn data_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.data_dir = dir.as_ref().to_path_buf();
        self
    }

    // ── Network ──────────────────────────────────────────────────────

    /// Override the inbound listen address (default `127.0.0.1:0`).
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.listen_addr = addr.into();
        self
    }

    // ── Behavior ─────────────────────────────────────────────────────

    /// Override the heartbeat interval (default 500ms).
    pub fn heartbeat_interval(mut self, d: Duration) -> Self {
        self.heartbeat_interval = d;
        self
    }

    pub fn reject_policy(mut self, policy: RejectPolicy) -> Self {
        self.reject_policy = policy;
        self
    }

    /// Maximum in-flight requests per connection (default 16).
    pub fn max_concurrent_requests(mut self, n: usize) -> Self {
        self.max_concurrent_requests = n;
        self
    }

    /// Maximum inbound frame size (default 16 MB).
    pub fn max_request_bytes(mut self, n: usize) -> Self {
        self.max_request_bytes = n;
        self
    }

    pub fn build(self) -> Result<NodeConfig> {
        let coordinator_url = coordinator_url(&self.coordinator)?;
        if self.max_concurrent_requests == 0 {
            return Err(Error::Config("max_concurrent_requests must be > 0".into()));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(Error::Config("heartbeat_interval must be > 0".into()));
        }

        Ok(NodeConfig {
            coordinator_url,
            data_dir: self.data_dir,
            listen_addr: self.listen_addr,
            heartbeat_interval: self.heartbeat_interval,
            reject_policy: self.reject_policy,
            max_concurrent_requests: self.max_concurrent_requests,
            max_request_bytes: self.max_request_bytes,
        })
    }
}

/// Turn a CLI coordinator address into a WebSocket URL.
///
/// Bare `host:port` becomes `ws://host:port/`; `ws://` and `wss://` URLs pass
/// through untouched.
pub fn coordinator_url(addr: &str) -> Result<String> {
    let addr = addr.trim();
    if addr.is_empty() {
        return Err(Error::Config("coordinator address is required".into()));
    }
    if addr.starts_with("ws://") || addr.starts_with("wss://") {
        return Ok(addr.to_string());
    }
    if addr.contains("://") {
        return Err(Error::Config(format!(
            "unsupported coordinator scheme in {addr:?} (expected ws:// or wss://)"
        )));
    }
    Ok(format!("ws://{addr}/"))
}
