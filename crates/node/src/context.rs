//! Shared per-process state handed to every request handler.

use parking_lot::RwLock;

use fsn_domain::config::NodeConfig;
use fsn_domain::error::Result;
use fsn_storage::{LogStore, NodeIdentity, SessionStore};

/// Everything a handler may touch: config, identity, and both stores.
pub struct NodeContext {
    pub config: NodeConfig,
    pub identity: NodeIdentity,
    pub sessions: SessionStore,
    pub logs: LogStore,
    /// Active node ID.  Empty until the node has one.
    node_id: RwLock<String>,
}

impl NodeContext {
    /// Open the stores under the configured data dir and load the persisted
    /// node ID, if any.
    pub fn open(config: NodeConfig) -> Result<Self> {
        let sessions = SessionStore::open(config.sessions_dir())?;
        let logs = LogStore::open(config.logs_dir())?;
        let identity = NodeIdentity::new(config.identity_path());
        let node_id = identity.load().unwrap_or_default();

        tracing::info!(
            node_id = %node_id,
            data_dir = %config.data_dir.display(),
            "node context initialised"
        );

        Ok(Self {
            config,
            identity,
            sessions,
            logs,
            node_id: RwLock::new(node_id),
        })
    }

    pub fn node_id(&self) -> String {
        self.node_id.read().clone()
    }

    pub fn set_node_id(&self, id: impl Into<String>) {
        *self.node_id.write() = id.into();
    }
}
