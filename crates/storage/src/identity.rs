//! Persisted node identity.
//!
//! The coordinator assigns a node ID on first registration; the node keeps
//! it in a single file and presents it on every later start.  The file holds
//! the raw ID bytes and nothing else.

use std::io::Write;
use std::path::{Path, PathBuf};

use fsn_domain::error::Result;

/// Handle to the on-disk node identifier.
#[derive(Debug, Clone)]
pub struct NodeIdentity {
    path: PathBuf,
}

impl NodeIdentity {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted ID.
    ///
    /// A missing or empty file means the node was never registered.  Read
    /// errors are logged and treated the same way.
    pub fn load(&self) -> Option<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(id) if id.is_empty() => None,
            Ok(id) => Some(id),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "failed to read node identity, starting unregistered"
                );
                None
            }
        }
    }

    /// Persist `id`, replacing any previous value, and sync it to disk.
    pub fn store(&self, id: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = std::fs::File::create(&self.path)?;
        file.write_all(id.as_bytes())?;
        file.sync_all()?;

        tracing::debug!(path = %self.path.display(), node_id = %id, "node identity stored");
        Ok(())
    }
}
