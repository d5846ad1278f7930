//! Per-key concurrency control.
//!
//! Ensures a save and a load (or two saves) on the same store key never
//! interleave at the file level.  Different keys proceed in parallel.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use fsn_domain::error::{Error, Result};

/// Manages per-key I/O locks.
///
/// Each key maps to a `Semaphore(1)`.  Holding the permit grants exclusive
/// access to that key's file; it releases on drop.
pub struct KeyLockMap {
    locks: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl Default for KeyLockMap {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyLockMap {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire the lock for `key`, waiting for the current holder if any.
    pub async fn acquire(&self, key: &str) -> Result<OwnedSemaphorePermit> {
        let sem = {
            let mut locks = self.locks.lock();
            locks
                .entry(key.to_owned())
                .or_insert_with(|| Arc::new(Semaphore::new(1)))
                .clone()
        };

        sem.acquire_owned()
            .await
            .map_err(|_| Error::Other(format!("key lock for {key:?} closed")))
    }

    /// Number of tracked keys (for monitoring).
    pub fn key_count(&self) -> usize {
        self.locks.lock().len()
    }

    /// Forget keys nobody holds or waits on.
    ///
    /// A semaphore referenced outside the map (an outstanding permit or an
    /// acquirer between lookup and wait) is kept, so a key can never end up
    /// with two live semaphores.
    pub fn prune_idle(&self) {
        let mut locks = self.locks.lock();
        locks.retain(|_, sem| Arc::strong_count(sem) > 1);
    }
}
