//! Local persistence for an fsnode: the node identity file and the
//! key-addressed session/log stores.

pub mod identity;
pub mod key_lock;
pub mod store;

pub use identity::NodeIdentity;
pub use key_lock::KeyLockMap;
pub use store::{BlobStore, LogStore, SessionStore, StoredBlob, STORAGE_SCHEMA_VERSION};
