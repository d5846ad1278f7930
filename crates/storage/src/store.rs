//! Key-addressed blob store on local disk.
//!
//! One directory per blob kind, one file per key, named exactly by the key.
//! Each file holds a versioned JSON record:
//!
//! ```json
//! { "schema_version": 1, "kind": "session", "payload": { "id": "s1", ... } }
//! ```
//!
//! Writes go to a hidden temp sibling, are synced, then renamed over the
//! target, so a crash never leaves a half-written record behind.  Save and
//! load on the same key are serialised through a [`KeyLockMap`].

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use tokio::io::AsyncWriteExt;

use fsn_domain::error::{Error, Result};
use fsn_domain::trace::TraceEvent;
use fsn_protocol::{JobLog, Session};

use crate::key_lock::KeyLockMap;

/// Version of the on-disk record layout.
pub const STORAGE_SCHEMA_VERSION: u32 = 1;

/// Idle key locks are pruned once the map grows past this.
const PRUNE_THRESHOLD: usize = 1024;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Blob kinds
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A value a [`BlobStore`] can persist.
pub trait StoredBlob: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Record kind written alongside the payload (e.g. `"session"`).
    const KIND: &'static str;

    /// The key (file name) this value is stored under.
    fn storage_key(&self) -> &str;
}

impl StoredBlob for Session {
    const KIND: &'static str = "session";

    fn storage_key(&self) -> &str {
        self.id()
    }
}

impl StoredBlob for JobLog {
    const KIND: &'static str = "log";

    fn storage_key(&self) -> &str {
        self.job_id()
    }
}

#[derive(Serialize)]
struct RecordRef<'a, T> {
    schema_version: u32,
    kind: &'a str,
    payload: &'a T,
}

#[derive(Deserialize)]
struct RawRecord {
    schema_version: u32,
    kind: String,
    payload: Box<RawValue>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Blob store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Durable, last-writer-wins storage for one blob kind.
pub struct BlobStore<T> {
    dir: PathBuf,
    locks: KeyLockMap,
    _kind: PhantomData<fn() -> T>,
}

pub type SessionStore = BlobStore<Session>;
pub type LogStore = BlobStore<JobLog>;

impl<T: StoredBlob> BlobStore<T> {
    /// Open the store rooted at `dir`, creating the directory if missing.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        tracing::info!(kind = T::KIND, path = %dir.display(), "blob store opened");

        Ok(Self {
            dir,
            locks: KeyLockMap::new(),
            _kind: PhantomData,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist `blob` under its key, replacing any previous value.
    ///
    /// Returns the number of bytes written.
    pub async fn save(&self, blob: &T) -> Result<usize> {
        let key = blob.storage_key();
        validate_key(key)?;

        let bytes = serde_json::to_vec(&RecordRef {
            schema_version: STORAGE_SCHEMA_VERSION,
            kind: T::KIND,
            payload: blob,
        })?;

        {
            let _permit = self.locks.acquire(key).await?;
            write_atomic(&self.dir.join(key), &bytes).await?;
        }
        self.maybe_prune();

        TraceEvent::BlobSaved {
            kind: T::KIND.into(),
            key: key.to_owned(),
            bytes: bytes.len(),
        }
        .emit();

        Ok(bytes.len())
    }

    /// Fetch the value stored under `key`.
    ///
    /// `Ok(None)` means nothing was ever saved there.  A record that exists
    /// but cannot be decoded is `Err(Error::Corrupt)`.
    pub async fn load(&self, key: &str) -> Result<Option<T>> {
        validate_key(key)?;

        let read = {
            let _permit = self.locks.acquire(key).await?;
            tokio::fs::read(self.dir.join(key)).await
        };
        self.maybe_prune();

        let bytes = match read {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                TraceEvent::BlobLoaded {
                    kind: T::KIND.into(),
                    key: key.to_owned(),
                    found: false,
                }
                .emit();
                return Ok(None);
            }
            Err(e) => return Err(Error::Io(e)),
        };

        let blob = decode_record::<T>(key, &bytes).inspect_err(|e| {
            TraceEvent::BlobCorrupt {
                kind: T::KIND.into(),
                key: key.to_owned(),
                reason: e.to_string(),
            }
            .emit();
        })?;

        TraceEvent::BlobLoaded {
            kind: T::KIND.into(),
            key: key.to_owned(),
            found: true,
        }
        .emit();

        Ok(Some(blob))
    }

    fn maybe_prune(&self) {
        if self.locks.key_count() > PRUNE_THRESHOLD {
            self.locks.prune_idle();
        }
    }
}

/// Reject keys that are not a plain file name.
pub fn validate_key(key: &str) -> Result<()> {
    let bad = key.is_empty()
        || key == "."
        || key == ".."
        || key.contains(['/', '\\', '\0']);
    if bad {
        return Err(Error::InvalidKey(key.to_owned()));
    }
    Ok(())
}

fn decode_record<T: StoredBlob>(key: &str, bytes: &[u8]) -> Result<T> {
    let corrupt = |reason: String| Error::Corrupt {
        key: key.to_owned(),
        reason,
    };

    let record: RawRecord = serde_json::from_slice(bytes).map_err(|e| corrupt(e.to_string()))?;
    if record.schema_version != STORAGE_SCHEMA_VERSION {
        return Err(corrupt(format!(
            "unsupported schema_version {}",
            record.schema_version
        )));
    }
    if record.kind != T::KIND {
        return Err(corrupt(format!(
            "expected kind {:?}, found {:?}",
            T::KIND,
            record.kind
        )));
    }
    serde_json::from_str(record.payload.get()).map_err(|e| corrupt(e.to_string()))
}

/// Write to a uniquely-named `.tmp` sibling, sync, then rename into place.
///
/// The temp name does not embed the key, so any key that fits in a file
/// name also has room for its temp file.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp_path = path.with_file_name(format!(".{}.tmp", uuid::Uuid::new_v4().as_simple()));

    let written = async {
        let mut file = tokio::fs::File::create(&tmp_path).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        file.sync_data().await?;
        tokio::fs::rename(&tmp_path, path).await
    }
    .await;

    if let Err(e) = written {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(Error::Io(e));
    }
    Ok(())
}
