//! Request dispatch: one typed handler per [`NodeRequest`] variant.
//!
//! Handlers never fail the call.  Store errors are logged here and reach the
//! caller only as `ok: false` or an absent value.

use fsn_protocol::{NodeRequest, NodeResponse};
use fsn_storage::{BlobStore, StoredBlob};

use crate::context::NodeContext;

/// Route a decoded request to its handler.
pub async fn dispatch(ctx: &NodeContext, request: NodeRequest) -> NodeResponse {
    match request {
        NodeRequest::SaveSession { session } => NodeResponse::Saved {
            ok: save(&ctx.sessions, &session).await,
        },
        NodeRequest::GetSession { id } => NodeResponse::Session {
            session: load(&ctx.sessions, &id).await,
        },
        NodeRequest::SaveLog { log } => NodeResponse::Saved {
            ok: save(&ctx.logs, &log).await,
        },
        NodeRequest::GetLog { job_id } => NodeResponse::Log {
            log: load(&ctx.logs, &job_id).await,
        },
    }
}

async fn save<T: StoredBlob>(store: &BlobStore<T>, blob: &T) -> bool {
    let key = blob.storage_key();
    tracing::info!(kind = T::KIND, key = %key, "saving to disk");

    match store.save(blob).await {
        Ok(_) => true,
        Err(e) => {
            tracing::error!(kind = T::KIND, key = %key, error = %e, "save failed");
            false
        }
    }
}

async fn load<T: StoredBlob>(store: &BlobStore<T>, key: &str) -> Option<T> {
    tracing::info!(kind = T::KIND, key = %key, "retrieving from disk");

    match store.load(key).await {
        Ok(found) => found,
        Err(e) if e.is_corrupt() => {
            // Reported to the caller as "not found"; only the log tells them apart.
            tracing::warn!(kind = T::KIND, key = %key, error = %e, "stored record unreadable");
            None
        }
        Err(e) => {
            tracing::error!(kind = T::KIND, key = %key, error = %e, "load failed");
            None
        }
    }
}
