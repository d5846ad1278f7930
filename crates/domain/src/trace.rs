use serde::Serialize;

/// Structured trace events emitted across all fsnode crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    NodeRegistered {
        node_id: String,
        outcome: String,
        address: String,
    },
    BlobSaved {
        kind: String,
        key: String,
        bytes: usize,
    },
    BlobLoaded {
        kind: String,
        key: String,
        found: bool,
    },
    BlobCorrupt {
        kind: String,
        key: String,
        reason: String,
    },
    ConnectionAccepted {
        peer: String,
    },
    ConnectionClosed {
        peer: String,
        requests: u64,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "fsn_event");
    }
}
