//! Node protocol: envelope framing, per-operation request/response types,
//! and the opaque blobs a node stores for the coordinator.
//!
//! Every frame is a JSON text message of the form
//! `{ "id": <u64>, "body": { "<operation>": { ... } } }`.  The `id` is
//! chosen by the caller and echoed back on the matching response.  Unit
//! operations (`heartbeat_ack`) are sent as a bare string body.
//!
//! Operations are externally tagged so a body is decoded in one pass
//! straight from the frame text.  Stored blobs rely on that: they capture
//! their payload as raw JSON, which serde cannot do through the buffering
//! that internal tags and flattening use.
//!
//! Two directions share this framing:
//!
//! - node → coordinator: [`CoordinatorRequest`] / [`CoordinatorResponse`]
//! - coordinator → node: [`NodeRequest`] / [`NodeResponse`]

use serde::de::{DeserializeOwned, Error as _};
use serde::ser::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::value::RawValue;
use serde_json::{Map, Value};

/// Wire protocol version advertised in `register_node`.
pub const PROTOCOL_VERSION: u32 = 1;

// ── Envelope ─────────────────────────────────────────────────────────

/// Request/response correlation wrapper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub id: u64,
    pub body: T,
}

impl<T> Envelope<T> {
    pub fn new(id: u64, body: T) -> Self {
        Self { id, body }
    }
}

impl<T: Serialize> Envelope<T> {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl<T: DeserializeOwned> Envelope<T> {
    /// Decode a frame.  On failure the request id is salvaged when the frame
    /// is at least a JSON object with a numeric `id`, so the caller can still
    /// answer the right request.
    pub fn from_json(text: &str) -> Result<Self, MalformedFrame> {
        serde_json::from_str(text).map_err(|e| MalformedFrame {
            id: salvage_id(text),
            reason: e.to_string(),
        })
    }
}

/// A frame that could not be decoded into a known operation.
#[derive(Debug, Clone, PartialEq)]
pub struct MalformedFrame {
    /// Best-effort request id (`0` when unrecoverable).
    pub id: u64,
    pub reason: String,
}

/// Extract the `id` field from an otherwise undecodable frame.
pub fn salvage_id(text: &str) -> u64 {
    serde_json::from_str::<Value>(text)
        .ok()
        .and_then(|v| v.get("id").and_then(Value::as_u64))
        .unwrap_or(0)
}

// ── Stored blobs ─────────────────────────────────────────────────────
//
// Blobs keep the exact JSON text the coordinator sent.  Only the key is
// parsed out; the rest is never re-encoded, so number precision, key order
// and float spelling survive a save/get cycle byte for byte.

/// Coordinator-defined session state, keyed by its top-level `id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    id: String,
    json: String,
}

#[derive(Deserialize)]
struct SessionKey {
    id: String,
}

impl Session {
    /// Accept a JSON object with a string `id`.  Surrounding whitespace is
    /// dropped; everything inside the object is kept as written.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        let (key, json) = capture::<SessionKey>(text)?;
        Ok(Self { id: key.id, json })
    }

    /// A session with no fields besides its id.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        let mut obj = Map::new();
        obj.insert("id".into(), Value::String(id.clone()));
        Self {
            id,
            json: Value::Object(obj).to_string(),
        }
    }

    /// Attach a field (builder style).  This re-encodes the object, so it is
    /// meant for building fresh sessions, not for editing received ones.
    pub fn with(self, key: impl Into<String>, value: Value) -> Self {
        let json = insert_field(&self.json, key.into(), value);
        Self { id: self.id, json }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The stored JSON text, exactly as received.
    pub fn as_json(&self) -> &str {
        &self.json
    }

    pub fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::from_str(&self.json)
    }
}

/// Coordinator-defined job log, keyed by the nested `job.job_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobLog {
    job_id: String,
    json: String,
}

#[derive(Deserialize)]
struct LogKey {
    job: JobKey,
}

#[derive(Deserialize)]
struct JobKey {
    job_id: String,
}

impl JobLog {
    /// Accept a JSON object carrying `job.job_id` as a string.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        let (key, json) = capture::<LogKey>(text)?;
        Ok(Self {
            job_id: key.job.job_id,
            json,
        })
    }

    /// A log whose job reference holds only the id.
    pub fn new(job_id: impl Into<String>) -> Self {
        let job_id = job_id.into();
        let mut job = Map::new();
        job.insert("job_id".into(), Value::String(job_id.clone()));
        let mut obj = Map::new();
        obj.insert("job".into(), Value::Object(job));
        Self {
            job_id,
            json: Value::Object(obj).to_string(),
        }
    }

    /// Attach a top-level field (builder style).
    pub fn with(self, key: impl Into<String>, value: Value) -> Self {
        let json = insert_field(&self.json, key.into(), value);
        Self {
            job_id: self.job_id,
            json,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// The stored JSON text, exactly as received.
    pub fn as_json(&self) -> &str {
        &self.json
    }

    pub fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::from_str(&self.json)
    }
}

/// Validate `text` as one JSON value, read the key type out of it, and keep
/// the value's own text.
fn capture<K: DeserializeOwned>(text: &str) -> serde_json::Result<(K, String)> {
    let raw: &RawValue = serde_json::from_str(text)?;
    let key = serde_json::from_str(raw.get())?;
    Ok((key, raw.get().to_owned()))
}

fn insert_field(json: &str, key: String, value: Value) -> String {
    let mut obj: Map<String, Value> = serde_json::from_str(json).unwrap_or_default();
    obj.insert(key, value);
    Value::Object(obj).to_string()
}

fn serialize_raw<S: Serializer>(json: &str, serializer: S) -> Result<S::Ok, S::Error> {
    let raw: &RawValue = serde_json::from_str(json).map_err(S::Error::custom)?;
    raw.serialize(serializer)
}

impl Serialize for Session {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_raw(&self.json, serializer)
    }
}

impl<'de> Deserialize<'de> for Session {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Box::<RawValue>::deserialize(deserializer)?;
        Self::from_json(raw.get()).map_err(D::Error::custom)
    }
}

impl Serialize for JobLog {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_raw(&self.json, serializer)
    }
}

impl<'de> Deserialize<'de> for JobLog {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Box::<RawValue>::deserialize(deserializer)?;
        Self::from_json(raw.get()).map_err(D::Error::custom)
    }
}

// ── Coordinator → node ───────────────────────────────────────────────

/// Operations the node serves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRequest {
    SaveSession { session: Session },
    GetSession { id: String },
    SaveLog { log: JobLog },
    GetLog { job_id: String },
}

impl NodeRequest {
    /// Wire name of the operation.
    pub fn op(&self) -> &'static str {
        match self {
            NodeRequest::SaveSession { .. } => "save_session",
            NodeRequest::GetSession { .. } => "get_session",
            NodeRequest::SaveLog { .. } => "save_log",
            NodeRequest::GetLog { .. } => "get_log",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeResponse {
    /// Acknowledgment for `save_session` / `save_log`.
    Saved { ok: bool },
    /// `None` means "not found" (or unreadable).
    Session { session: Option<Session> },
    /// `None` means "not found" (or unreadable).
    Log { log: Option<JobLog> },
    /// The request frame could not be decoded.
    Malformed { reason: String },
}

// ── Node → coordinator ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinatorRequest {
    /// `node_id` is empty when the node has never been assigned one.
    RegisterNode {
        protocol_version: u32,
        node_id: String,
        address: String,
    },
    Heartbeat { node_id: String, sent_at_ms: i64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinatorResponse {
    Registered {
        accepted: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        new_id: Option<String>,
    },
    HeartbeatAck,
    Malformed { reason: String },
}
