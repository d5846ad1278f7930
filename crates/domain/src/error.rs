/// Shared error type used across all fsnode crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid key {0:?}")]
    InvalidKey(String),

    #[error("corrupt record {key:?}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("protocol: {0}")]
    Protocol(String),

    #[error("connection: {0}")]
    Connection(String),

    #[error("registration rejected by coordinator")]
    Rejected,

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error means "the stored bytes exist but cannot be
    /// decoded", as opposed to a missing record or an I/O failure.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Error::Corrupt { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
