//! Error taxonomy for the reftree engine
//!
//! Node, version and delta errors are ordinary results. I/O failures are
//! storage faults and trigger commit rollback before they reach the caller.
//! Invariant violations are not represented here: they panic.

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in tree, diff and store operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Node already exists: {0}")]
    NodeExists(String),

    #[error("Illegal move of node {0}")]
    IllegalMove(String),

    #[error("No free auto key under node {0}")]
    AutoKeyExhausted(String),

    #[error("No such version: {0}")]
    NoSuchVersion(u64),

    #[error("Broken delta: {0}")]
    BrokenDelta(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Content codec error: {0}")]
    Codec(String),

    #[error("Corrupt store: {0}")]
    Corrupt(String),

    #[error("Store is unrecoverable, manual recovery required: {0}")]
    Unrecoverable(String),

    #[error("Store already initialized")]
    AlreadyInitialized,

    #[error("Store not initialized")]
    NotInitialized,
}

impl Error {
    pub(crate) fn not_found(id: &impl std::fmt::Display) -> Self {
        Error::NodeNotFound(id.to_string())
    }

    /// True for failures of the underlying storage
    pub fn is_storage_fault(&self) -> bool {
        matches!(self, Error::Io(_))
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
