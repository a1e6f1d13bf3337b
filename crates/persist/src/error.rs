use worldkeep_common::UnitKey;

/// Errors from the world store and its backends.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CBOR serialization error: {0}")]
    CborEncode(String),
    #[error("CBOR deserialization error: {0}")]
    CborDecode(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("integrity check failed: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },
    #[error("schema version mismatch: file has v{file_version}, expected v{expected_version}")]
    SchemaMismatch {
        file_version: u32,
        expected_version: u32,
    },
    #[error("unit {requested} holds data for {found}")]
    KeyMismatch { requested: UnitKey, found: UnitKey },
    #[error("lock poisoned: {0}")]
    LockPoisoned(&'static str),
    #[error("backend rejected {key}: {reason}")]
    Backend { key: UnitKey, reason: String },
}
