use std::fmt;
use thiserror::Error;

/// Why a key was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidKeyReason {
    /// The key is the empty string
    Empty,
    /// The key is longer than [`MAX_KEY_LEN`](super::MAX_KEY_LEN) bytes
    TooLong { len: usize },
    /// The key contains an ASCII control character at byte `index`
    ControlCharacter { index: usize },
}

impl fmt::Display for InvalidKeyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidKeyReason::Empty => write!(f, "key must not be empty"),
            InvalidKeyReason::TooLong { len } => write!(
                f,
                "key is {len} bytes, limit is {}",
                super::MAX_KEY_LEN
            ),
            InvalidKeyReason::ControlCharacter { index } => {
                write!(f, "control character at byte {index}")
            }
        }
    }
}

/// Errors returned by [`KvStore`](super::KvStore) operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The key is malformed. The store is left unchanged.
    #[error("invalid key {key:?}: {reason}")]
    InvalidKey {
        key: String,
        reason: InvalidKeyReason,
    },

    #[error("journal I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("value serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A journal line other than the last one could not be decoded.
    #[error("corrupt journal entry at line {line}: {reason}")]
    CorruptJournal { line: usize, reason: String },

    /// A write was attempted after [`KvStore::close`](super::KvStore::close).
    #[error("store is closed")]
    Closed,
}

impl StoreError {
    #[must_use]
    pub fn is_invalid_key(&self) -> bool {
        matches!(self, StoreError::InvalidKey { .. })
    }
}
