use super::error::{InvalidKeyReason, StoreError};

/// Longest accepted key, in bytes.
pub const MAX_KEY_LEN: usize = 1024;

/// Check that `key` is well formed: non-empty, at most [`MAX_KEY_LEN`] bytes,
/// and free of ASCII control characters.
pub fn validate_key(key: &str) -> Result<(), StoreError> {
    let reason = if key.is_empty() {
        InvalidKeyReason::Empty
    } else if key.len() > MAX_KEY_LEN {
        InvalidKeyReason::TooLong { len: key.len() }
    } else if let Some(index) = key.bytes().position(|b| b.is_ascii_control()) {
        InvalidKeyReason::ControlCharacter { index }
    } else {
        return Ok(());
    };

    Err(StoreError::InvalidKey {
        key: key.to_string(),
        reason,
    })
}
