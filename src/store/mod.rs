//! # Store Module
//!
//! The embedded key-value store handlers read and write.
//!
//! ## Semantics
//!
//! - `get` on a key that was never set returns `Ok(None)`, never an error
//! - `set` overwrites and is visible to every later `get`, from any invocation
//! - every write commits immediately; nothing is rolled back when a handler
//!   faults afterwards
//! - malformed keys fail with [`StoreError::InvalidKey`] and change nothing
//! - concurrent writers to one key resolve last-writer-wins; there is no
//!   atomic read-modify-write
//!
//! ## Durability
//!
//! [`DurabilityMode`] selects between a purely in-memory store and one backed
//! by an append-only journal that is replayed on open. See [`KvStore::open`].
//!
//! ```rust
//! use edgerun::store::KvStore;
//! use serde_json::json;
//!
//! let store = KvStore::in_memory();
//! assert_eq!(store.get("counter").unwrap(), None);
//! store.set("counter", json!(0)).unwrap();
//! assert_eq!(store.get("counter").unwrap(), Some(json!(0)));
//! ```

mod core;
mod durability;
mod error;
mod journal;
mod key;

pub use self::core::KvStore;
pub use durability::DurabilityMode;
pub use error::{InvalidKeyReason, StoreError};
pub use key::{validate_key, MAX_KEY_LEN};
