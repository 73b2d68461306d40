use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::durability::DurabilityMode;
use super::error::StoreError;
use super::journal::{Journal, JournalRecord};
use super::key::validate_key;

/// Process-wide key-value store shared by every invocation.
///
/// Cloning is cheap and yields another handle to the same state. Reads are
/// served from memory; with a journal, writes are appended under one lock
/// before they are applied, so journal order equals commit order and each
/// key's writes are linearizable. There is no cross-key atomicity.
#[derive(Clone)]
pub struct KvStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    entries: DashMap<String, Value>,
    journal: Mutex<Option<Journal>>,
    mode: DurabilityMode,
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        if let Some(journal) = self.journal.get_mut().as_mut() {
            if let Err(e) = journal.sync() {
                warn!(
                    path = %journal.path().display(),
                    error = %e,
                    "Failed to flush journal on shutdown"
                );
            }
        }
    }
}

impl std::fmt::Debug for KvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvStore")
            .field("mode", &self.inner.mode)
            .field("entries", &self.inner.entries.len())
            .finish()
    }
}

impl Default for KvStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl KvStore {
    /// An empty store with no journal.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(StoreInner {
                entries: DashMap::new(),
                journal: Mutex::new(None),
                mode: DurabilityMode::None,
            }),
        }
    }

    /// Open a store backed by the journal at `path`, replaying it first.
    ///
    /// With [`DurabilityMode::None`] the path is ignored and the store is
    /// in-memory.
    pub fn open(path: impl AsRef<Path>, mode: DurabilityMode) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if !mode.requires_journal() {
            debug!(path = %path.display(), "Durability disabled - journal path ignored");
            return Ok(Self::in_memory());
        }

        let (journal, records) = Journal::open(path, mode)?;
        let entries = DashMap::new();
        let replayed = records.len();
        for record in records {
            match record {
                JournalRecord::Set { key, value } => {
                    entries.insert(key, value);
                }
                JournalRecord::Delete { key } => {
                    entries.remove(&key);
                }
            }
        }

        info!(
            path = %path.display(),
            replayed = replayed,
            live_keys = entries.len(),
            "Store loaded from journal"
        );

        Ok(Self {
            inner: Arc::new(StoreInner {
                entries,
                journal: Mutex::new(Some(journal)),
                mode,
            }),
        })
    }

    #[must_use]
    pub fn mode(&self) -> DurabilityMode {
        self.inner.mode
    }

    /// Current value for `key`, or `None` if nothing was ever committed.
    pub fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        validate_key(key)?;
        Ok(self.inner.entries.get(key).map(|v| v.value().clone()))
    }

    /// Commit `value` for `key`, replacing any previous value.
    ///
    /// Once this returns the value is visible to every subsequent `get`, and
    /// is on disk to the extent the durability mode promises.
    pub fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        validate_key(key)?;
        self.commit(JournalRecord::Set {
            key: key.to_string(),
            value,
        })?;
        Ok(())
    }

    /// Remove `key`. Returns whether a value was present.
    pub fn delete(&self, key: &str) -> Result<bool, StoreError> {
        validate_key(key)?;
        self.commit(JournalRecord::Delete {
            key: key.to_string(),
        })
    }

    pub fn contains(&self, key: &str) -> Result<bool, StoreError> {
        validate_key(key)?;
        Ok(self.inner.entries.contains_key(key))
    }

    /// Typed read. A stored value that does not decode as `T` is an error.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        self.get(key)?
            .map(serde_json::from_value)
            .transpose()
            .map_err(StoreError::from)
    }

    /// Typed write.
    pub fn set_as<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        validate_key(key)?;
        let value = serde_json::to_value(value)?;
        self.set(key, value)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Sorted snapshot of the live keys.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .inner
            .entries
            .iter()
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        keys
    }

    /// Force buffered journal writes to disk.
    pub fn flush(&self) -> Result<(), StoreError> {
        match self.inner.journal.lock().as_mut() {
            Some(journal) => journal.sync(),
            None => Ok(()),
        }
    }

    /// Rewrite the journal so it holds exactly one line per live key.
    ///
    /// Returns the number of entries written (0 for an in-memory store).
    pub fn compact(&self) -> Result<usize, StoreError> {
        let mut guard = self.inner.journal.lock();
        let Some(journal) = guard.as_mut() else {
            return if self.inner.mode.requires_journal() {
                Err(StoreError::Closed)
            } else {
                Ok(0)
            };
        };

        // Writers hold the journal lock, so this snapshot is consistent.
        let mut snapshot: Vec<(String, Value)> = self
            .inner
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        snapshot.sort_by(|a, b| a.0.cmp(&b.0));

        journal.rewrite(snapshot.iter().map(|(k, v)| (k.as_str(), v)))
    }

    /// Flush and detach the journal. Later writes to a durable store fail
    /// with [`StoreError::Closed`]; reads keep working.
    pub fn close(&self) -> Result<(), StoreError> {
        let mut guard = self.inner.journal.lock();
        if let Some(mut journal) = guard.take() {
            journal.sync()?;
            info!(path = %journal.path().display(), "Store closed");
        }
        Ok(())
    }

    fn commit(&self, record: JournalRecord) -> Result<bool, StoreError> {
        if !self.inner.mode.requires_journal() {
            return Ok(self.apply(record));
        }

        let mut guard = self.inner.journal.lock();
        let journal = guard.as_mut().ok_or(StoreError::Closed)?;
        journal.append(&record)?;
        Ok(self.apply(record))
    }

    /// Apply a record to memory; returns whether the key was previously present.
    fn apply(&self, record: JournalRecord) -> bool {
        match record {
            JournalRecord::Set { key, value } => self.inner.entries.insert(key, value).is_some(),
            JournalRecord::Delete { key } => self.inner.entries.remove(&key).is_some(),
        }
    }
}
