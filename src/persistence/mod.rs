//! Persistence of machine snapshots through an external adapter.
//!
//! On every changed transition the machine queues a [`SerializedState`]
//! (as JSON) for a [`PersistenceAdapter`]; the write happens on the next
//! scheduler turn. Saves can be debounced with a throttle interval. On construction the machine schedules a best-effort
//! load of a previously saved snapshot; events sent before that load runs
//! are processed against the initial state and may be overwritten by it.

pub mod error;
mod manager;

pub use error::PersistenceError;
pub(crate) use manager::Persister;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Backing store for persisted snapshots.
///
/// The machine never inspects the store; any medium (memory, disk,
/// network) works. `save` and `load` are only called from tasks on the
/// machine's scheduler, so a slow adapter delays later saves but never the
/// transition that produced the snapshot. `remove` runs on the caller of
/// `clear_persisted`.
pub trait PersistenceAdapter: Send + Sync {
    fn save(&self, key: &str, data: Value) -> Result<(), PersistenceError>;

    /// Load the data saved under `key`, or `None` if nothing was saved.
    fn load(&self, key: &str) -> Result<Option<Value>, PersistenceError>;

    fn remove(&self, key: &str) -> Result<(), PersistenceError>;
}

/// Exact shape that is persisted and expected back from `load`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SerializedState<S, C> {
    pub value: S,
    pub context: C,
    /// Epoch milliseconds at capture time.
    pub timestamp: i64,
}

impl<S: Serialize + DeserializeOwned, C: Serialize + DeserializeOwned> SerializedState<S, C> {
    /// Capture `value` and `context` stamped with the current time.
    pub fn capture(value: S, context: C) -> Self {
        Self {
            value,
            context,
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    pub fn to_value(&self) -> Result<Value, PersistenceError> {
        serde_json::to_value(self).map_err(|e| PersistenceError::SerializationFailed(e.to_string()))
    }

    pub fn from_value(data: Value) -> Result<Self, PersistenceError> {
        serde_json::from_value(data).map_err(|e| PersistenceError::DeserializationFailed(e.to_string()))
    }
}

/// Persistence settings of a machine.
#[derive(Clone)]
pub struct PersistenceOptions {
    pub key: String,
    pub adapter: Arc<dyn PersistenceAdapter>,
    /// Quiet window for debounced saves; `None` saves on every change.
    pub throttle: Option<Duration>,
}

impl PersistenceOptions {
    pub fn new(key: impl Into<String>, adapter: Arc<dyn PersistenceAdapter>) -> Self {
        Self {
            key: key.into(),
            adapter,
            throttle: None,
        }
    }

    pub fn throttle(mut self, interval: Duration) -> Self {
        self.throttle = Some(interval);
        self
    }
}

impl fmt::Debug for PersistenceOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistenceOptions")
            .field("key", &self.key)
            .field("throttle", &self.throttle)
            .finish_non_exhaustive()
    }
}

/// In-memory adapter.
///
/// Counts saves, which makes it handy for checking throttling.
#[derive(Default)]
pub struct MemoryAdapter {
    entries: Mutex<HashMap<String, Value>>,
    saves: AtomicUsize,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate `key`, as if a previous session had saved it.
    pub fn with_entry(self, key: impl Into<String>, data: Value) -> Self {
        self.lock().insert(key.into(), data);
        self
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.lock().get(key).cloned()
    }

    /// Number of successful `save` calls so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Value>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl PersistenceAdapter for MemoryAdapter {
    fn save(&self, key: &str, data: Value) -> Result<(), PersistenceError> {
        self.lock().insert(key.to_string(), data);
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<Value>, PersistenceError> {
        Ok(self.get(key))
    }

    fn remove(&self, key: &str) -> Result<(), PersistenceError> {
        self.lock().remove(key);
        Ok(())
    }
}
