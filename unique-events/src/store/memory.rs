//! Mutex-backed in-process store

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};
use hashbrown::HashMap;
use unique_events_timesource::{TimeSource, get_time_source};

use crate::{
    error::StoreError,
    sketch::{DEFAULT_PRECISION, HyperLogLog},
    store::{CardinalityStore, validate_key},
};

#[derive(Debug)]
struct Entry {
    sketch: HyperLogLog,
    expires_at: DateTime<Utc>,
}

impl Entry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// In-process [`CardinalityStore`] holding one [`HyperLogLog`] per key.
///
/// Expiry is evaluated against the configured [`TimeSource`], or the thread-local
/// override if none was given. Expired keys read as empty and are reset on the next write;
/// [`MemoryStore::purge_expired`] reclaims their memory.
///
/// # Example
/// ```
/// use chrono::TimeDelta;
/// use unique_events::store::{CardinalityStore, MemoryStore};
///
/// let store = MemoryStore::new();
/// store.add("{search}-2020-153", &["alice", "bob"], TimeDelta::days(29)).unwrap();
/// store.add("{search}-2020-154", &["bob"], TimeDelta::days(29)).unwrap();
///
/// let keys = ["{search}-2020-153".to_string(), "{search}-2020-154".to_string()];
/// assert_eq!(store.count(&keys).unwrap(), 2);
/// ```
#[derive(Debug)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    precision: u8,
    time_source: Option<TimeSource>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store using sketches at the default precision
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            precision: DEFAULT_PRECISION,
            time_source: None,
        }
    }

    /// Use `time_source` to evaluate expiry
    pub fn with_time_source(mut self, time_source: TimeSource) -> Self {
        self.time_source = Some(time_source);
        self
    }

    /// Use sketches of the given precision. Returns None if the precision is unsupported.
    pub fn with_precision(mut self, precision: u8) -> Option<Self> {
        HyperLogLog::with_precision(precision)?;
        self.precision = precision;
        Some(self)
    }

    /// Number of keys that have not expired
    pub fn len(&self) -> usize {
        let now = self.now();
        self.lock().values().filter(|e| e.is_live(now)).count()
    }

    /// Whether no live key is stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remaining time to live of `key`, or None if it is missing or expired
    pub fn ttl(&self, key: &str) -> Option<TimeDelta> {
        let now = self.now();
        self.lock()
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.expires_at - now)
    }

    /// Drop every expired key. Returns how many were removed.
    pub fn purge_expired(&self) -> Result<usize, StoreError> {
        let now = self.now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        let removed = before - entries.len();
        if removed > 0 {
            tracing::debug!(removed, "purged expired keys");
        }
        Ok(removed)
    }

    fn now(&self) -> DateTime<Utc> {
        get_time_source(self.time_source.clone()).now()
    }

    // no write leaves an entry half-updated
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn new_sketch(&self) -> HyperLogLog {
        HyperLogLog::with_precision(self.precision).unwrap_or_default()
    }
}

impl CardinalityStore for MemoryStore {
    fn add(&self, key: &str, actor_ids: &[&str], ttl: TimeDelta) -> Result<(), StoreError> {
        validate_key(key)?;
        let now = self.now();
        let expires_at = (ttl > TimeDelta::zero())
            .then(|| now.checked_add_signed(ttl))
            .flatten()
            .ok_or(StoreError::InvalidTtl(ttl))?;

        let mut entries = self.lock();
        let entry = entries.entry(key.to_owned()).or_insert_with(|| Entry {
            sketch: self.new_sketch(),
            expires_at,
        });
        if !entry.is_live(now) {
            entry.sketch = self.new_sketch();
        }
        for actor_id in actor_ids {
            entry.sketch.insert(actor_id);
        }
        entry.expires_at = expires_at;

        tracing::trace!(key, actors = actor_ids.len(), %expires_at, "added actors");
        Ok(())
    }

    fn count(&self, keys: &[String]) -> Result<u64, StoreError> {
        for key in keys {
            validate_key(key)?;
        }
        let now = self.now();

        let mut union = self.new_sketch();
        {
            let entries = self.lock();
            for key in keys {
                if let Some(entry) = entries.get(key.as_str()).filter(|e| e.is_live(now)) {
                    union
                        .merge(&entry.sketch)
                        .map_err(|err| StoreError::Unavailable(err.to_string()))?;
                }
            }
        }

        let estimate = union.estimate();
        tracing::trace!(keys = keys.len(), estimate, "counted union");
        Ok(estimate)
    }
}
