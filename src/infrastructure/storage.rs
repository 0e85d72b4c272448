//! In-memory store for parameter entries.
//!
//! Provides concurrent, sharded storage with lazy expiry. Also serves as the
//! in-process mirror of [`crate::infrastructure::cookie_store::CookieStore`].

use crate::application::ports::{Clock, KeyValueStore};
use crate::domain::entry::{StoredEntry, WriteOptions};
use crate::infrastructure::clock::SystemClock;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Thread-safe sharded store backed by DashMap.
///
/// Expired entries are invisible to reads and are dropped lazily on access
/// or eagerly via [`KeyValueStore::purge_expired`].
pub struct ShardedStore {
    map: DashMap<String, StoredEntry>,
    clock: Arc<dyn Clock>,
}

impl ShardedStore {
    /// Create a store driven by the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock::new()))
    }

    /// Create a store driven by a custom clock (mainly for testing).
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            map: DashMap::new(),
            clock,
        }
    }

    /// Get the clock driving expiry.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Insert a fully-formed entry, replacing any existing one.
    pub fn insert_entry(&self, name: impl Into<String>, entry: StoredEntry) {
        self.map.insert(name.into(), entry);
    }

    /// Get a copy of the live entry under `name`, including its options.
    pub fn entry(&self, name: &str) -> Option<StoredEntry> {
        let now = self.clock.now();
        self.map
            .get(name)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value().clone())
    }

    /// Get the number of entries held, including not-yet-purged expired ones.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Check if the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Clear all entries.
    pub fn clear(&self) {
        self.map.clear();
    }
}

impl Default for ShardedStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ShardedStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardedStore")
            .field("entries", &self.map.len())
            .field("clock", &self.clock)
            .finish()
    }
}

impl KeyValueStore for ShardedStore {
    fn write(&self, name: &str, value: &str, options: &WriteOptions) {
        let entry = StoredEntry::new(value, options, self.clock.now());
        self.map.insert(name.to_string(), entry);
    }

    fn read(&self, name: &str) -> Option<String> {
        let now = self.clock.now();
        {
            let entry = self.map.get(name)?;
            if entry.is_live(now) {
                return Some(entry.value.clone());
            }
        }
        // Guard dropped above; removing while holding it would deadlock the shard
        self.map.remove_if(name, |_, entry| !entry.is_live(now));
        None
    }

    fn remove(&self, name: &str) {
        self.map.remove(name);
    }

    fn read_all(&self) -> BTreeMap<String, String> {
        let now = self.clock.now();
        self.map
            .iter()
            .filter(|entry| entry.value().is_live(now))
            .map(|entry| (entry.key().clone(), entry.value().value.clone()))
            .collect()
    }

    fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.map.len();
        self.map.retain(|_, entry| entry.is_live(now));
        before.saturating_sub(self.map.len())
    }
}
