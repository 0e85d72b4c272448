//! Cookie-style store: an in-memory mirror over a persistence backend.
//!
//! Every write is applied to the mirror first and then forwarded to the
//! backend as a wire line. Backend failures never reach the caller: they are
//! logged and the mirror keeps serving the value for the rest of the
//! process. Use [`KeyValueStore::is_available`] to find out whether writes
//! actually reach the backend.

use crate::application::ports::{
    Clock, KeyValueStore, PersistenceBackend, SENTINEL_KEY, SENTINEL_VALUE,
};
use crate::domain::entry::{StoredEntry, WriteOptions};
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::storage::ShardedStore;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Store persisting entries through a [`PersistenceBackend`].
///
/// # Example
/// ```
/// use utm_attribution::{CookieStore, KeyValueStore, MemoryBackend, WriteOptions};
///
/// let store = CookieStore::open(MemoryBackend::new());
/// store.write("utm_source", "newsletter", &WriteOptions::with_ttl_days(30));
///
/// assert_eq!(store.read("utm_source").as_deref(), Some("newsletter"));
/// assert!(store.backend().line("utm_source").unwrap().starts_with("utm_source=newsletter; expires="));
/// ```
#[derive(Debug)]
pub struct CookieStore<B>
where
    B: PersistenceBackend,
{
    mirror: ShardedStore,
    backend: B,
}

impl<B> CookieStore<B>
where
    B: PersistenceBackend,
{
    /// Open a store over `backend` using the system clock.
    pub fn open(backend: B) -> Self {
        Self::open_with_clock(backend, Arc::new(SystemClock::new()))
    }

    /// Open a store over `backend`, hydrating the mirror from its lines.
    ///
    /// Unparsable and expired lines are skipped. A backend that cannot be
    /// loaded yields an empty store.
    pub fn open_with_clock(backend: B, clock: Arc<dyn Clock>) -> Self {
        let mirror = ShardedStore::with_clock(clock);
        let now = mirror.clock().now();

        match backend.load() {
            Ok(lines) => {
                let mut restored = 0usize;
                for line in &lines {
                    match StoredEntry::parse_wire(line) {
                        Ok((name, entry)) if entry.is_live(now) => {
                            mirror.insert_entry(name, entry);
                            restored += 1;
                        }
                        Ok((name, _)) => debug!(name = %name, "skipping expired persisted entry"),
                        Err(e) => debug!(error = %e, "skipping unparsable persisted entry"),
                    }
                }
                debug!(restored, total = lines.len(), "hydrated store from backend");
            }
            Err(e) => warn!(error = %e, "failed to load persisted entries, starting empty"),
        }

        Self { mirror, backend }
    }

    /// Get the persistence backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Get a copy of the live entry under `name`, including its options.
    pub fn entry(&self, name: &str) -> Option<StoredEntry> {
        self.mirror.entry(name)
    }
}

impl<B> KeyValueStore for CookieStore<B>
where
    B: PersistenceBackend,
{
    fn write(&self, name: &str, value: &str, options: &WriteOptions) {
        let entry = StoredEntry::new(value, options, self.mirror.clock().now());
        let line = entry.to_wire(name);
        self.mirror.insert_entry(name, entry);

        if let Err(e) = self.backend.store(name, &line) {
            warn!(name, error = %e, "failed to persist entry, keeping in-memory value only");
        }
    }

    fn read(&self, name: &str) -> Option<String> {
        self.mirror.read(name)
    }

    fn remove(&self, name: &str) {
        self.mirror.remove(name);
        if let Err(e) = self.backend.delete(name) {
            warn!(name, error = %e, "failed to delete persisted entry");
        }
    }

    fn read_all(&self) -> BTreeMap<String, String> {
        self.mirror.read_all()
    }

    fn purge_expired(&self) -> usize {
        let now = self.mirror.clock().now();
        let expired: Vec<String> = match self.backend.load() {
            Ok(lines) => lines
                .iter()
                .filter_map(|line| StoredEntry::parse_wire(line).ok())
                .filter(|(_, entry)| !entry.is_live(now))
                .map(|(name, _)| name)
                .collect(),
            Err(e) => {
                warn!(error = %e, "failed to load persisted entries for purge");
                Vec::new()
            }
        };
        for name in &expired {
            if let Err(e) = self.backend.delete(name) {
                warn!(name = %name, error = %e, "failed to delete expired persisted entry");
            }
        }
        self.mirror.purge_expired()
    }

    /// Round-trip a sentinel line through the backend itself.
    ///
    /// The mirror always accepts writes, so the check bypasses it.
    fn is_available(&self) -> bool {
        let entry = StoredEntry::new(
            SENTINEL_VALUE,
            &WriteOptions::with_ttl_days(1),
            self.mirror.clock().now(),
        );
        if let Err(e) = self.backend.store(SENTINEL_KEY, &entry.to_wire(SENTINEL_KEY)) {
            debug!(error = %e, "availability check write failed");
            return false;
        }

        let read_back = match self.backend.load() {
            Ok(lines) => lines.iter().any(|line| {
                matches!(
                    StoredEntry::parse_wire(line),
                    Ok((name, sentinel)) if name == SENTINEL_KEY && sentinel.value == SENTINEL_VALUE
                )
            }),
            Err(e) => {
                debug!(error = %e, "availability check read failed");
                false
            }
        };

        if let Err(e) = self.backend.delete(SENTINEL_KEY) {
            debug!(error = %e, "availability check cleanup failed");
            return false;
        }
        read_back
    }
}
