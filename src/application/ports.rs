//! Ports (interfaces) for the application layer.
//!
//! In hexagonal architecture, ports define the interfaces that the application
//! layer needs. Infrastructure adapters implement these ports.

use crate::domain::entry::WriteOptions;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::time::SystemTime;
use thiserror::Error;

/// Key used by the availability check.
pub const SENTINEL_KEY: &str = "__utm_sentinel__";

/// Value written by the availability check.
pub const SENTINEL_VALUE: &str = "1";

/// Port for obtaining current time.
///
/// Expiry is wall-clock based (it is serialized as an HTTP-date), so the
/// clock yields `SystemTime`. Infrastructure provides `SystemClock` and,
/// for tests, `MockClock`.
pub trait Clock: Send + Sync + Debug {
    /// Get the current time.
    fn now(&self) -> SystemTime;
}

/// Port for durable named-value storage with per-entry expiry.
///
/// Stores know nothing about attribution: `write` always overwrites.
/// Reads never fail; a missing, removed or expired entry is simply `None`.
///
/// Names are not re-validated here. Callers must only pass names accepted
/// by [`crate::domain::entry::is_valid_name`].
pub trait KeyValueStore: Send + Sync + Debug {
    /// Persist `value` under `name` until `now + options.ttl_days`.
    ///
    /// Backend failures are swallowed and logged; the value stays readable
    /// for the lifetime of the process.
    fn write(&self, name: &str, value: &str, options: &WriteOptions);

    /// Get the live value under `name`.
    fn read(&self, name: &str) -> Option<String>;

    /// Delete the entry under `name`. Removing an absent name is a no-op.
    fn remove(&self, name: &str);

    /// Get every live entry.
    fn read_all(&self) -> BTreeMap<String, String>;

    /// Drop expired entries, returning how many were removed.
    fn purge_expired(&self) -> usize;

    /// Check that writes actually persist.
    ///
    /// Writes a sentinel entry, reads it back and removes it again.
    fn is_available(&self) -> bool {
        self.write(SENTINEL_KEY, SENTINEL_VALUE, &WriteOptions::with_ttl_days(1));
        let available = self.read(SENTINEL_KEY).as_deref() == Some(SENTINEL_VALUE);
        self.remove(SENTINEL_KEY);
        available
    }

    /// Serialize `value` as JSON and write it.
    ///
    /// # Errors
    /// Returns an error only if `value` cannot be represented as JSON.
    fn write_structured<T>(
        &self,
        name: &str,
        value: &T,
        options: &WriteOptions,
    ) -> Result<(), serde_json::Error>
    where
        T: Serialize + ?Sized,
        Self: Sized,
    {
        let text = serde_json::to_string(value)?;
        self.write(name, &text, options);
        Ok(())
    }

    /// Read and decode a JSON value.
    ///
    /// Returns `None` when the entry is absent or does not decode as `T`.
    fn read_structured<T>(&self, name: &str) -> Option<T>
    where
        T: DeserializeOwned,
        Self: Sized,
    {
        let text = self.read(name)?;
        match serde_json::from_str(&text) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!(name, error = %e, "stored value is not valid JSON for the requested type");
                None
            }
        }
    }
}

/// Error raised by a persistence backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Underlying I/O failed
    #[error("backend I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The backend refused the operation (disabled, quota exceeded, ...)
    #[error("backend rejected operation: {0}")]
    Rejected(String),
}

/// Port for the raw persistence medium behind a cookie-style store.
///
/// Backends only move wire lines around; parsing and expiry are handled
/// by the store.
pub trait PersistenceBackend: Send + Sync + Debug {
    /// Load every persisted line.
    fn load(&self) -> Result<Vec<String>, BackendError>;

    /// Persist `line` as the entry for `name`, replacing any previous line.
    fn store(&self, name: &str, line: &str) -> Result<(), BackendError>;

    /// Delete the entry for `name`. Deleting an absent name succeeds.
    fn delete(&self, name: &str) -> Result<(), BackendError>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for std::sync::Arc<T> {
    fn write(&self, name: &str, value: &str, options: &WriteOptions) {
        (**self).write(name, value, options)
    }

    fn read(&self, name: &str) -> Option<String> {
        (**self).read(name)
    }

    fn remove(&self, name: &str) {
        (**self).remove(name)
    }

    fn read_all(&self) -> BTreeMap<String, String> {
        (**self).read_all()
    }

    fn purge_expired(&self) -> usize {
        (**self).purge_expired()
    }

    fn is_available(&self) -> bool {
        (**self).is_available()
    }
}

impl<T: PersistenceBackend + ?Sized> PersistenceBackend for std::sync::Arc<T> {
    fn load(&self) -> Result<Vec<String>, BackendError> {
        (**self).load()
    }

    fn store(&self, name: &str, line: &str) -> Result<(), BackendError> {
        (**self).store(name, line)
    }

    fn delete(&self, name: &str) -> Result<(), BackendError> {
        (**self).delete(name)
    }
}
