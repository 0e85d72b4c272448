//! Misbehaving persistence backends.

use crate::application::ports::{BackendError, PersistenceBackend};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Backend that accepts every write and silently keeps nothing,
/// like a host environment with storage disabled.
#[derive(Debug, Default)]
pub struct DiscardingBackend {
    writes: AtomicUsize,
}

impl DiscardingBackend {
    /// Create a new discarding backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of lines handed to `store` so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }
}

impl PersistenceBackend for DiscardingBackend {
    fn load(&self) -> Result<Vec<String>, BackendError> {
        Ok(Vec::new())
    }

    fn store(&self, _name: &str, _line: &str) -> Result<(), BackendError> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn delete(&self, _name: &str) -> Result<(), BackendError> {
        Ok(())
    }
}

/// Backend whose every operation fails, like an exhausted quota.
#[derive(Debug, Default)]
pub struct FailingBackend {
    attempts: AtomicUsize,
}

impl FailingBackend {
    /// Create a new failing backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of operations attempted so far.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::Relaxed)
    }

    fn fail(&self) -> BackendError {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        BackendError::Rejected("quota exceeded".to_string())
    }
}

impl PersistenceBackend for FailingBackend {
    fn load(&self) -> Result<Vec<String>, BackendError> {
        Err(self.fail())
    }

    fn store(&self, _name: &str, _line: &str) -> Result<(), BackendError> {
        Err(self.fail())
    }

    fn delete(&self, _name: &str) -> Result<(), BackendError> {
        Err(self.fail())
    }
}
