//! Observability metrics for attribution decisions.
//!
//! Counts what the engine did with each save, including the outcomes that
//! are only reported through the side channel (rejected batch keys and
//! failed tie-break callbacks).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Metrics tracking attribution statistics.
///
/// All metrics use atomic operations for thread-safe updates and reads.
/// Clones share the same counters.
#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    /// Saves that reached the store
    values_written: AtomicU64,
    /// Saves the strategy turned into a no-op
    values_kept: AtomicU64,
    /// Keys rejected as not whitelisted
    keys_rejected: AtomicU64,
    /// Tie-break callbacks that panicked
    callback_failures: AtomicU64,
}

impl Metrics {
    /// Create a new metrics tracker.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                values_written: AtomicU64::new(0),
                values_kept: AtomicU64::new(0),
                keys_rejected: AtomicU64::new(0),
                callback_failures: AtomicU64::new(0),
            }),
        }
    }

    pub(crate) fn record_written(&self) {
        self.inner.values_written.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_kept(&self) {
        self.inner.values_kept.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.inner.keys_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_callback_failure(&self) {
        self.inner.callback_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the number of saves that reached the store.
    pub fn values_written(&self) -> u64 {
        self.inner.values_written.load(Ordering::Relaxed)
    }

    /// Get the number of saves that left the stored value untouched.
    ///
    /// Includes saves whose tie-break callback failed.
    pub fn values_kept(&self) -> u64 {
        self.inner.values_kept.load(Ordering::Relaxed)
    }

    /// Get the number of rejected keys.
    pub fn keys_rejected(&self) -> u64 {
        self.inner.keys_rejected.load(Ordering::Relaxed)
    }

    /// Get the number of failed tie-break callbacks.
    pub fn callback_failures(&self) -> u64 {
        self.inner.callback_failures.load(Ordering::Relaxed)
    }

    /// Get a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            values_written: self.values_written(),
            values_kept: self.values_kept(),
            keys_rejected: self.keys_rejected(),
            callback_failures: self.callback_failures(),
        }
    }

    /// Reset all metrics to zero.
    pub fn reset(&self) {
        self.inner.values_written.store(0, Ordering::Relaxed);
        self.inner.values_kept.store(0, Ordering::Relaxed);
        self.inner.keys_rejected.store(0, Ordering::Relaxed);
        self.inner.callback_failures.store(0, Ordering::Relaxed);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time snapshot of metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    /// Saves that reached the store
    pub values_written: u64,
    /// Saves that left the stored value untouched
    pub values_kept: u64,
    /// Keys rejected as not whitelisted
    pub keys_rejected: u64,
    /// Tie-break callbacks that panicked
    pub callback_failures: u64,
}

impl MetricsSnapshot {
    /// Fraction of accepted saves that were written (0.0 to 1.0).
    ///
    /// Returns 0.0 if nothing has been saved.
    pub fn write_rate(&self) -> f64 {
        let total = self.values_written.saturating_add(self.values_kept);
        if total == 0 {
            0.0
        } else {
            self.values_written as f64 / total as f64
        }
    }
}
