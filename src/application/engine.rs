//! Attribution engine.
//!
//! Validates parameter keys against the whitelist, applies the active
//! strategy to decide whether an incoming value replaces the stored one, and
//! writes accepted values with the policy's lifetime and scope.

use crate::application::metrics::Metrics;
use crate::application::notify::{Notifier, SubscriptionId, UpdateListener};
use crate::application::ports::KeyValueStore;
use crate::domain::entry::{SameSite, MAX_TTL_DAYS};
use crate::domain::parameter::{UtmParameter, UtmSnapshot};
use crate::domain::policy::{AttributionPolicy, PolicyError};
use crate::domain::strategy::{AttributionStrategy, WriteDecision};
use crate::infrastructure::storage::ShardedStore;
use std::sync::{PoisonError, RwLock};
use thiserror::Error;
use tracing::{debug, warn};

/// Error returned by single-parameter operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttributionError {
    /// Key lacks the `utm_` prefix or names no whitelisted parameter
    #[error("invalid parameter kind: {key:?}")]
    InvalidParameterKind {
        /// The key as supplied
        key: String,
    },
    /// A lifetime override of zero days or more than [`MAX_TTL_DAYS`]
    #[error("ttl_days override must be between 1 and {}", MAX_TTL_DAYS)]
    InvalidTtl,
    /// The store does not persist writes
    #[error("persistence is unavailable")]
    PersistenceUnavailable,
}

/// Error returned when building an engine fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// The assembled policy is invalid
    #[error("invalid policy: {0}")]
    Policy(#[from] PolicyError),
}

/// A key a batch could not store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedKey {
    /// The key as supplied
    pub key: String,
    /// Why it was rejected
    pub error: AttributionError,
}

/// Outcome of [`AttributionEngine::save_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Recognized parameters, in batch order (whether or not the strategy wrote them)
    pub accepted: Vec<UtmParameter>,
    /// Keys that failed validation
    pub rejected: Vec<RejectedKey>,
}

impl BatchReport {
    /// Check whether every key in the batch was recognized.
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Builder for constructing an [`AttributionEngine`].
pub struct AttributionEngineBuilder {
    policy: AttributionPolicy,
    listeners: Vec<UpdateListener>,
}

impl AttributionEngineBuilder {
    /// Replace the whole policy.
    pub fn with_policy(mut self, policy: AttributionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the attribution strategy.
    pub fn with_strategy(mut self, strategy: AttributionStrategy) -> Self {
        self.policy.strategy = strategy;
        self
    }

    /// Set the default lifetime in days.
    ///
    /// The value will be validated when `build()` is called.
    pub fn with_ttl_days(mut self, ttl_days: u32) -> Self {
        self.policy.ttl_days = ttl_days;
        self
    }

    /// Set the domain scope of writes.
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.policy.domain = Some(domain.into());
        self
    }

    /// Set the path scope of writes.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.policy.path = path.into();
        self
    }

    /// Set the secure-only flag of writes.
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.policy.secure = secure;
        self
    }

    /// Set the cross-site send policy of writes.
    pub fn with_same_site(mut self, same_site: SameSite) -> Self {
        self.policy.same_site = same_site;
        self
    }

    /// Register an update listener up front.
    pub fn with_listener(mut self, listener: UpdateListener) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Build the engine over `store`.
    ///
    /// # Errors
    /// Returns `BuildError` if the configured policy is invalid.
    pub fn build<S: KeyValueStore>(self, store: S) -> Result<AttributionEngine<S>, BuildError> {
        let engine = AttributionEngine::new(store, self.policy)?;
        for listener in self.listeners {
            engine.subscribe(listener);
        }
        Ok(engine)
    }
}

/// Attribution-aware parameter store.
///
/// The only mutable state is the active policy, swapped wholesale by
/// [`configure`](Self::configure). Each engine instance is independent.
///
/// # Example
/// ```
/// use utm_attribution::{AttributionEngine, AttributionStrategy, ShardedStore};
///
/// let engine = AttributionEngine::builder()
///     .with_strategy(AttributionStrategy::FirstTouch)
///     .build(ShardedStore::new())
///     .unwrap();
///
/// engine.save("utm_source", "newsletter", None).unwrap();
/// engine.save("utm_source", "google", None).unwrap();
///
/// assert_eq!(engine.get("UTM_SOURCE").unwrap().as_deref(), Some("newsletter"));
/// assert!(engine.save("ref", "x", None).is_err());
/// ```
pub struct AttributionEngine<S>
where
    S: KeyValueStore,
{
    store: S,
    policy: RwLock<AttributionPolicy>,
    metrics: Metrics,
    notifier: Notifier,
}

impl AttributionEngine<ShardedStore> {
    /// Create a builder starting from the default policy.
    ///
    /// The store is supplied to [`AttributionEngineBuilder::build`], so the
    /// builder works for any [`KeyValueStore`].
    pub fn builder() -> AttributionEngineBuilder {
        AttributionEngineBuilder {
            policy: AttributionPolicy::default(),
            listeners: Vec::new(),
        }
    }

    /// Create an engine over a fresh in-memory store with the default policy.
    pub fn in_memory() -> Self {
        Self::with_default_policy(ShardedStore::new())
    }
}

impl<S> AttributionEngine<S>
where
    S: KeyValueStore,
{
    /// Create an engine with an explicit policy.
    ///
    /// # Errors
    /// Returns `PolicyError` if the policy is invalid.
    pub fn new(store: S, policy: AttributionPolicy) -> Result<Self, PolicyError> {
        policy.validate()?;
        Ok(Self {
            store,
            policy: RwLock::new(policy),
            metrics: Metrics::new(),
            notifier: Notifier::new(),
        })
    }

    /// Create an engine with the default policy (last-touch, 30 days).
    pub fn with_default_policy(store: S) -> Self {
        Self {
            store,
            policy: RwLock::new(AttributionPolicy::default()),
            metrics: Metrics::new(),
            notifier: Notifier::new(),
        }
    }

    /// Replace the active policy.
    ///
    /// Already stored entries are not touched; only future decisions and
    /// future writes' lifetime and scope change.
    ///
    /// # Errors
    /// Returns `PolicyError` and keeps the current policy if `policy` is invalid.
    pub fn configure(&self, policy: AttributionPolicy) -> Result<(), PolicyError> {
        policy.validate()?;
        debug!(strategy = policy.strategy.name(), ttl_days = policy.ttl_days, "policy replaced");
        *self.policy.write().unwrap_or_else(PoisonError::into_inner) = policy;
        Ok(())
    }

    /// Get a copy of the active policy.
    pub fn policy(&self) -> AttributionPolicy {
        self.policy
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Get the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get the metrics tracker.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Save one parameter under the active strategy.
    ///
    /// A value the strategy declines (first-touch with a prior value, or a
    /// tie-break callback choosing the stored value) is a silent no-op. A
    /// panicking tie-break callback is logged, counted, and treated as a
    /// no-op.
    ///
    /// # Errors
    /// - `InvalidParameterKind` if `key` is not a whitelisted `utm_` key
    /// - `InvalidTtl` if `ttl_days` is `Some(0)` or above [`MAX_TTL_DAYS`]
    pub fn save(&self, key: &str, value: &str, ttl_days: Option<u32>) -> Result<(), AttributionError> {
        let parameter = self.resolve(key)?;
        if matches!(ttl_days, Some(days) if days == 0 || days > MAX_TTL_DAYS) {
            return Err(AttributionError::InvalidTtl);
        }
        self.apply(parameter, value, ttl_days);
        Ok(())
    }

    /// Get the stored value of one parameter.
    ///
    /// # Errors
    /// Returns `InvalidParameterKind` if `key` is not a whitelisted `utm_` key.
    pub fn get(&self, key: &str) -> Result<Option<String>, AttributionError> {
        let parameter = self.resolve(key)?;
        Ok(self.store.read(parameter.key()))
    }

    /// Get every stored parameter under its canonical key.
    ///
    /// Entries of other namespaces sharing the store are never included.
    pub fn get_all(&self) -> UtmSnapshot {
        self.store
            .read_all()
            .into_iter()
            .filter(|(key, _)| UtmParameter::is_canonical_key(key))
            .collect()
    }

    /// Save every pair of a batch.
    ///
    /// Invalid keys are logged and reported in the returned [`BatchReport`];
    /// they never stop the rest of the batch. When at least one key was
    /// recognized, listeners receive the resulting snapshot.
    pub fn save_all<I, K, V>(&self, params: I, ttl_days: Option<u32>) -> BatchReport
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut report = BatchReport::default();

        for (key, value) in params {
            let key = key.as_ref();
            match self.save(key, value.as_ref(), ttl_days) {
                Ok(()) => {
                    if let Some(parameter) = UtmParameter::parse_key(key) {
                        report.accepted.push(parameter);
                    }
                }
                Err(error) => {
                    warn!(key, error = %error, "skipping parameter in batch");
                    report.rejected.push(RejectedKey {
                        key: key.to_string(),
                        error,
                    });
                }
            }
        }

        if !report.accepted.is_empty() {
            self.notifier.notify(&self.get_all());
        }
        report
    }

    /// Remove every stored parameter.
    pub fn clear(&self) {
        for parameter in UtmParameter::ALL {
            self.store.remove(parameter.key());
        }
    }

    /// Register a listener for "parameters updated" notifications.
    pub fn subscribe(&self, listener: UpdateListener) -> SubscriptionId {
        self.notifier.subscribe(listener)
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.notifier.unsubscribe(id)
    }

    /// Check whether the store persists writes.
    pub fn is_available(&self) -> bool {
        self.store.is_available()
    }

    /// [`is_available`](Self::is_available) as a `Result`.
    ///
    /// # Errors
    /// Returns `PersistenceUnavailable` if the round trip fails.
    pub fn ensure_available(&self) -> Result<(), AttributionError> {
        if self.store.is_available() {
            Ok(())
        } else {
            Err(AttributionError::PersistenceUnavailable)
        }
    }

    fn resolve(&self, key: &str) -> Result<UtmParameter, AttributionError> {
        UtmParameter::parse_key(key).ok_or_else(|| {
            self.metrics.record_rejected();
            AttributionError::InvalidParameterKind {
                key: key.to_string(),
            }
        })
    }

    fn apply(&self, parameter: UtmParameter, value: &str, ttl_days: Option<u32>) {
        let key = parameter.key();
        let prior = self.store.read(key);
        // Cloned so the callback runs without the lock held
        let policy = self.policy();

        match policy.strategy.decide(prior.as_deref(), value) {
            Ok(WriteDecision::Write) => {
                self.store.write(key, value, &policy.write_options(ttl_days));
                self.metrics.record_written();
                debug!(key, strategy = policy.strategy.name(), "parameter stored");
            }
            Ok(WriteDecision::Keep) => {
                self.metrics.record_kept();
                debug!(key, strategy = policy.strategy.name(), "stored parameter kept");
            }
            Err(failure) => {
                self.metrics.record_kept();
                self.metrics.record_callback_failure();
                warn!(key, error = %failure, "tie-break callback failed, keeping stored value");
            }
        }
    }
}

impl<S> std::fmt::Debug for AttributionEngine<S>
where
    S: KeyValueStore,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttributionEngine")
            .field("store", &self.store)
            .field("policy", &self.policy())
            .field("notifier", &self.notifier)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::Clock;
    use crate::domain::entry::WriteOptions;
    use crate::infrastructure::mocks::MockClock;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn engine_with(strategy: AttributionStrategy) -> (AttributionEngine<ShardedStore>, MockClock) {
        let clock = MockClock::fixed();
        let store = ShardedStore::with_clock(Arc::new(clock.clone()));
        let engine = AttributionEngine::builder()
            .with_strategy(strategy)
            .build(store)
            .unwrap();
        (engine, clock)
    }

    #[test]
    fn test_invalid_keys_rejected() {
        let (engine, _clock) = engine_with(AttributionStrategy::LastTouch);

        for key in ["source", "utm_id", "utm_", "", "gclid", "utm-source"] {
            assert_eq!(
                engine.save(key, "v", None),
                Err(AttributionError::InvalidParameterKind {
                    key: key.to_string()
                })
            );
            assert!(engine.get(key).is_err());
        }
        assert_eq!(engine.metrics().keys_rejected(), 12);
        assert!(engine.store().is_empty());
    }

    #[test]
    fn test_keys_are_normalized() {
        let (engine, _clock) = engine_with(AttributionStrategy::LastTouch);

        engine.save("UTM_Medium", "email", None).unwrap();

        assert_eq!(engine.get("utm_medium").unwrap().as_deref(), Some("email"));
        assert_eq!(engine.store().read("utm_medium").as_deref(), Some("email"));
        assert_eq!(engine.store().read("UTM_Medium"), None);
    }

    #[test]
    fn test_first_touch() {
        let (engine, _clock) = engine_with(AttributionStrategy::FirstTouch);

        engine.save("utm_source", "a", None).unwrap();
        engine.save("utm_source", "b", None).unwrap();

        assert_eq!(engine.get("utm_source").unwrap().as_deref(), Some("a"));
        assert_eq!(engine.metrics().values_written(), 1);
        assert_eq!(engine.metrics().values_kept(), 1);
    }

    #[test]
    fn test_first_touch_rewrites_after_expiry() {
        let (engine, clock) = engine_with(AttributionStrategy::FirstTouch);

        engine.save("utm_source", "a", Some(1)).unwrap();
        clock.advance_days(2);
        engine.save("utm_source", "b", None).unwrap();

        assert_eq!(engine.get("utm_source").unwrap().as_deref(), Some("b"));
    }

    #[test]
    fn test_last_touch() {
        let (engine, _clock) = engine_with(AttributionStrategy::LastTouch);

        engine.save("utm_source", "a", None).unwrap();
        engine.save("utm_source", "b", None).unwrap();

        assert_eq!(engine.get("utm_source").unwrap().as_deref(), Some("b"));
    }

    #[test]
    fn test_dynamic_keeps_google() {
        let (engine, _clock) = engine_with(AttributionStrategy::dynamic(|current, incoming| {
            if incoming.contains("google") {
                incoming.to_string()
            } else {
                current.to_string()
            }
        }));

        engine.save("utm_source", "facebook", None).unwrap();
        assert_eq!(engine.get("utm_source").unwrap(), None);

        engine.save("utm_source", "google-ads", None).unwrap();
        engine.save("utm_source", "bing", None).unwrap();

        assert_eq!(
            engine.get("utm_source").unwrap().as_deref(),
            Some("google-ads")
        );
    }

    #[test]
    fn test_dynamic_callback_panic_is_swallowed() {
        let (engine, _clock) = engine_with(AttributionStrategy::LastTouch);
        engine.save("utm_source", "kept", None).unwrap();
        engine
            .configure(AttributionPolicy::new(AttributionStrategy::dynamic(|_, _| {
                panic!("callback bug")
            })))
            .unwrap();

        assert_eq!(engine.save("utm_source", "new", None), Ok(()));
        assert_eq!(engine.get("utm_source").unwrap().as_deref(), Some("kept"));
        assert_eq!(engine.metrics().callback_failures(), 1);
    }

    #[test]
    fn test_ttl_override_and_policy_ttl() {
        let (engine, clock) = engine_with(AttributionStrategy::LastTouch);
        let start = clock.now();

        engine.save("utm_source", "a", None).unwrap();
        engine.save("utm_medium", "b", Some(2)).unwrap();

        let source = engine.store().entry("utm_source").unwrap();
        let medium = engine.store().entry("utm_medium").unwrap();
        assert_eq!(source.expires_at, start + Duration::from_secs(30 * 86_400));
        assert_eq!(medium.expires_at, start + Duration::from_secs(2 * 86_400));

        assert_eq!(
            engine.save("utm_term", "c", Some(0)),
            Err(AttributionError::InvalidTtl)
        );
    }

    #[test]
    fn test_ttl_override_upper_bound() {
        let engine = AttributionEngine::in_memory();

        assert_eq!(
            engine.save("utm_source", "google", Some(MAX_TTL_DAYS + 1)),
            Err(AttributionError::InvalidTtl)
        );
        assert_eq!(
            engine.save("utm_source", "google", Some(u32::MAX)),
            Err(AttributionError::InvalidTtl)
        );
        assert_eq!(engine.get("utm_source").unwrap(), None);

        engine.save("utm_source", "google", Some(MAX_TTL_DAYS)).unwrap();
        assert_eq!(engine.get("utm_source").unwrap().as_deref(), Some("google"));
    }

    #[test]
    fn test_configure_rejects_injected_scope() {
        let engine = AttributionEngine::in_memory();

        let result = engine.configure(AttributionPolicy::default().with_path("/; domain=evil.test"));

        assert!(matches!(
            result,
            Err(PolicyError::InvalidScope { attribute: "path", .. })
        ));
        assert_eq!(engine.policy().path, "/");
    }

    #[test]
    fn test_configure_replaces_wholesale() {
        let (engine, _clock) = engine_with(AttributionStrategy::FirstTouch);
        engine
            .configure(
                AttributionPolicy::new(AttributionStrategy::FirstTouch)
                    .with_domain("example.com")
                    .with_ttl_days(7),
            )
            .unwrap();

        // Fields not set fall back to defaults, not to the previous policy
        engine
            .configure(AttributionPolicy::new(AttributionStrategy::LastTouch))
            .unwrap();
        let policy = engine.policy();

        assert_eq!(policy.strategy.name(), "last_touch");
        assert_eq!(policy.domain, None);
        assert_eq!(policy.ttl_days, 30);
    }

    #[test]
    fn test_configure_rejects_invalid_policy() {
        let (engine, _clock) = engine_with(AttributionStrategy::FirstTouch);

        assert_eq!(
            engine.configure(AttributionPolicy::default().with_ttl_days(0)),
            Err(PolicyError::ZeroTtl)
        );
        assert_eq!(engine.policy().strategy.name(), "first_touch");
    }

    #[test]
    fn test_configure_does_not_touch_stored_entries() {
        let (engine, clock) = engine_with(AttributionStrategy::LastTouch);
        let start = clock.now();
        engine.save("utm_source", "a", None).unwrap();

        engine
            .configure(AttributionPolicy::default().with_ttl_days(1).with_secure(false))
            .unwrap();

        let entry = engine.store().entry("utm_source").unwrap();
        assert_eq!(entry.expires_at, start + Duration::from_secs(30 * 86_400));
        assert!(entry.secure);
    }

    #[test]
    fn test_get_all_filters_foreign_entries() {
        let (engine, _clock) = engine_with(AttributionStrategy::LastTouch);
        let options = WriteOptions::with_ttl_days(1);
        engine.store().write("session_id", "abc", &options);
        engine.store().write("UTM_SOURCE", "shouty", &options);
        engine.store().write("utm_id", "123", &options);

        engine.save("utm_source", "google", None).unwrap();

        let all = engine.get_all();
        assert_eq!(all.len(), 1);
        assert_eq!(all.get("utm_source").map(String::as_str), Some("google"));
    }

    #[test]
    fn test_save_all_is_best_effort() {
        let (engine, _clock) = engine_with(AttributionStrategy::LastTouch);

        let report = engine.save_all(
            [
                ("utm_source", "google"),
                ("bogus", "x"),
                ("utm_medium", "cpc"),
            ],
            None,
        );

        assert_eq!(
            report.accepted,
            vec![UtmParameter::Source, UtmParameter::Medium]
        );
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].key, "bogus");
        assert!(!report.is_clean());

        let all = engine.get_all();
        assert_eq!(all.len(), 2);
        assert_eq!(all["utm_source"], "google");
        assert_eq!(all["utm_medium"], "cpc");
    }

    #[test]
    fn test_save_all_notifies_once_with_snapshot() {
        let (engine, _clock) = engine_with(AttributionStrategy::LastTouch);
        let calls = Arc::new(AtomicUsize::new(0));
        let last = Arc::new(std::sync::Mutex::new(UtmSnapshot::new()));

        let (calls_clone, last_clone) = (Arc::clone(&calls), Arc::clone(&last));
        engine.subscribe(Arc::new(move |snapshot: &UtmSnapshot| {
            calls_clone.fetch_add(1, Ordering::Relaxed);
            *last_clone.lock().unwrap() = snapshot.clone();
        }));

        engine.save_all([("utm_source", "google"), ("utm_term", "shoes")], None);
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert_eq!(*last.lock().unwrap(), engine.get_all());

        // Nothing recognized, nothing announced
        engine.save_all([("bogus", "x")], None);
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_clear() {
        let (engine, _clock) = engine_with(AttributionStrategy::LastTouch);
        engine.store().write("session_id", "abc", &WriteOptions::with_ttl_days(1));
        engine.save_all([("utm_source", "a"), ("utm_medium", "b")], None);

        engine.clear();

        assert!(engine.get_all().is_empty());
        assert_eq!(engine.store().read("session_id").as_deref(), Some("abc"));
    }

    #[test]
    fn test_ensure_available() {
        let (engine, _clock) = engine_with(AttributionStrategy::LastTouch);
        assert_eq!(engine.ensure_available(), Ok(()));
    }

    #[test]
    fn test_build_rejects_zero_ttl() {
        let result = AttributionEngine::builder()
            .with_ttl_days(0)
            .build(ShardedStore::new());

        assert!(matches!(result, Err(BuildError::Policy(PolicyError::ZeroTtl))));
    }
}
