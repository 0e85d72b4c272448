//! # utm-attribution
//!
//! Attribution-aware storage for UTM campaign parameters.
//!
//! This crate captures the five standard campaign parameters (`utm_source`,
//! `utm_medium`, `utm_campaign`, `utm_term`, `utm_content`) from landing-page
//! URLs, persists them with cookie-style expiry and scope, and decides under a
//! configurable **attribution strategy** whether a new value replaces the one
//! already stored.
//!
//! ## Quick Start
//!
//! ```rust
//! use utm_attribution::{capture_url, AttributionEngine, AttributionStrategy, ShardedStore};
//!
//! let engine = AttributionEngine::builder()
//!     .with_strategy(AttributionStrategy::FirstTouch)
//!     .with_ttl_days(90)
//!     .build(ShardedStore::new())
//!     .unwrap();
//!
//! capture_url(&engine, "https://shop.example.com/?utm_source=newsletter&utm_medium=email", None).unwrap();
//! capture_url(&engine, "https://shop.example.com/?utm_source=google", None).unwrap();
//!
//! // First touch wins
//! assert_eq!(engine.get("utm_source").unwrap().as_deref(), Some("newsletter"));
//! assert_eq!(engine.get_all().len(), 2);
//! ```
//!
//! ## Attribution Strategies
//!
//! - **Last touch** (default): every incoming value overwrites the stored one
//! - **First touch**: the first value is kept until it expires
//! - **Dynamic**: a tie-break callback receives `(current, incoming)` and the
//!   incoming value is written only if the callback returns it unchanged
//!
//! ```rust
//! use utm_attribution::{AttributionEngine, AttributionPolicy, AttributionStrategy};
//!
//! let engine = AttributionEngine::in_memory();
//! engine.configure(AttributionPolicy::new(AttributionStrategy::dynamic(|current, incoming| {
//!     // Paid search always wins over anything else
//!     if incoming.contains("google") { incoming.to_string() } else { current.to_string() }
//! }))).unwrap();
//!
//! engine.save("utm_source", "facebook", None).unwrap();
//! engine.save("utm_source", "google-ads", None).unwrap();
//! engine.save("utm_source", "bing", None).unwrap();
//! assert_eq!(engine.get("utm_source").unwrap().as_deref(), Some("google-ads"));
//! ```
//!
//! A tie-break callback that panics is caught: the save becomes a no-op, a
//! `WARN` event is logged and [`Metrics::callback_failures`] is incremented.
//!
//! ## Storage
//!
//! Engines are generic over the [`KeyValueStore`] port:
//!
//! - [`ShardedStore`]: concurrent in-memory map with lazy expiry
//! - [`CookieStore`]: an in-memory mirror over a [`PersistenceBackend`]
//!   ([`MemoryBackend`], [`FileBackend`]) that persists each entry as a
//!   cookie line:
//!
//! ```text
//! utm_source=google; expires=Sat, 16 Nov 2024 10:00:00 GMT; path=/; domain=example.com; samesite=Lax; secure
//! ```
//!
//! Backend failures are swallowed and logged; the value stays readable for
//! the rest of the process. [`KeyValueStore::is_available`] checks whether
//! writes actually persist.
//!
//! ```rust,no_run
//! use utm_attribution::{AttributionEngine, CookieStore, FileBackend};
//!
//! let store = CookieStore::open(FileBackend::new("/var/lib/myapp/utm.jar"));
//! let engine = AttributionEngine::with_default_policy(store);
//! if !engine.is_available() {
//!     tracing::warn!("utm parameters will not survive a restart");
//! }
//! ```
//!
//! ## Errors
//!
//! Single-parameter calls fail fast: [`AttributionEngine::save`] and
//! [`AttributionEngine::get`] return [`AttributionError::InvalidParameterKind`]
//! for keys outside the whitelist. Batch calls ([`AttributionEngine::save_all`],
//! [`capture_url`]) never fail per key; rejected keys are logged at `WARN` and
//! listed in the returned [`BatchReport`].

// Domain layer - pure business logic
pub mod domain;

// Application layer - orchestration
pub mod application;

// Infrastructure layer - external adapters
pub mod infrastructure;

// Re-export commonly used types for convenience
pub use domain::{
    entry::{
        is_valid_name, is_valid_scope_value, SameSite, StoredEntry, WireError, WriteOptions,
        MAX_TTL_DAYS,
    },
    parameter::{UtmParameter, UtmSnapshot, UTM_PREFIX},
    policy::{AttributionPolicy, PolicyConfig, PolicyError, StrategyKind, DEFAULT_TTL_DAYS},
    strategy::{AttributionStrategy, CallbackFailure, TieBreakFn, WriteDecision},
};

pub use application::{
    engine::{
        AttributionEngine, AttributionEngineBuilder, AttributionError, BatchReport, BuildError,
        RejectedKey,
    },
    metrics::{Metrics, MetricsSnapshot},
    notify::{SubscriptionId, UpdateListener},
    ports::{BackendError, Clock, KeyValueStore, PersistenceBackend},
};

pub use infrastructure::{
    backend::{FileBackend, MemoryBackend},
    capture::{capture_url, extract_from_query, extract_utm_params, CaptureError},
    clock::SystemClock,
    cookie_store::CookieStore,
    storage::ShardedStore,
};
