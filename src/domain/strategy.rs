//! Attribution strategies.
//!
//! A strategy decides, for one key, whether an incoming value replaces the
//! value already stored. Decisions are pure functions of the prior value,
//! the incoming value and (for [`AttributionStrategy::Dynamic`]) the outcome
//! of the user's tie-break callback.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;

/// Tie-break callback consulted by the dynamic strategy.
///
/// Receives `(current, incoming)` where `current` is the stored value or an
/// empty string when nothing is stored. Returning `incoming` means "write";
/// any other return value keeps the stored value.
pub type TieBreakFn = Arc<dyn Fn(&str, &str) -> String + Send + Sync + 'static>;

/// Outcome of evaluating a strategy for a single save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteDecision {
    /// Persist the incoming value
    Write,
    /// Leave the stored value untouched
    Keep,
}

impl WriteDecision {
    /// Check if this decision is Write.
    pub fn is_write(&self) -> bool {
        matches!(self, WriteDecision::Write)
    }

    /// Check if this decision is Keep.
    pub fn is_keep(&self) -> bool {
        matches!(self, WriteDecision::Keep)
    }
}

/// The tie-break callback panicked.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("tie-break callback failed: {message}")]
pub struct CallbackFailure {
    /// Panic payload rendered as text
    pub message: String,
}

impl CallbackFailure {
    fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self { message }
    }
}

/// Which of a prior and an incoming value survives.
///
/// # Example
/// ```
/// use utm_attribution::{AttributionStrategy, WriteDecision};
///
/// let first = AttributionStrategy::FirstTouch;
/// assert_eq!(first.decide(None, "google").unwrap(), WriteDecision::Write);
/// assert_eq!(first.decide(Some("bing"), "google").unwrap(), WriteDecision::Keep);
///
/// let dynamic = AttributionStrategy::dynamic(|current, incoming| {
///     if incoming.contains("google") { incoming.to_string() } else { current.to_string() }
/// });
/// assert!(dynamic.decide(Some("facebook"), "google-ads").unwrap().is_write());
/// assert!(dynamic.decide(Some("google-ads"), "bing").unwrap().is_keep());
/// ```
#[derive(Clone, Default)]
pub enum AttributionStrategy {
    /// Keep the first value ever stored until it expires
    FirstTouch,
    /// Always store the newest value
    #[default]
    LastTouch,
    /// Let a callback arbitrate between the stored and incoming values
    Dynamic(TieBreakFn),
}

impl AttributionStrategy {
    /// Create a dynamic strategy from a closure.
    pub fn dynamic<F>(tie_break: F) -> Self
    where
        F: Fn(&str, &str) -> String + Send + Sync + 'static,
    {
        AttributionStrategy::Dynamic(Arc::new(tie_break))
    }

    /// Stable lower-case name, as used in configuration.
    pub fn name(&self) -> &'static str {
        match self {
            AttributionStrategy::FirstTouch => "first_touch",
            AttributionStrategy::LastTouch => "last_touch",
            AttributionStrategy::Dynamic(_) => "dynamic",
        }
    }

    /// Decide whether `incoming` should overwrite `prior`.
    ///
    /// `prior` is `None` when nothing is stored; a stored empty string is
    /// `Some("")` and counts as a prior value for first-touch.
    ///
    /// # Errors
    /// Returns [`CallbackFailure`] if the dynamic tie-break callback panics.
    /// Callers treat that as [`WriteDecision::Keep`].
    pub fn decide(
        &self,
        prior: Option<&str>,
        incoming: &str,
    ) -> Result<WriteDecision, CallbackFailure> {
        match self {
            AttributionStrategy::FirstTouch => Ok(if prior.is_none() {
                WriteDecision::Write
            } else {
                WriteDecision::Keep
            }),
            AttributionStrategy::LastTouch => Ok(WriteDecision::Write),
            AttributionStrategy::Dynamic(tie_break) => {
                let current = prior.unwrap_or("");
                let chosen = panic::catch_unwind(AssertUnwindSafe(|| tie_break(current, incoming)))
                    .map_err(CallbackFailure::from_panic)?;

                if chosen == incoming {
                    Ok(WriteDecision::Write)
                } else {
                    Ok(WriteDecision::Keep)
                }
            }
        }
    }
}

impl fmt::Debug for AttributionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributionStrategy::FirstTouch => f.write_str("FirstTouch"),
            AttributionStrategy::LastTouch => f.write_str("LastTouch"),
            AttributionStrategy::Dynamic(_) => f.debug_tuple("Dynamic").field(&"<fn>").finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefer_google() -> AttributionStrategy {
        AttributionStrategy::dynamic(|current, incoming| {
            if incoming.contains("google") {
                incoming.to_string()
            } else {
                current.to_string()
            }
        })
    }

    #[test]
    fn test_first_touch() {
        let strategy = AttributionStrategy::FirstTouch;

        assert_eq!(strategy.decide(None, "a").unwrap(), WriteDecision::Write);
        assert_eq!(strategy.decide(Some("a"), "b").unwrap(), WriteDecision::Keep);
        // An empty stored string is still a prior value
        assert_eq!(strategy.decide(Some(""), "b").unwrap(), WriteDecision::Keep);
    }

    #[test]
    fn test_last_touch() {
        let strategy = AttributionStrategy::LastTouch;

        assert_eq!(strategy.decide(None, "a").unwrap(), WriteDecision::Write);
        assert_eq!(strategy.decide(Some("a"), "b").unwrap(), WriteDecision::Write);
        assert_eq!(strategy.decide(Some("a"), "a").unwrap(), WriteDecision::Write);
    }

    #[test]
    fn test_dynamic_consults_callback() {
        let strategy = prefer_google();

        assert!(strategy.decide(None, "google").unwrap().is_write());
        assert!(strategy.decide(Some("facebook"), "google-ads").unwrap().is_write());
        assert!(strategy.decide(Some("google-ads"), "bing").unwrap().is_keep());
    }

    #[test]
    fn test_dynamic_receives_empty_string_when_absent() {
        let strategy = AttributionStrategy::dynamic(|current, incoming| {
            assert_eq!(current, "");
            incoming.to_string()
        });

        assert!(strategy.decide(None, "x").unwrap().is_write());
    }

    #[test]
    fn test_dynamic_transformed_value_is_not_written() {
        let strategy =
            AttributionStrategy::dynamic(|_current, incoming| incoming.to_uppercase());

        assert!(strategy.decide(Some("a"), "b").unwrap().is_keep());
    }

    #[test]
    fn test_dynamic_panic_becomes_failure() {
        let strategy = AttributionStrategy::dynamic(|_, _| panic!("boom"));

        let failure = strategy.decide(Some("a"), "b").unwrap_err();
        assert_eq!(failure.message, "boom");
    }

    #[test]
    fn test_dynamic_formatted_panic_message() {
        let strategy = AttributionStrategy::dynamic(|_, incoming| panic!("bad value {incoming}"));

        let failure = strategy.decide(None, "x").unwrap_err();
        assert_eq!(failure.message, "bad value x");
    }

    #[test]
    fn test_default_is_last_touch() {
        assert_eq!(AttributionStrategy::default().name(), "last_touch");
    }

    #[test]
    fn test_debug_hides_callback() {
        assert_eq!(format!("{:?}", prefer_google()), "Dynamic(\"<fn>\")");
    }
}
