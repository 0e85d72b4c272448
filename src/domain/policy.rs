//! Attribution policy: strategy plus the default lifetime and scope of writes.
//!
//! A policy is replaced wholesale; fields that a caller does not set fall
//! back to the defaults below, never to the previously active policy.

use crate::domain::entry::{is_valid_scope_value, SameSite, WriteOptions, MAX_TTL_DAYS};
use crate::domain::strategy::{AttributionStrategy, TieBreakFn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default lifetime of a stored parameter.
pub const DEFAULT_TTL_DAYS: u32 = 30;

/// Default path scope.
pub const DEFAULT_PATH: &str = "/";

/// Error returned when a policy is invalid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    /// Lifetime must be at least one day
    #[error("ttl_days must be greater than 0")]
    ZeroTtl,
    /// Lifetime is capped at [`MAX_TTL_DAYS`]
    #[error("ttl_days must be at most {max}, got {ttl_days}")]
    TtlTooLong { ttl_days: u32, max: u32 },
    /// Path scope must be absolute
    #[error("path must start with '/', got {0:?}")]
    RelativePath(String),
    /// Scope attribute contains `;`, whitespace or control characters
    #[error("{attribute} contains characters not allowed in a cookie attribute: {value:?}")]
    InvalidScope {
        attribute: &'static str,
        value: String,
    },
}

/// The active attribution policy of an engine.
///
/// # Example
/// ```
/// use utm_attribution::{AttributionPolicy, AttributionStrategy, SameSite};
///
/// let policy = AttributionPolicy::new(AttributionStrategy::FirstTouch)
///     .with_ttl_days(90)
///     .with_domain("example.com")
///     .with_same_site(SameSite::Strict);
///
/// assert!(policy.validate().is_ok());
/// assert_eq!(policy.path, "/");
/// ```
#[derive(Debug, Clone)]
pub struct AttributionPolicy {
    /// How prior and incoming values are arbitrated
    pub strategy: AttributionStrategy,
    /// Default lifetime of writes in days
    pub ttl_days: u32,
    /// Domain scope of writes
    pub domain: Option<String>,
    /// Path scope of writes
    pub path: String,
    /// Secure-only flag of writes
    pub secure: bool,
    /// Cross-site send policy of writes
    pub same_site: SameSite,
}

impl Default for AttributionPolicy {
    fn default() -> Self {
        Self {
            strategy: AttributionStrategy::LastTouch,
            ttl_days: DEFAULT_TTL_DAYS,
            domain: None,
            path: DEFAULT_PATH.to_string(),
            secure: true,
            same_site: SameSite::Lax,
        }
    }
}

impl AttributionPolicy {
    /// Create a policy with the given strategy and default scope.
    pub fn new(strategy: AttributionStrategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    /// Set the default lifetime.
    pub fn with_ttl_days(mut self, ttl_days: u32) -> Self {
        self.ttl_days = ttl_days;
        self
    }

    /// Set the domain scope.
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Set the path scope.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Set the secure-only flag.
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Set the cross-site send policy.
    pub fn with_same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = same_site;
        self
    }

    /// Check the policy's invariants.
    ///
    /// # Errors
    /// Returns `PolicyError` if the lifetime is zero or above [`MAX_TTL_DAYS`],
    /// if the path is relative, or if the path or domain could not be written
    /// verbatim into a cookie line.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.ttl_days == 0 {
            return Err(PolicyError::ZeroTtl);
        }
        if self.ttl_days > MAX_TTL_DAYS {
            return Err(PolicyError::TtlTooLong {
                ttl_days: self.ttl_days,
                max: MAX_TTL_DAYS,
            });
        }
        if !self.path.starts_with('/') {
            return Err(PolicyError::RelativePath(self.path.clone()));
        }
        if !is_valid_scope_value(&self.path) {
            return Err(PolicyError::InvalidScope {
                attribute: "path",
                value: self.path.clone(),
            });
        }
        if let Some(domain) = self.domain.as_deref().filter(|d| !is_valid_scope_value(d)) {
            return Err(PolicyError::InvalidScope {
                attribute: "domain",
                value: domain.to_string(),
            });
        }
        Ok(())
    }

    /// Options for a write under this policy.
    pub fn write_options(&self, ttl_days_override: Option<u32>) -> WriteOptions {
        WriteOptions {
            ttl_days: ttl_days_override.unwrap_or(self.ttl_days),
            domain: self.domain.clone(),
            path: self.path.clone(),
            secure: self.secure,
            same_site: self.same_site,
        }
    }
}

/// Strategy names accepted in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// See [`AttributionStrategy::FirstTouch`]
    FirstTouch,
    /// See [`AttributionStrategy::LastTouch`]
    #[default]
    LastTouch,
    /// See [`AttributionStrategy::Dynamic`]
    Dynamic,
}

/// Serializable form of a policy, for loading from configuration.
///
/// The tie-break callback cannot be expressed in data, so it is supplied
/// separately to [`PolicyConfig::into_policy`].
///
/// ```
/// use utm_attribution::PolicyConfig;
///
/// let config: PolicyConfig = serde_json::from_str(
///     r#"{ "strategy": "first_touch", "ttl_days": 7, "same_site": "strict" }"#,
/// ).unwrap();
/// let policy = config.into_policy(None).unwrap();
///
/// assert_eq!(policy.strategy.name(), "first_touch");
/// assert_eq!(policy.ttl_days, 7);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicyConfig {
    /// Strategy name
    pub strategy: StrategyKind,
    /// Default lifetime in days
    pub ttl_days: u32,
    /// Domain scope
    pub domain: Option<String>,
    /// Path scope
    pub path: String,
    /// Secure-only flag
    pub secure: bool,
    /// Cross-site send policy
    pub same_site: SameSite,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::LastTouch,
            ttl_days: DEFAULT_TTL_DAYS,
            domain: None,
            path: DEFAULT_PATH.to_string(),
            secure: true,
            same_site: SameSite::Lax,
        }
    }
}

impl PolicyConfig {
    /// Build a validated policy.
    ///
    /// A `dynamic` strategy without a callback behaves as last-touch; the
    /// downgrade is logged. A callback given for another strategy is unused.
    ///
    /// # Errors
    /// Returns `PolicyError` if the resulting policy is invalid.
    pub fn into_policy(self, tie_break: Option<TieBreakFn>) -> Result<AttributionPolicy, PolicyError> {
        let strategy = match (self.strategy, tie_break) {
            (StrategyKind::FirstTouch, _) => AttributionStrategy::FirstTouch,
            (StrategyKind::LastTouch, _) => AttributionStrategy::LastTouch,
            (StrategyKind::Dynamic, Some(tie_break)) => AttributionStrategy::Dynamic(tie_break),
            (StrategyKind::Dynamic, None) => {
                tracing::warn!("dynamic strategy configured without a tie-break callback, using last-touch");
                AttributionStrategy::LastTouch
            }
        };

        let policy = AttributionPolicy {
            strategy,
            ttl_days: self.ttl_days,
            domain: self.domain,
            path: self.path,
            secure: self.secure,
            same_site: self.same_site,
        };
        policy.validate()?;
        Ok(policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_defaults() {
        let policy = AttributionPolicy::default();

        assert_eq!(policy.strategy.name(), "last_touch");
        assert_eq!(policy.ttl_days, 30);
        assert_eq!(policy.domain, None);
        assert_eq!(policy.path, "/");
        assert!(policy.secure);
        assert_eq!(policy.same_site, SameSite::Lax);
    }

    #[test]
    fn test_validate() {
        assert_eq!(
            AttributionPolicy::default().with_ttl_days(0).validate(),
            Err(PolicyError::ZeroTtl)
        );
        assert_eq!(
            AttributionPolicy::default().with_path("shop").validate(),
            Err(PolicyError::RelativePath("shop".to_string()))
        );
        assert!(AttributionPolicy::default().with_ttl_days(1).validate().is_ok());
    }

    #[test]
    fn test_validate_ttl_upper_bound() {
        assert!(AttributionPolicy::default()
            .with_ttl_days(MAX_TTL_DAYS)
            .validate()
            .is_ok());
        assert_eq!(
            AttributionPolicy::default().with_ttl_days(u32::MAX).validate(),
            Err(PolicyError::TtlTooLong {
                ttl_days: u32::MAX,
                max: MAX_TTL_DAYS,
            })
        );
    }

    #[test]
    fn test_validate_rejects_attribute_injection() {
        assert_eq!(
            AttributionPolicy::default()
                .with_path("/shop; domain=evil.test")
                .validate(),
            Err(PolicyError::InvalidScope {
                attribute: "path",
                value: "/shop; domain=evil.test".to_string(),
            })
        );
        assert_eq!(
            AttributionPolicy::default()
                .with_domain("example.com; secure")
                .validate(),
            Err(PolicyError::InvalidScope {
                attribute: "domain",
                value: "example.com; secure".to_string(),
            })
        );
        assert!(matches!(
            AttributionPolicy::default().with_domain("exa mple.com").validate(),
            Err(PolicyError::InvalidScope { attribute: "domain", .. })
        ));
        assert!(matches!(
            AttributionPolicy::default().with_path("/a\r\nb").validate(),
            Err(PolicyError::InvalidScope { attribute: "path", .. })
        ));
        assert!(AttributionPolicy::default()
            .with_domain(".example.com")
            .with_path("/shop")
            .validate()
            .is_ok());
    }

    #[test]
    fn test_write_options_override() {
        let policy = AttributionPolicy::default()
            .with_domain("example.com")
            .with_secure(false);

        let options = policy.write_options(None);
        assert_eq!(options.ttl_days, 30);
        assert_eq!(options.domain.as_deref(), Some("example.com"));
        assert!(!options.secure);

        assert_eq!(policy.write_options(Some(3)).ttl_days, 3);
    }

    #[test]
    fn test_config_defaults_from_empty_document() {
        let config: PolicyConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, PolicyConfig::default());
    }

    #[test]
    fn test_config_rejects_unknown_strategy() {
        let result = serde_json::from_str::<PolicyConfig>(r#"{ "strategy": "middle_touch" }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_config_rejects_unknown_fields() {
        let result = serde_json::from_str::<PolicyConfig>(r#"{ "ttl": 3 }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_config_dynamic_with_callback() {
        let config = PolicyConfig {
            strategy: StrategyKind::Dynamic,
            ..PolicyConfig::default()
        };
        let tie_break: TieBreakFn = Arc::new(|_: &str, incoming: &str| incoming.to_string());
        let policy = config.into_policy(Some(tie_break)).unwrap();

        assert_eq!(policy.strategy.name(), "dynamic");
    }

    #[test]
    fn test_config_dynamic_without_callback_is_last_touch() {
        let config = PolicyConfig {
            strategy: StrategyKind::Dynamic,
            ..PolicyConfig::default()
        };
        let policy = config.into_policy(None).unwrap();

        assert_eq!(policy.strategy.name(), "last_touch");
    }

    #[test]
    fn test_config_zero_ttl_rejected() {
        let config = PolicyConfig {
            ttl_days: 0,
            ..PolicyConfig::default()
        };
        assert_eq!(config.into_policy(None).unwrap_err(), PolicyError::ZeroTtl);
    }
}
