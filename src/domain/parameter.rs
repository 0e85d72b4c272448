//! The fixed whitelist of recognized UTM parameters.
//!
//! Keys are accepted case-insensitively but must carry the `utm_` prefix.
//! Once recognized, a parameter is always stored and reported under its
//! canonical lower-case key (`utm_source`, `utm_medium`, ...).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Prefix every recognized key carries.
pub const UTM_PREFIX: &str = "utm_";

/// Snapshot of the stored parameters, keyed by canonical key.
pub type UtmSnapshot = BTreeMap<String, String>;

/// One of the five recognized campaign parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UtmParameter {
    /// Referrer (`utm_source`)
    Source,
    /// Marketing medium (`utm_medium`)
    Medium,
    /// Campaign name (`utm_campaign`)
    Campaign,
    /// Paid search term (`utm_term`)
    Term,
    /// Ad content variant (`utm_content`)
    Content,
}

impl UtmParameter {
    /// Every recognized parameter.
    pub const ALL: [UtmParameter; 5] = [
        UtmParameter::Source,
        UtmParameter::Medium,
        UtmParameter::Campaign,
        UtmParameter::Term,
        UtmParameter::Content,
    ];

    /// Bare name without the prefix.
    pub fn name(&self) -> &'static str {
        match self {
            UtmParameter::Source => "source",
            UtmParameter::Medium => "medium",
            UtmParameter::Campaign => "campaign",
            UtmParameter::Term => "term",
            UtmParameter::Content => "content",
        }
    }

    /// Canonical storage key.
    pub fn key(&self) -> &'static str {
        match self {
            UtmParameter::Source => "utm_source",
            UtmParameter::Medium => "utm_medium",
            UtmParameter::Campaign => "utm_campaign",
            UtmParameter::Term => "utm_term",
            UtmParameter::Content => "utm_content",
        }
    }

    /// Look up a parameter by its bare (already lower-cased) name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }

    /// Resolve a caller-supplied key.
    ///
    /// The key is lower-cased, then must start with [`UTM_PREFIX`] and name
    /// one of the whitelisted parameters once the prefix is stripped.
    ///
    /// # Example
    /// ```
    /// use utm_attribution::UtmParameter;
    ///
    /// assert_eq!(UtmParameter::parse_key("UTM_Source"), Some(UtmParameter::Source));
    /// assert_eq!(UtmParameter::parse_key("source"), None);
    /// assert_eq!(UtmParameter::parse_key("utm_id"), None);
    /// ```
    pub fn parse_key(key: &str) -> Option<Self> {
        let normalized = key.to_lowercase();
        normalized
            .strip_prefix(UTM_PREFIX)
            .and_then(Self::from_name)
    }

    /// Check whether `key` is exactly a canonical key.
    pub fn is_canonical_key(key: &str) -> bool {
        Self::ALL.iter().any(|p| p.key() == key)
    }
}

impl fmt::Display for UtmParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_canonical_keys() {
        for parameter in UtmParameter::ALL {
            assert_eq!(UtmParameter::parse_key(parameter.key()), Some(parameter));
        }
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(
            UtmParameter::parse_key("UTM_CAMPAIGN"),
            Some(UtmParameter::Campaign)
        );
        assert_eq!(UtmParameter::parse_key("Utm_Term"), Some(UtmParameter::Term));
    }

    #[test]
    fn test_parse_rejects_missing_prefix() {
        assert_eq!(UtmParameter::parse_key("source"), None);
        assert_eq!(UtmParameter::parse_key("utmsource"), None);
        assert_eq!(UtmParameter::parse_key(""), None);
    }

    #[test]
    fn test_parse_rejects_unknown_names() {
        assert_eq!(UtmParameter::parse_key("utm_id"), None);
        assert_eq!(UtmParameter::parse_key("utm_"), None);
        assert_eq!(UtmParameter::parse_key("utm_source_platform"), None);
        assert_eq!(UtmParameter::parse_key(" utm_source"), None);
    }

    #[test]
    fn test_canonical_key_is_exact() {
        assert!(UtmParameter::is_canonical_key("utm_medium"));
        assert!(!UtmParameter::is_canonical_key("UTM_MEDIUM"));
        assert!(!UtmParameter::is_canonical_key("medium"));
    }

    #[test]
    fn test_display_uses_canonical_key() {
        assert_eq!(UtmParameter::Content.to_string(), "utm_content");
    }
}
