//! Stored entries and their cookie-line wire form.
//!
//! An entry is serialized as a single line:
//!
//! ```text
//! <pct name>=<pct value>; expires=<HTTP-date>; path=<path>[; domain=<d>]; samesite=<Strict|Lax|None>[; secure]
//! ```
//!
//! Names and values are percent-encoded so the `;`, `,`, `=` and whitespace
//! separators survive. The expiry has whole-second precision.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

const SECONDS_PER_DAY: u64 = 86_400;
const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";
// 9999-12-31T23:59:59Z, the last instant with a four-digit year
const MAX_HTTP_DATE_SECS: i64 = 253_402_300_799;

/// Longest accepted lifetime, one hundred years.
pub const MAX_TTL_DAYS: u32 = 36_500;

/// Cross-site send policy of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    /// Never sent on cross-site requests
    Strict,
    /// Sent on top-level navigations
    #[default]
    Lax,
    /// Always sent (requires `secure`)
    None,
}

impl SameSite {
    /// Attribute value as written on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SameSite {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(SameSite::Strict),
            "lax" => Ok(SameSite::Lax),
            "none" => Ok(SameSite::None),
            _ => Err(WireError::InvalidSameSite(s.to_string())),
        }
    }
}

/// Per-write options: lifetime plus transport scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOptions {
    /// Lifetime in days
    pub ttl_days: u32,
    /// Domain scope (host-only when `None`)
    pub domain: Option<String>,
    /// Path scope
    pub path: String,
    /// Only sent over secure transports
    pub secure: bool,
    /// Cross-site send policy
    pub same_site: SameSite,
}

impl WriteOptions {
    /// Options with the given lifetime and default scope (`/`, secure, Lax).
    pub fn with_ttl_days(ttl_days: u32) -> Self {
        Self {
            ttl_days,
            domain: None,
            path: "/".to_string(),
            secure: true,
            same_site: SameSite::Lax,
        }
    }

    /// Lifetime as a duration, capped at [`MAX_TTL_DAYS`].
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(u64::from(self.ttl_days.min(MAX_TTL_DAYS)) * SECONDS_PER_DAY)
    }
}

/// A value held by a store, with its expiry and transport options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    /// Stored text
    pub value: String,
    /// First instant at which the entry is no longer live
    pub expires_at: SystemTime,
    /// Domain scope
    pub domain: Option<String>,
    /// Path scope
    pub path: String,
    /// Secure-only flag
    pub secure: bool,
    /// Cross-site send policy
    pub same_site: SameSite,
}

/// Failure to parse a wire line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// No `name=value` pair at the start of the line
    #[error("missing name=value pair")]
    MissingPair,
    /// Name decodes to an invalid entry name
    #[error("invalid entry name: {0:?}")]
    InvalidName(String),
    /// Percent-encoding does not decode to UTF-8
    #[error("invalid percent-encoding in {0:?}")]
    InvalidEncoding(String),
    /// No `expires` attribute
    #[error("missing expires attribute")]
    MissingExpires,
    /// `expires` is not an HTTP-date
    #[error("invalid expires date: {0:?}")]
    InvalidDate(String),
    /// Unknown `samesite` value
    #[error("invalid samesite value: {0:?}")]
    InvalidSameSite(String),
}

impl StoredEntry {
    /// Create an entry written at `now` with the given options.
    pub fn new(value: impl Into<String>, options: &WriteOptions, now: SystemTime) -> Self {
        Self {
            value: value.into(),
            expires_at: now + options.ttl(),
            domain: options.domain.clone(),
            path: options.path.clone(),
            secure: options.secure,
            same_site: options.same_site,
        }
    }

    /// An entry is live strictly before its expiry instant.
    pub fn is_live(&self, now: SystemTime) -> bool {
        now < self.expires_at
    }

    /// Serialize to the cookie-line wire form under `name`.
    pub fn to_wire(&self, name: &str) -> String {
        let mut line = format!(
            "{}={}; expires={}; path={}",
            urlencoding::encode(name),
            urlencoding::encode(&self.value),
            format_http_date(self.expires_at),
            self.path,
        );
        if let Some(domain) = &self.domain {
            let _ = write!(line, "; domain={domain}");
        }
        let _ = write!(line, "; samesite={}", self.same_site);
        if self.secure {
            line.push_str("; secure");
        }
        line
    }

    /// Parse a wire line back into `(name, entry)`.
    ///
    /// Attribute names are case-insensitive and unknown attributes are
    /// ignored. A missing `path` defaults to `/`, a missing `samesite` to Lax.
    ///
    /// # Errors
    /// Returns [`WireError`] if the pair, the encoding or the expiry is malformed.
    pub fn parse_wire(line: &str) -> Result<(String, StoredEntry), WireError> {
        let mut parts = line.split(';').map(str::trim);
        let pair = parts.next().unwrap_or_default();
        let (raw_name, raw_value) = pair.split_once('=').ok_or(WireError::MissingPair)?;

        let name = decode(raw_name)?;
        if !is_valid_name(&name) {
            return Err(WireError::InvalidName(name));
        }
        let value = decode(raw_value)?;

        let mut expires_at = None;
        let mut domain = None;
        let mut path = None;
        let mut secure = false;
        let mut same_site = SameSite::default();

        for attribute in parts.filter(|a| !a.is_empty()) {
            let (attr, attr_value) = match attribute.split_once('=') {
                Some((a, v)) => (a.trim(), v.trim()),
                None => (attribute, ""),
            };
            match attr.to_ascii_lowercase().as_str() {
                "expires" => expires_at = Some(parse_http_date(attr_value)?),
                "domain" => domain = Some(attr_value.to_string()),
                "path" => path = Some(attr_value.to_string()),
                "samesite" => same_site = attr_value.parse()?,
                "secure" => secure = true,
                _ => {}
            }
        }

        let entry = StoredEntry {
            value,
            expires_at: expires_at.ok_or(WireError::MissingExpires)?,
            domain,
            path: path.unwrap_or_else(|| "/".to_string()),
            secure,
            same_site,
        };
        Ok((name, entry))
    }
}

/// Decode just the name of a wire line, if it has one.
pub fn wire_name(line: &str) -> Option<String> {
    let pair = line.split(';').next()?;
    let (raw_name, _) = pair.split_once('=')?;
    decode(raw_name.trim()).ok()
}

/// Check whether `name` may be used as an entry name.
///
/// Valid names are non-empty and contain no control characters, no
/// whitespace and none of `"`, `,`, `;`, `\` and `=`. Non-ASCII characters
/// are allowed; names are percent-encoded on the wire.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.chars().all(|c| {
            !c.is_control() && !c.is_whitespace() && !matches!(c, '"' | ',' | ';' | '\\' | '=')
        })
}

/// Check whether `value` may be written verbatim as a `domain` or `path`
/// attribute.
///
/// Scope attributes are not percent-encoded, so they must not contain `;`,
/// control characters or whitespace.
pub fn is_valid_scope_value(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c != ';' && !c.is_control() && !c.is_whitespace())
}

fn decode(raw: &str) -> Result<String, WireError> {
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .map_err(|_| WireError::InvalidEncoding(raw.to_string()))
}

/// Format a time as an HTTP-date (`Sun, 06 Nov 1994 08:49:37 GMT`).
///
/// Sub-second precision is dropped. Times outside the years 1970..=9999
/// are clamped to the nearest end of that range.
pub fn format_http_date(time: SystemTime) -> String {
    let secs = match time.duration_since(UNIX_EPOCH) {
        Ok(elapsed) => i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX),
        Err(_) => 0,
    };
    DateTime::<Utc>::from_timestamp(secs.min(MAX_HTTP_DATE_SECS), 0)
        .unwrap_or_default()
        .format(HTTP_DATE_FORMAT)
        .to_string()
}

/// Parse an HTTP-date produced by [`format_http_date`].
///
/// # Errors
/// Returns [`WireError::InvalidDate`] if `s` is not in that format.
pub fn parse_http_date(s: &str) -> Result<SystemTime, WireError> {
    NaiveDateTime::parse_from_str(s, HTTP_DATE_FORMAT)
        .map(|naive| SystemTime::from(naive.and_utc()))
        .map_err(|_| WireError::InvalidDate(s.to_string()))
}
