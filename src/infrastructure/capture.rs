//! URL capture: feeding query-string parameters into an engine.
//!
//! This is the glue a page-load or route-change handler calls. It forwards
//! every query pair whose key carries the `utm_` prefix (in any case) to
//! [`AttributionEngine::save_all`]; whitelisting happens in the engine, so
//! prefixed but unknown keys such as `utm_id` show up as rejected.

use crate::application::engine::{AttributionEngine, BatchReport};
use crate::application::ports::KeyValueStore;
use crate::domain::parameter::UTM_PREFIX;
use thiserror::Error;
use url::Url;

/// Error returned when a URL cannot be captured.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    /// The input is not an absolute URL
    #[error("invalid URL {url:?}: {reason}")]
    InvalidUrl {
        /// The input as supplied
        url: String,
        /// Parser message
        reason: String,
    },
}

/// Extract the `utm_`-prefixed pairs of a query string, in order.
///
/// Accepts the query with or without its leading `?`. Pairs are
/// form-urldecoded (`+` is a space).
///
/// ```
/// use utm_attribution::extract_from_query;
///
/// let params = extract_from_query("?utm_source=news+letter&page=2&UTM_MEDIUM=email");
/// assert_eq!(params, vec![
///     ("utm_source".to_string(), "news letter".to_string()),
///     ("UTM_MEDIUM".to_string(), "email".to_string()),
/// ]);
/// ```
pub fn extract_from_query(query: &str) -> Vec<(String, String)> {
    let query = query.strip_prefix('?').unwrap_or(query);
    url::form_urlencoded::parse(query.as_bytes())
        .filter(|(key, _)| key.to_lowercase().starts_with(UTM_PREFIX))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect()
}

/// Extract the `utm_`-prefixed query pairs of an absolute URL.
///
/// # Errors
/// Returns `CaptureError::InvalidUrl` if `url` does not parse.
pub fn extract_utm_params(url: &str) -> Result<Vec<(String, String)>, CaptureError> {
    let parsed = Url::parse(url).map_err(|e| CaptureError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    Ok(parsed.query().map(extract_from_query).unwrap_or_default())
}

/// Capture the UTM parameters of `url` into `engine`.
///
/// # Errors
/// Returns `CaptureError::InvalidUrl` if `url` does not parse. Individual
/// parameters never cause an error; see [`BatchReport::rejected`].
pub fn capture_url<S>(
    engine: &AttributionEngine<S>,
    url: &str,
    ttl_days: Option<u32>,
) -> Result<BatchReport, CaptureError>
where
    S: KeyValueStore,
{
    let params = extract_utm_params(url)?;
    if params.is_empty() {
        tracing::debug!(url, "no utm parameters in url");
        return Ok(BatchReport::default());
    }
    Ok(engine.save_all(params, ttl_days))
}
