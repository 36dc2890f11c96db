//! Rate limit key extraction.
//!
//! An [`Extractor`] turns request metadata into the key a client is counted
//! under. Extractors only see headers and never the body, so extraction has no
//! side effects and may run any number of times per request.

use axum::http::HeaderMap;
use thiserror::Error;

/// Separator placed between header values in a composite key.
pub const KEY_SEPARATOR: &str = "-";

/// Errors raised while deriving a rate limit key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    /// A configured header was absent or blank.
    #[error("the header {header} must have a value set")]
    MissingHeader { header: String },
}

/// Derives a rate limit key from a request.
pub trait Extractor: Send + Sync {
    /// Extract the key for this request.
    fn extract(&self, headers: &HeaderMap) -> Result<String, ExtractError>;
}

/// Joins the values of a fixed list of headers into a key.
///
/// Use headers that are guaranteed to be unique per client, such as
/// `Authorization`.
#[derive(Debug, Clone)]
pub struct HeaderExtractor {
    headers: Vec<String>,
}

impl HeaderExtractor {
    /// Create an extractor over `headers`, joined in the given order.
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
        }
    }
}

impl Extractor for HeaderExtractor {
    fn extract(&self, headers: &HeaderMap) -> Result<String, ExtractError> {
        let mut values = Vec::with_capacity(self.headers.len());

        for name in &self.headers {
            let value = headers
                .get(name.as_str())
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ExtractError::MissingHeader {
                    header: name.clone(),
                })?;
            values.push(value);
        }

        Ok(values.join(KEY_SEPARATOR))
    }
}
