//! Remote abstract providers and the trait the fallback chain consumes.

pub mod core;
pub mod mock;
pub mod openalex;
pub mod semantic_scholar;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::backoff::RetryDecision;
use crate::{AbstractQuery, Error};

/// Which provider produced an abstract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AbstractSource {
    #[serde(rename = "s2")]
    SemanticScholar,
    #[serde(rename = "openalex")]
    OpenAlex,
    #[serde(rename = "core")]
    Core,
}

impl std::fmt::Display for AbstractSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            AbstractSource::SemanticScholar => "s2",
            AbstractSource::OpenAlex => "openalex",
            AbstractSource::Core => "core",
        };
        f.write_str(tag)
    }
}

/// Transport/API failure from a single provider attempt.
#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    /// Server returned 429 Too Many Requests.
    #[error("rate limited (429)")]
    RateLimited,
    /// Unexpected HTTP status.
    #[error("HTTP {0}")]
    Status(u16),
    /// Connection, TLS, or timeout failure.
    #[error("network error: {0}")]
    Network(String),
    /// Body that did not decode as the expected JSON.
    #[error("malformed response: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SourceError::Parse(err.to_string())
        } else {
            SourceError::Network(err.to_string())
        }
    }
}

impl SourceError {
    /// Retry classification shared by every call site: 429 and transport
    /// failures retry, everything else fails fast.
    pub fn retry_decision(&self) -> RetryDecision {
        match self {
            SourceError::RateLimited | SourceError::Network(_) => RetryDecision::Retry,
            SourceError::Status(_) | SourceError::Parse(_) => RetryDecision::Fail,
        }
    }

    /// Lift a post-retry failure into the caller-facing taxonomy,
    /// prefixed with the source it came from.
    pub fn into_error(self, context: &str) -> Error {
        match self {
            SourceError::RateLimited => {
                Error::RateLimited(format!("{context}: rate limit persisted through retries"))
            }
            SourceError::Network(msg) => Error::Network(format!("{context}: {msg}")),
            SourceError::Status(status) => Error::Api(format!("{context}: HTTP {status}")),
            SourceError::Parse(msg) => Error::Api(format!("{context}: {msg}")),
        }
    }
}

/// A provider that may know a paper's abstract.
///
/// Implementations own their rate limiter and retry budget; `fetch`
/// returns only after both are spent or the source has answered.
pub trait AbstractProvider: Send + Sync {
    /// Source tag attached to successful resolutions.
    fn source(&self) -> AbstractSource;

    /// Whether the query carries the identifiers this provider needs.
    fn applicable(&self, query: &AbstractQuery) -> bool;

    /// Fetch the abstract, if this provider has one.
    ///
    /// `Ok(None)` means the source answered and has nothing usable,
    /// a missing paper (404) included. Errors are transport-level only.
    fn fetch<'a>(
        &'a self,
        query: &'a AbstractQuery,
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>, SourceError>> + Send + 'a>>;
}

impl<T: AbstractProvider + ?Sized> AbstractProvider for Arc<T> {
    fn source(&self) -> AbstractSource {
        (**self).source()
    }

    fn applicable(&self, query: &AbstractQuery) -> bool {
        (**self).applicable(query)
    }

    fn fetch<'a>(
        &'a self,
        query: &'a AbstractQuery,
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>, SourceError>> + Send + 'a>> {
        (**self).fetch(query, client, timeout)
    }
}
