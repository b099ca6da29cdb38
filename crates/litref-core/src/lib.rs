use serde::Serialize;
use thiserror::Error;

pub mod backoff;
pub mod config_file;
pub mod doi;
pub mod matching;
pub mod rate_limit;
pub mod resolver;
pub mod search;
pub mod sources;
pub mod verify;

// Re-export for convenience
pub use backoff::{ExponentialBackoff, RetryDecision, retry_with_backoff};
pub use rate_limit::{RateLimiter, get_limiter};
pub use resolver::AbstractChain;
pub use sources::{AbstractProvider, AbstractSource, SourceError};
pub use verify::{VerifiedPaper, Verifier, VerifyQuery};

/// Errors surfaced to the CLI layer.
///
/// The variants map one-to-one onto exit codes: `NotFound` is a valid
/// "no such record" answer, `Config`/`UnknownApi` are caller mistakes and
/// are never retried, and the remaining variants are transport-level
/// failures reported only after the retry budget is spent.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid arguments/credentials.
    #[error("configuration error: {0}")]
    Config(String),
    /// API name not present in the rate limiter registry.
    #[error("unknown API: {0}")]
    UnknownApi(String),
    /// Semantically valid "no such record".
    #[error("not found: {0}")]
    NotFound(String),
    /// 429s persisted through the whole retry budget.
    #[error("rate limited: {0}")]
    RateLimited(String),
    /// Transport failure after retries.
    #[error("network error: {0}")]
    Network(String),
    /// Unexpected HTTP status or malformed payload.
    #[error("API error: {0}")]
    Api(String),
}

/// Identifiers naming the paper whose abstract is wanted.
///
/// Any subset may be present; chain stages that lack the identifier they
/// need are skipped.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AbstractQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s2_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i64>,
}

impl AbstractQuery {
    /// At least one identifier a chain stage could act on.
    pub fn has_identifier(&self) -> bool {
        self.doi.is_some() || self.s2_id.is_some() || self.title.is_some()
    }
}

/// Outcome of an abstract resolution attempt.
///
/// Text and source attribution are present together or not at all; a miss
/// is a normal, representable outcome rather than an error.
#[derive(Debug, Clone)]
pub struct AbstractResult {
    resolved: Option<(String, AbstractSource)>,
}

impl AbstractResult {
    pub fn found(text: String, source: AbstractSource) -> Self {
        Self {
            resolved: Some((text, source)),
        }
    }

    pub fn not_found() -> Self {
        Self { resolved: None }
    }

    pub fn is_found(&self) -> bool {
        self.resolved.is_some()
    }

    pub fn text(&self) -> Option<&str> {
        self.resolved.as_ref().map(|(text, _)| text.as_str())
    }

    pub fn source(&self) -> Option<AbstractSource> {
        self.resolved.as_ref().map(|(_, source)| *source)
    }

    pub fn into_parts(self) -> Option<(String, AbstractSource)> {
        self.resolved
    }
}
