//! Shared types for paginated work searches.
//!
//! Pagination can die partway through (rate limit, flaky network). Pages
//! already fetched are worth returning, so a search yields results *and*
//! the failures that cut it short; the caller decides whether partial data
//! is still useful.

use serde::Serialize;
use serde_json::Value;

use crate::sources::SourceError;

/// Category of a recoverable pagination failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    RateLimit,
    NetworkError,
}

/// A failure that ended pagination early without invalidating the pages
/// already fetched.
#[derive(Debug, Clone, Serialize)]
pub struct SearchFailure {
    #[serde(rename = "type")]
    pub kind: FailureKind,
    pub message: String,
    pub recoverable: bool,
}

impl SearchFailure {
    pub fn rate_limit() -> Self {
        Self {
            kind: FailureKind::RateLimit,
            message: "rate limit exceeded during pagination".into(),
            recoverable: true,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::NetworkError,
            message: message.into(),
            recoverable: true,
        }
    }

    /// Classify a post-retry source failure as a partial-result failure,
    /// or `None` if it should abort the whole search instead.
    pub fn from_source(err: &SourceError) -> Option<Self> {
        match err {
            SourceError::RateLimited => Some(Self::rate_limit()),
            SourceError::Network(msg) => Some(Self::network(msg.clone())),
            _ => None,
        }
    }
}

/// Results of a paginated search, possibly cut short.
#[derive(Debug, Default)]
pub struct SearchOutcome {
    pub results: Vec<Value>,
    pub errors: Vec<SearchFailure>,
}

impl SearchOutcome {
    /// Some pages failed but earlier ones were kept.
    pub fn is_partial(&self) -> bool {
        !self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_kinds_serialize_like_the_wire_format() {
        let failure = SearchFailure::rate_limit();
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["type"], "rate_limit");
        assert_eq!(json["recoverable"], true);

        let failure = SearchFailure::network("connection reset");
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["type"], "network_error");
        assert_eq!(json["message"], "connection reset");
    }

    #[test]
    fn only_transient_failures_become_partial() {
        assert!(SearchFailure::from_source(&SourceError::RateLimited).is_some());
        assert!(SearchFailure::from_source(&SourceError::Network("x".into())).is_some());
        assert!(SearchFailure::from_source(&SourceError::Status(400)).is_none());
        assert!(SearchFailure::from_source(&SourceError::Parse("x".into())).is_none());
    }

    #[test]
    fn outcome_partial_flag_tracks_errors() {
        let mut outcome = SearchOutcome::default();
        assert!(!outcome.is_partial());
        outcome.errors.push(SearchFailure::rate_limit());
        assert!(outcome.is_partial());
    }
}
