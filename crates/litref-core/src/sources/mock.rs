//! Mock abstract provider for chain tests.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{AbstractProvider, AbstractSource, SourceError};
use crate::AbstractQuery;

/// A configurable mock response for [`MockProvider`].
#[derive(Clone, Debug)]
pub enum MockResponse {
    /// Simulate a found abstract.
    Abstract(String),
    /// Simulate "this source has no abstract for the paper".
    NoAbstract,
    /// Simulate a rate limit that survived the retry budget.
    RateLimited,
    /// Simulate a transport failure that survived the retry budget.
    Network(String),
    /// Simulate an unexpected HTTP status.
    Status(u16),
}

/// A hand-rolled mock implementing [`AbstractProvider`] for tests.
///
/// Supports a fixed response or a per-call sequence (last response repeats
/// when exhausted), an applicability override, and call counting.
pub struct MockProvider {
    source: AbstractSource,
    applicable: bool,
    /// Each call pops the next response; empty means single-response mode.
    responses: Mutex<Vec<MockResponse>>,
    fallback: MockResponse,
    call_count: AtomicUsize,
}

impl MockProvider {
    /// Create a mock that always returns `response`.
    pub fn new(source: AbstractSource, response: MockResponse) -> Self {
        Self {
            source,
            applicable: true,
            responses: Mutex::new(Vec::new()),
            fallback: response,
            call_count: AtomicUsize::new(0),
        }
    }

    /// Create a mock that returns responses in order, repeating the last.
    pub fn with_sequence(source: AbstractSource, mut responses: Vec<MockResponse>) -> Self {
        assert!(
            !responses.is_empty(),
            "sequence must have at least one response"
        );
        // Reverse so pop() walks the sequence front to back.
        responses.reverse();
        let fallback = responses.first().cloned().unwrap();
        Self {
            source,
            applicable: true,
            responses: Mutex::new(responses),
            fallback,
            call_count: AtomicUsize::new(0),
        }
    }

    /// A mock whose identifiers never match; the chain must skip it.
    pub fn inapplicable(source: AbstractSource) -> Self {
        let mut mock = Self::new(source, MockResponse::NoAbstract);
        mock.applicable = false;
        mock
    }

    /// How many times `fetch()` has been called.
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    fn next_response(&self) -> MockResponse {
        let mut sequence = self.responses.lock().unwrap();
        sequence.pop().unwrap_or_else(|| self.fallback.clone())
    }
}

impl AbstractProvider for MockProvider {
    fn source(&self) -> AbstractSource {
        self.source
    }

    fn applicable(&self, _query: &AbstractQuery) -> bool {
        self.applicable
    }

    fn fetch<'a>(
        &'a self,
        _query: &'a AbstractQuery,
        _client: &'a reqwest::Client,
        _timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>, SourceError>> + Send + 'a>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        let response = self.next_response();

        Box::pin(async move {
            match response {
                MockResponse::Abstract(text) => Ok(Some(text)),
                MockResponse::NoAbstract => Ok(None),
                MockResponse::RateLimited => Err(SourceError::RateLimited),
                MockResponse::Network(msg) => Err(SourceError::Network(msg)),
                MockResponse::Status(status) => Err(SourceError::Status(status)),
            }
        })
    }
}
