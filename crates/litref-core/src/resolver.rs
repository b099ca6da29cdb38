//! Ordered multi-source abstract resolution.
//!
//! The chain is an explicit sequence of stages tried in order, first
//! non-empty abstract wins. New sources slot in by adding a provider to
//! the list; the control flow never changes.

use std::time::Duration;

use crate::backoff::ExponentialBackoff;
use crate::rate_limit::get_limiter;
use crate::sources::core::Core;
use crate::sources::openalex::OpenAlex;
use crate::sources::semantic_scholar::SemanticScholar;
use crate::sources::{AbstractProvider, AbstractSource, SourceError};
use crate::{AbstractQuery, AbstractResult, Error};

/// First-success-wins fallback chain over abstract providers.
pub struct AbstractChain {
    providers: Vec<Box<dyn AbstractProvider>>,
}

impl AbstractChain {
    /// The standard chain: Semantic Scholar (by S2 ID), then OpenAlex
    /// (by DOI), then CORE (by DOI or title+author).
    pub fn standard(
        s2_api_key: Option<String>,
        openalex_mailto: Option<String>,
        core_api_key: Option<String>,
        backoff: ExponentialBackoff,
    ) -> Result<Self, Error> {
        Ok(Self {
            providers: vec![
                Box::new(SemanticScholar::new(
                    s2_api_key,
                    get_limiter("semantic_scholar")?,
                    backoff.clone(),
                )),
                Box::new(OpenAlex::new(
                    openalex_mailto,
                    get_limiter("openalex")?,
                    backoff.clone(),
                )),
                Box::new(Core::new(core_api_key, get_limiter("core")?, backoff)),
            ],
        })
    }

    /// Build a chain from an explicit provider order.
    pub fn from_providers(providers: Vec<Box<dyn AbstractProvider>>) -> Self {
        Self { providers }
    }

    /// Try each applicable provider in order until one yields a non-empty
    /// abstract.
    ///
    /// A provider failure is logged and falls through to the next stage;
    /// only a failure of the *final* attempted stage, with no success
    /// anywhere, becomes the chain's error. All stages answering "nothing
    /// here" is a normal miss, not an error.
    pub async fn resolve(
        &self,
        query: &AbstractQuery,
        client: &reqwest::Client,
        timeout: Duration,
    ) -> Result<AbstractResult, Error> {
        let mut last_failure: Option<(AbstractSource, SourceError)> = None;

        for provider in &self.providers {
            if !provider.applicable(query) {
                continue;
            }
            let source = provider.source();
            tracing::info!(%source, "trying abstract source");

            match provider.fetch(query, client, timeout).await {
                Ok(Some(text)) => {
                    tracing::info!(%source, chars = text.len(), "abstract found");
                    return Ok(AbstractResult::found(text, source));
                }
                Ok(None) => {
                    tracing::info!(%source, "no abstract");
                    last_failure = None;
                }
                Err(err) => {
                    tracing::warn!(%source, error = %err, "source failed, falling through");
                    last_failure = Some((source, err));
                }
            }
        }

        match last_failure {
            Some((source, err)) => Err(err.into_error(&source.to_string())),
            None => Ok(AbstractResult::not_found()),
        }
    }
}
