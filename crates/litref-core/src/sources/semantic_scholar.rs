use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use super::{AbstractProvider, AbstractSource, SourceError};
use crate::AbstractQuery;
use crate::backoff::{ExponentialBackoff, retry_with_backoff};
use crate::rate_limit::RateLimiter;

const GRAPH_API: &str = "https://api.semanticscholar.org/graph/v1";

/// Semantic Scholar Graph API: richest single-paper lookup, keyed by S2
/// paper ID.
pub struct SemanticScholar {
    api_key: Option<String>,
    limiter: RateLimiter,
    backoff: ExponentialBackoff,
}

impl SemanticScholar {
    pub fn new(api_key: Option<String>, limiter: RateLimiter, backoff: ExponentialBackoff) -> Self {
        Self {
            api_key,
            limiter,
            backoff,
        }
    }

    async fn abstract_by_id(
        &self,
        s2_id: &str,
        client: &reqwest::Client,
        timeout: Duration,
    ) -> Result<Option<String>, SourceError> {
        let url = format!("{GRAPH_API}/paper/{s2_id}");
        let url = url.as_str();
        let limiter = &self.limiter;
        let api_key = self.api_key.as_deref();

        retry_with_backoff(
            &self.backoff,
            SourceError::retry_decision,
            move || async move {
                limiter.wait().await;
                let mut request = client
                    .get(url)
                    .query(&[("fields", "abstract")])
                    .timeout(timeout);
                if let Some(key) = api_key {
                    request = request.header("x-api-key", key);
                }
                let response = request.send().await.map_err(SourceError::from)?;
                limiter.record().await;

                match response.status().as_u16() {
                    200 => {
                        let data: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| SourceError::Parse(e.to_string()))?;
                        Ok(data["abstract"]
                            .as_str()
                            .map(str::trim)
                            .filter(|text| !text.is_empty())
                            .map(String::from))
                    }
                    404 => Ok(None),
                    429 => Err(SourceError::RateLimited),
                    status => Err(SourceError::Status(status)),
                }
            },
        )
        .await
    }
}

impl AbstractProvider for SemanticScholar {
    fn source(&self) -> AbstractSource {
        AbstractSource::SemanticScholar
    }

    fn applicable(&self, query: &AbstractQuery) -> bool {
        query.s2_id.is_some()
    }

    fn fetch<'a>(
        &'a self,
        query: &'a AbstractQuery,
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>, SourceError>> + Send + 'a>> {
        Box::pin(async move {
            let Some(ref s2_id) = query.s2_id else {
                return Ok(None);
            };
            self.abstract_by_id(s2_id, client, timeout).await
        })
    }
}
