use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde_json::{Map, Value, json};

use super::{AbstractProvider, AbstractSource, SourceError};
use crate::backoff::{ExponentialBackoff, retry_with_backoff};
use crate::doi::normalize_doi;
use crate::rate_limit::RateLimiter;
use crate::search::{SearchFailure, SearchOutcome};
use crate::{AbstractQuery, Error};

const BASE_URL: &str = "https://api.openalex.org";

/// Cursor page size cap documented by the API.
const MAX_PER_PAGE: usize = 200;

/// OpenAlex works API. Abstracts come back as an inverted positional word
/// index that has to be reassembled into linear text.
pub struct OpenAlex {
    mailto: Option<String>,
    limiter: RateLimiter,
    backoff: ExponentialBackoff,
}

/// Rebuild linear text from OpenAlex's word → positions index by sorting
/// (position, word) pairs.
pub fn reconstruct_abstract(index: &Map<String, Value>) -> Option<String> {
    let mut words: Vec<(u64, &str)> = Vec::new();
    for (word, positions) in index {
        let Some(positions) = positions.as_array() else {
            continue;
        };
        for position in positions {
            if let Some(position) = position.as_u64() {
                words.push((position, word.as_str()));
            }
        }
    }
    if words.is_empty() {
        return None;
    }
    words.sort_by_key(|(position, _)| *position);
    Some(
        words
            .iter()
            .map(|(_, word)| *word)
            .collect::<Vec<_>>()
            .join(" "),
    )
}

/// Filters for a works search.
#[derive(Debug, Clone, Default)]
pub struct WorkFilter {
    /// `YYYY` or `YYYY-YYYY` range.
    pub year: Option<String>,
    /// Only works citing this OpenAlex work ID.
    pub cites: Option<String>,
    pub oa_only: bool,
    pub min_citations: Option<u32>,
    pub work_type: Option<String>,
}

impl WorkFilter {
    fn to_param(&self) -> String {
        let mut filters = Vec::new();
        if let Some(ref year) = self.year {
            filters.push(format!("publication_year:{year}"));
        }
        if let Some(ref cites) = self.cites {
            let id = cites.trim_start_matches("https://openalex.org/");
            filters.push(format!("cites:{id}"));
        }
        if self.oa_only {
            filters.push("is_oa:true".into());
        }
        if let Some(min) = self.min_citations {
            filters.push(format!("cited_by_count:>{min}"));
        }
        if let Some(ref work_type) = self.work_type {
            filters.push(format!("type:{work_type}"));
        }
        filters.join(",")
    }
}

impl OpenAlex {
    pub fn new(mailto: Option<String>, limiter: RateLimiter, backoff: ExponentialBackoff) -> Self {
        Self {
            mailto,
            limiter,
            backoff,
        }
    }

    async fn abstract_by_doi(
        &self,
        doi: &str,
        client: &reqwest::Client,
        timeout: Duration,
    ) -> Result<Option<String>, SourceError> {
        let url = format!("{BASE_URL}/works/doi:{}", normalize_doi(doi));
        let url = url.as_str();
        let limiter = &self.limiter;
        let mailto = self.mailto.as_deref();

        retry_with_backoff(
            &self.backoff,
            SourceError::retry_decision,
            move || async move {
                limiter.wait().await;
                let mut request = client.get(url).timeout(timeout);
                if let Some(mailto) = mailto {
                    request = request.query(&[("mailto", mailto)]);
                }
                let response = request.send().await.map_err(SourceError::from)?;
                limiter.record().await;

                match response.status().as_u16() {
                    200 => {
                        let data: Value = response
                            .json()
                            .await
                            .map_err(|e| SourceError::Parse(e.to_string()))?;
                        Ok(data["abstract_inverted_index"]
                            .as_object()
                            .and_then(reconstruct_abstract)
                            .filter(|text| !text.is_empty()))
                    }
                    404 => Ok(None),
                    429 => Err(SourceError::RateLimited),
                    status => Err(SourceError::Status(status)),
                }
            },
        )
        .await
    }

    /// Look up one work by DOI or OpenAlex ID (`W…`).
    pub async fn get_work(
        &self,
        id: &str,
        client: &reqwest::Client,
        timeout: Duration,
    ) -> Result<Value, Error> {
        let url = format!("{BASE_URL}/works/{}", work_path(id));
        let url = url.as_str();
        let limiter = &self.limiter;
        let mailto = self.mailto.as_deref();

        let outcome = retry_with_backoff(
            &self.backoff,
            SourceError::retry_decision,
            move || async move {
                limiter.wait().await;
                let mut request = client.get(url).timeout(timeout);
                if let Some(mailto) = mailto {
                    request = request.query(&[("mailto", mailto)]);
                }
                let response = request.send().await.map_err(SourceError::from)?;
                limiter.record().await;

                match response.status().as_u16() {
                    200 => response
                        .json::<Value>()
                        .await
                        .map_err(|e| SourceError::Parse(e.to_string())),
                    429 => Err(SourceError::RateLimited),
                    status => Err(SourceError::Status(status)),
                }
            },
        )
        .await;

        match outcome {
            Ok(work) => Ok(format_work(&work)),
            Err(SourceError::Status(404)) => Err(Error::NotFound(format!("work not found: {id}"))),
            Err(err) => Err(err.into_error("OpenAlex")),
        }
    }

    /// Cursor-paginated works search.
    ///
    /// Transient failures mid-pagination return the pages already fetched
    /// alongside the failure; a malformed query aborts with `Config`.
    pub async fn search(
        &self,
        query: Option<&str>,
        filter: &WorkFilter,
        limit: usize,
        client: &reqwest::Client,
        timeout: Duration,
    ) -> Result<SearchOutcome, Error> {
        let mut outcome = SearchOutcome::default();
        let mut cursor = Some(String::from("*"));
        let filter_param = filter.to_param();
        let filter_param = filter_param.as_str();
        let limiter = &self.limiter;
        let mailto = self.mailto.as_deref();

        while outcome.results.len() < limit {
            let Some(current) = cursor else { break };
            let per_page = (limit - outcome.results.len()).min(MAX_PER_PAGE);
            tracing::debug!(cursor = %current, per_page, "fetching OpenAlex page");

            let page = {
                let current = current.as_str();
                retry_with_backoff(
                    &self.backoff,
                    SourceError::retry_decision,
                    move || async move {
                        limiter.wait().await;
                        let mut request = client
                            .get(format!("{BASE_URL}/works"))
                            .query(&[
                                ("per_page", per_page.to_string()),
                                ("cursor", current.to_string()),
                            ])
                            .timeout(timeout);
                        if let Some(q) = query {
                            request = request.query(&[("search", q)]);
                        }
                        if !filter_param.is_empty() {
                            request = request.query(&[("filter", filter_param)]);
                        }
                        if let Some(mailto) = mailto {
                            request = request.query(&[("mailto", mailto)]);
                        }
                        let response = request.send().await.map_err(SourceError::from)?;
                        limiter.record().await;

                        match response.status().as_u16() {
                            200 => response
                                .json::<Value>()
                                .await
                                .map_err(|e| SourceError::Parse(e.to_string())),
                            429 => Err(SourceError::RateLimited),
                            status => Err(SourceError::Status(status)),
                        }
                    },
                )
                .await
            };

            match page {
                Ok(data) => {
                    let works = data["results"].as_array().cloned().unwrap_or_default();
                    if works.is_empty() {
                        break;
                    }
                    for work in &works {
                        if outcome.results.len() >= limit {
                            break;
                        }
                        outcome.results.push(format_work(work));
                    }
                    cursor = data["meta"]["next_cursor"].as_str().map(String::from);
                }
                Err(SourceError::Status(400)) => {
                    return Err(Error::Config("invalid OpenAlex query".into()));
                }
                Err(err) => match SearchFailure::from_source(&err) {
                    Some(failure) => {
                        tracing::warn!(
                            fetched = outcome.results.len(),
                            error = %err,
                            "pagination cut short, returning partial results"
                        );
                        outcome.errors.push(failure);
                        return Ok(outcome);
                    }
                    None => return Err(err.into_error("OpenAlex")),
                },
            }
        }

        Ok(outcome)
    }
}

fn work_path(id: &str) -> String {
    let id = id.trim();
    if id.starts_with("10.") || id.starts_with("doi:") {
        format!("doi:{}", normalize_doi(id))
    } else if id.starts_with('W') || id.starts_with("https://openalex.org/") {
        id.trim_start_matches("https://openalex.org/").to_string()
    } else {
        // Assume a bare DOI in some other dress
        format!("doi:{}", normalize_doi(id))
    }
}

/// Flatten an OpenAlex work into the output shape the CLI emits.
fn format_work(work: &Value) -> Value {
    let openalex_id = work["id"]
        .as_str()
        .unwrap_or("")
        .trim_start_matches("https://openalex.org/")
        .to_string();

    let doi = work["doi"].as_str().map(normalize_doi);

    let authors: Vec<Value> = work["authorships"]
        .as_array()
        .map(|authorships| {
            authorships
                .iter()
                .filter_map(|authorship| {
                    let name = authorship["author"]["display_name"].as_str()?;
                    Some(json!({ "name": name }))
                })
                .collect()
        })
        .unwrap_or_default();

    let abstract_text = work["abstract_inverted_index"]
        .as_object()
        .and_then(reconstruct_abstract);

    let open_access = work["open_access"].as_object().map(|oa| {
        json!({
            "is_oa": oa.get("is_oa").and_then(Value::as_bool).unwrap_or(false),
            "oa_status": oa.get("oa_status").cloned().unwrap_or(Value::Null),
            "oa_url": oa.get("oa_url").cloned().unwrap_or(Value::Null),
        })
    });

    json!({
        "openalex_id": openalex_id,
        "doi": doi,
        "title": work["title"].as_str().or(work["display_name"].as_str()),
        "authors": authors,
        "publication_year": work["publication_year"],
        "publication_date": work["publication_date"],
        "abstract": abstract_text,
        "cited_by_count": work["cited_by_count"],
        "type": work["type"],
        "open_access": open_access,
        "url": if openalex_id.is_empty() {
            Value::Null
        } else {
            json!(format!("https://openalex.org/{openalex_id}"))
        },
    })
}

impl AbstractProvider for OpenAlex {
    fn source(&self) -> AbstractSource {
        AbstractSource::OpenAlex
    }

    fn applicable(&self, query: &AbstractQuery) -> bool {
        query.doi.is_some()
    }

    fn fetch<'a>(
        &'a self,
        query: &'a AbstractQuery,
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>, SourceError>> + Send + 'a>> {
        Box::pin(async move {
            let Some(ref doi) = query.doi else {
                return Ok(None);
            };
            self.abstract_by_doi(doi, client, timeout).await
        })
    }
}
