use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde_json::{Value, json};

use super::{AbstractProvider, AbstractSource, SourceError};
use crate::backoff::{ExponentialBackoff, retry_with_backoff};
use crate::doi::normalize_doi;
use crate::matching::{titles_match, titles_prefix_overlap};
use crate::rate_limit::RateLimiter;
use crate::search::{SearchFailure, SearchOutcome};
use crate::{AbstractQuery, Error};

const BASE_URL: &str = "https://api.core.ac.uk/v3";

/// Offset page size cap documented by the API.
const MAX_PER_PAGE: usize = 100;

/// Repository records often carry a sentence fragment or the title itself
/// in the abstract field; anything this short is noise.
const MIN_ABSTRACT_LEN: usize = 50;

/// CORE aggregator: open-access repository metadata searched by DOI or by
/// title and author.
pub struct Core {
    api_key: Option<String>,
    limiter: RateLimiter,
    backoff: ExponentialBackoff,
}

impl Core {
    pub fn new(api_key: Option<String>, limiter: RateLimiter, backoff: ExponentialBackoff) -> Self {
        Self {
            api_key,
            limiter,
            backoff,
        }
    }

    /// One search-works page, shared by the abstract lookup and the
    /// paginated search.
    async fn search_page(
        &self,
        query: &str,
        page_limit: usize,
        offset: usize,
        client: &reqwest::Client,
        timeout: Duration,
    ) -> Result<Value, SourceError> {
        let limiter = &self.limiter;
        let api_key = self.api_key.as_deref();

        retry_with_backoff(
            &self.backoff,
            SourceError::retry_decision,
            move || async move {
                limiter.wait().await;
                let mut request = client
                    .get(format!("{BASE_URL}/search/works"))
                    .query(&[("q", query)])
                    .query(&[("limit", page_limit.to_string()), ("offset", offset.to_string())])
                    .timeout(timeout);
                if let Some(key) = api_key {
                    request = request.bearer_auth(key);
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
    }

    async fn lookup_abstract(
        &self,
        query: &AbstractQuery,
        client: &reqwest::Client,
        timeout: Duration,
    ) -> Result<Option<String>, SourceError> {
        // DOI is the precise key; title+author search is the fallback and
        // needs a title-overlap guard against wrong-paper hits.
        let (core_query, title_guard) = match (&query.doi, &query.title) {
            (Some(doi), _) => (format!("doi:\"{}\"", normalize_doi(doi)), None),
            (None, Some(title)) => {
                let mut parts = vec![format!("title:\"{title}\"")];
                if let Some(ref author) = query.author {
                    parts.push(format!("authors:\"{author}\""));
                }
                (parts.join(" AND "), Some(title.as_str()))
            }
            (None, None) => return Ok(None),
        };

        let data = self
            .search_page(&core_query, 5, 0, client, timeout)
            .await?;
        let works = data["results"].as_array().cloned().unwrap_or_default();

        for work in &works {
            let Some(abstract_text) = work["abstract"].as_str() else {
                continue;
            };
            if abstract_text.len() <= MIN_ABSTRACT_LEN {
                continue;
            }
            if let Some(wanted_title) = title_guard {
                let found_title = work["title"].as_str().unwrap_or("");
                if !titles_match(wanted_title, found_title)
                    && !titles_prefix_overlap(wanted_title, found_title)
                {
                    continue;
                }
            }
            return Ok(Some(abstract_text.to_string()));
        }

        Ok(None)
    }

    /// Offset-paginated works search. Year constraints fold into the query
    /// string; transient mid-pagination failures return partial results.
    pub async fn search(
        &self,
        query: &str,
        year: Option<&str>,
        limit: usize,
        client: &reqwest::Client,
        timeout: Duration,
    ) -> Result<SearchOutcome, Error> {
        let core_query = match year {
            Some(range) if range.contains('-') => {
                let (start, end) = range.split_once('-').unwrap_or((range, range));
                format!("{query} AND yearPublished>={start} AND yearPublished<={end}")
            }
            Some(year) => format!("{query} AND yearPublished:{year}"),
            None => query.to_string(),
        };

        let mut outcome = SearchOutcome::default();
        let mut offset = 0;
        let page_limit = limit.min(MAX_PER_PAGE);

        while outcome.results.len() < limit {
            tracing::debug!(offset, page_limit, "fetching CORE page");
            match self
                .search_page(&core_query, page_limit, offset, client, timeout)
                .await
            {
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
                    if works.len() < page_limit {
                        break;
                    }
                    offset += works.len();
                }
                Err(SourceError::Status(400)) => {
                    return Err(Error::Config(format!("invalid CORE query: {core_query}")));
                }
                Err(SourceError::Status(401)) => {
                    return Err(Error::Config("invalid or missing CORE API key".into()));
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
                    None => return Err(err.into_error("CORE")),
                },
            }
        }

        Ok(outcome)
    }
}

/// Flatten a CORE work into the output shape the CLI emits.
fn format_work(work: &Value) -> Value {
    let core_id = match &work["id"] {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        _ => String::new(),
    };

    let authors: Vec<Value> = work["authors"]
        .as_array()
        .map(|authors| {
            authors
                .iter()
                .filter_map(|author| {
                    let name = author["name"].as_str().or_else(|| author.as_str())?;
                    Some(json!({ "name": name }))
                })
                .collect()
        })
        .unwrap_or_default();

    let year = work["yearPublished"].as_i64().or_else(|| {
        work["publishedDate"]
            .as_str()
            .and_then(|date| date.get(..4))
            .and_then(|prefix| prefix.parse().ok())
    });

    let language = work["language"]["code"]
        .as_str()
        .or_else(|| work["language"].as_str());

    json!({
        "core_id": core_id,
        "doi": work["doi"].as_str().map(normalize_doi),
        "title": work["title"],
        "authors": authors,
        "year": year,
        "abstract": work["abstract"],
        "publisher": work["publisher"],
        "journal": work["journals"][0]["title"],
        "download_url": work["downloadUrl"],
        "document_type": work["documentType"],
        "language": language,
    })
}

impl AbstractProvider for Core {
    fn source(&self) -> AbstractSource {
        AbstractSource::Core
    }

    fn applicable(&self, query: &AbstractQuery) -> bool {
        query.doi.is_some() || query.title.is_some()
    }

    fn fetch<'a>(
        &'a self,
        query: &'a AbstractQuery,
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>, SourceError>> + Send + 'a>> {
        Box::pin(self.lookup_abstract(query, client, timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_numeric_id_and_nested_fields() {
        let work = json!({
            "id": 144_225_938,
            "doi": "https://doi.org/10.1/x",
            "title": "Freedom of the Will",
            "authors": [ { "name": "Frankfurt, Harry" } ],
            "yearPublished": 1971,
            "abstract": "long enough text",
            "journals": [ { "title": "The Journal of Philosophy" } ],
            "language": { "code": "en" }
        });

        let formatted = format_work(&work);
        assert_eq!(formatted["core_id"], "144225938");
        assert_eq!(formatted["doi"], "10.1/x");
        assert_eq!(formatted["authors"][0]["name"], "Frankfurt, Harry");
        assert_eq!(formatted["year"], 1971);
        assert_eq!(formatted["journal"], "The Journal of Philosophy");
        assert_eq!(formatted["language"], "en");
    }

    #[test]
    fn year_falls_back_to_published_date() {
        let work = json!({ "publishedDate": "1971-01-14" });
        assert_eq!(format_work(&work)["year"], 1971);
    }

    #[test]
    fn plain_string_authors_are_accepted() {
        let work = json!({ "authors": ["Harry Frankfurt"] });
        assert_eq!(format_work(&work)["authors"][0]["name"], "Harry Frankfurt");
    }

    #[test]
    fn missing_fields_stay_null() {
        let formatted = format_work(&json!({}));
        assert_eq!(formatted["doi"], Value::Null);
        assert_eq!(formatted["year"], Value::Null);
        assert_eq!(formatted["core_id"], "");
    }
}
