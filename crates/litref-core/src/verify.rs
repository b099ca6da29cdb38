//! Paper verification against CrossRef.
//!
//! Two paths: direct DOI lookup (DOIs are unambiguous, so a 404 is a
//! definitive miss) and relevance-ranked bibliographic search, where only
//! the top candidate is considered and every acceptance check failure is
//! a diagnosed `NotFound` rather than a silent low-confidence match.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::Error;
use crate::backoff::{ExponentialBackoff, retry_with_backoff};
use crate::doi::normalize_doi;
use crate::matching::title_word_overlap;
use crate::rate_limit::{RateLimiter, get_limiter};
use crate::sources::SourceError;

const WORKS_URL: &str = "https://api.crossref.org/works";

/// Relevance-score floor for accepting the top search hit. An author hint
/// corroborates modest title scores, so the bar is lower with one.
const MIN_SCORE_WITH_AUTHOR: f64 = 30.0;
const MIN_SCORE_TITLE_ONLY: f64 = 50.0;

/// Content-word overlap floor for the expected-title cross-check on DOI
/// lookups.
const MIN_TITLE_OVERLAP: f64 = 0.5;

/// Candidate years within this distance of the queried year pass; print
/// and online-first editions routinely differ by one.
const YEAR_TOLERANCE: i64 = 1;

/// Date fields checked for a publication year, in preference order.
const DATE_FIELDS: &[&str] = &["published", "published-print", "published-online", "created"];

/// How the record was verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyMethod {
    DoiLookup,
    BibliographicSearch,
}

/// Bibliography entry kind suggested for a CrossRef work type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    Article,
    Book,
    InCollection,
    InProceedings,
    PhdThesis,
    TechReport,
    Misc,
}

/// Map CrossRef's work-type taxonomy onto entry kinds. Anything unmapped
/// is `misc` rather than an error.
fn entry_type_for(crossref_type: &str) -> EntryType {
    match crossref_type {
        "journal-article" => EntryType::Article,
        "book-chapter" | "book-section" => EntryType::InCollection,
        "book" | "monograph" | "edited-book" => EntryType::Book,
        "proceedings-article" => EntryType::InProceedings,
        "dissertation" => EntryType::PhdThesis,
        "report" => EntryType::TechReport,
        // posted-content (preprints), reference-entry, and whatever
        // CrossRef adds next
        _ => EntryType::Misc,
    }
}

/// A personal or organization name split CrossRef-style.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Name {
    pub family: String,
    pub given: String,
}

/// Verified bibliographic record, ready to merge into a bibliography.
#[derive(Debug, Clone, Serialize)]
pub struct VerifiedPaper {
    pub verified: bool,
    pub doi: String,
    pub title: String,
    pub authors: Vec<Name>,
    pub editors: Vec<Name>,
    pub year: Option<i64>,
    pub container_title: String,
    pub volume: String,
    pub issue: String,
    pub page: String,
    pub publisher: String,
    #[serde(rename = "type")]
    pub work_type: String,
    pub suggested_bibtex_type: EntryType,
    pub method: VerifyMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    pub url: Option<String>,
}

/// What to verify: a DOI, or a title with optional author/year hints.
#[derive(Debug, Clone, Default)]
pub struct VerifyQuery {
    pub doi: Option<String>,
    pub title: Option<String>,
    /// Author family name; raises search confidence.
    pub author: Option<String>,
    pub year: Option<i64>,
    /// With a DOI and a title, also require the fetched record's title to
    /// overlap the expected one.
    pub check_title: bool,
}

/// CrossRef client for existence/metadata verification.
pub struct Verifier {
    mailto: Option<String>,
    limiter: RateLimiter,
    backoff: ExponentialBackoff,
}

impl Verifier {
    pub fn new(mailto: Option<String>, backoff: ExponentialBackoff) -> Result<Self, Error> {
        Ok(Self {
            mailto,
            limiter: get_limiter("crossref")?,
            backoff,
        })
    }

    pub async fn verify(
        &self,
        query: &VerifyQuery,
        client: &reqwest::Client,
        timeout: Duration,
    ) -> Result<VerifiedPaper, Error> {
        if let Some(ref doi) = query.doi {
            let doi = normalize_doi(doi);
            let paper = self.verify_by_doi(&doi, client, timeout).await?;

            if query.check_title
                && let Some(ref expected) = query.title
            {
                let overlap = title_word_overlap(expected, &paper.title);
                if overlap < MIN_TITLE_OVERLAP {
                    return Err(Error::NotFound(format!(
                        "DOI found but title mismatch (overlap: {:.0}%)",
                        overlap * 100.0
                    )));
                }
            }
            Ok(paper)
        } else if let Some(ref title) = query.title {
            self.search_by_metadata(title, query.author.as_deref(), query.year, client, timeout)
                .await
        } else {
            Err(Error::Config("must provide a DOI or a title".into()))
        }
    }

    async fn verify_by_doi(
        &self,
        doi: &str,
        client: &reqwest::Client,
        timeout: Duration,
    ) -> Result<VerifiedPaper, Error> {
        tracing::info!(doi, "verifying DOI against CrossRef");
        let url = format!("{WORKS_URL}/{doi}");
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
            Ok(data) => {
                let paper = format_result(&data["message"], VerifyMethod::DoiLookup, None);
                tracing::info!(title = %paper.title, "DOI verified");
                Ok(paper)
            }
            Err(SourceError::Status(404)) => {
                Err(Error::NotFound(format!("DOI {doi} not found in CrossRef")))
            }
            Err(err) => Err(err.into_error("CrossRef")),
        }
    }

    async fn search_by_metadata(
        &self,
        title: &str,
        author: Option<&str>,
        year: Option<i64>,
        client: &reqwest::Client,
        timeout: Duration,
    ) -> Result<VerifiedPaper, Error> {
        tracing::info!(title, author, year, "searching CrossRef");
        let limiter = &self.limiter;
        let mailto = self.mailto.as_deref();
        let year_filter =
            year.map(|y| format!("from-pub-date:{},until-pub-date:{}", y - 1, y + 1));
        let year_filter = year_filter.as_deref();

        let outcome = retry_with_backoff(
            &self.backoff,
            SourceError::retry_decision,
            move || async move {
                limiter.wait().await;
                let mut request = client
                    .get(WORKS_URL)
                    .query(&[
                        ("query.bibliographic", title),
                        ("rows", "5"),
                        ("sort", "score"),
                        ("order", "desc"),
                        (
                            "select",
                            "DOI,title,author,editor,published,container-title,volume,issue,page,publisher,type,score",
                        ),
                    ])
                    .timeout(timeout);
                if let Some(author) = author {
                    request = request.query(&[("query.author", author)]);
                }
                if let Some(filter) = year_filter {
                    request = request.query(&[("filter", filter)]);
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
        .await;

        let data = outcome.map_err(|err| err.into_error("CrossRef"))?;
        let items = data["message"]["items"].as_array().cloned().unwrap_or_default();
        let Some(top) = items.first() else {
            return Err(Error::NotFound("no matching papers found".into()));
        };

        let score = accept_top_candidate(top, author, year)?;
        let paper = format_result(top, VerifyMethod::BibliographicSearch, Some(score));
        tracing::info!(title = %paper.title, score, "paper found");
        Ok(paper)
    }
}

/// Decide whether the top-ranked candidate is the queried paper.
///
/// Only the top hit is inspected; a low score, a missing author surname,
/// or an out-of-tolerance year each reject with the reason spelled out.
fn accept_top_candidate(top: &Value, author: Option<&str>, year: Option<i64>) -> Result<f64, Error> {
    let score = top["score"].as_f64().unwrap_or(0.0);
    let min_score = if author.is_some() {
        MIN_SCORE_WITH_AUTHOR
    } else {
        MIN_SCORE_TITLE_ONLY
    };
    if score < min_score {
        return Err(Error::NotFound(format!(
            "best match score ({score:.1}) below threshold ({min_score})"
        )));
    }

    if let Some(author) = author
        && !candidate_has_author(top, author)
    {
        return Err(Error::NotFound(format!(
            "author '{author}' not found in result authors"
        )));
    }

    if let Some(year) = year
        && let Some(found_year) = extract_year(top, &DATE_FIELDS[..3])
        && (found_year - year).abs() > YEAR_TOLERANCE
    {
        return Err(Error::NotFound(format!(
            "year mismatch: expected {year}, got {found_year}"
        )));
    }

    Ok(score)
}

/// Check the queried surname against candidate family names, and then,
/// since name fields are irregular, against the joined given+family text.
fn candidate_has_author(item: &Value, author: &str) -> bool {
    let needle = author.to_lowercase();
    let Some(authors) = item["author"].as_array() else {
        return false;
    };

    let family_hit = authors.iter().any(|a| {
        a["family"]
            .as_str()
            .unwrap_or("")
            .to_lowercase()
            .contains(&needle)
    });
    if family_hit {
        return true;
    }

    authors
        .iter()
        .map(|a| {
            format!(
                "{} {}",
                a["given"].as_str().unwrap_or(""),
                a["family"].as_str().unwrap_or("")
            )
            .to_lowercase()
        })
        .collect::<Vec<_>>()
        .join(" ")
        .contains(&needle)
}

fn extract_year(item: &Value, fields: &[&str]) -> Option<i64> {
    for field in fields {
        if let Some(year) = item[field]["date-parts"][0][0].as_i64() {
            return Some(year);
        }
    }
    None
}

fn extract_names(value: &Value) -> Vec<Name> {
    value
        .as_array()
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| {
                    if let Some(family) = entry["family"].as_str() {
                        Some(Name {
                            family: family.to_string(),
                            given: entry["given"].as_str().unwrap_or("").to_string(),
                        })
                    } else {
                        // Organizations come through as a single name field
                        entry["name"].as_str().map(|org| Name {
                            family: org.to_string(),
                            given: String::new(),
                        })
                    }
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Flatten a CrossRef work item into a [`VerifiedPaper`].
fn format_result(item: &Value, method: VerifyMethod, score: Option<f64>) -> VerifiedPaper {
    let doi = item["DOI"].as_str().unwrap_or("").to_string();
    let work_type = item["type"].as_str().unwrap_or("").to_string();
    let url = if doi.is_empty() {
        None
    } else {
        Some(format!("https://doi.org/{doi}"))
    };

    VerifiedPaper {
        verified: true,
        title: item["title"][0].as_str().unwrap_or("").to_string(),
        authors: extract_names(&item["author"]),
        editors: extract_names(&item["editor"]),
        year: extract_year(item, DATE_FIELDS),
        container_title: item["container-title"][0].as_str().unwrap_or("").to_string(),
        volume: item["volume"].as_str().unwrap_or("").to_string(),
        issue: item["issue"].as_str().unwrap_or("").to_string(),
        page: item["page"].as_str().unwrap_or("").to_string(),
        publisher: item["publisher"].as_str().unwrap_or("").to_string(),
        suggested_bibtex_type: entry_type_for(&work_type),
        work_type,
        method,
        score,
        url,
        doi,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn candidate(score: f64) -> Value {
        json!({
            "DOI": "10.2307/2024717",
            "title": ["Freedom of the Will and the Concept of a Person"],
            "score": score,
            "author": [
                { "family": "Frankfurt", "given": "Harry G." }
            ],
            "published": { "date-parts": [[1971, 1]] },
            "container-title": ["The Journal of Philosophy"],
            "volume": "68",
            "issue": "1",
            "page": "5-20",
            "publisher": "Philosophy Documentation Center",
            "type": "journal-article"
        })
    }

    // ── accept_top_candidate ───────────────────────────────────────────

    #[test]
    fn high_score_with_author_accepts() {
        let score = accept_top_candidate(&candidate(75.0), Some("Frankfurt"), Some(1971)).unwrap();
        assert_eq!(score, 75.0);
    }

    #[test]
    fn author_hint_lowers_the_score_bar() {
        // 35 clears the with-author threshold but not the title-only one
        assert!(accept_top_candidate(&candidate(35.0), Some("Frankfurt"), None).is_ok());
        match accept_top_candidate(&candidate(35.0), None, None) {
            Err(Error::NotFound(reason)) => assert!(reason.contains("below threshold")),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn title_only_needs_the_higher_score() {
        assert!(accept_top_candidate(&candidate(55.0), None, None).is_ok());
    }

    #[test]
    fn score_below_both_thresholds_rejects() {
        assert!(matches!(
            accept_top_candidate(&candidate(10.0), Some("Frankfurt"), None),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn author_mismatch_rejects_despite_high_score() {
        match accept_top_candidate(&candidate(95.0), Some("Quine"), None) {
            Err(Error::NotFound(reason)) => assert!(reason.contains("Quine")),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn author_match_is_case_insensitive() {
        assert!(accept_top_candidate(&candidate(60.0), Some("frankfurt"), None).is_ok());
    }

    #[test]
    fn author_found_in_given_family_fallback() {
        // Surname landed in the given field; the joined-text fallback
        // still finds it
        let top = json!({
            "score": 60.0,
            "author": [ { "given": "Harry Frankfurt", "family": "" } ]
        });
        assert!(accept_top_candidate(&top, Some("Frankfurt"), None).is_ok());
    }

    #[test]
    fn year_within_tolerance_accepts() {
        assert!(accept_top_candidate(&candidate(75.0), None, Some(1972)).is_ok());
        assert!(accept_top_candidate(&candidate(75.0), None, Some(1970)).is_ok());
    }

    #[test]
    fn year_outside_tolerance_rejects() {
        match accept_top_candidate(&candidate(75.0), None, Some(1980)) {
            Err(Error::NotFound(reason)) => assert!(reason.contains("year mismatch")),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn candidate_without_a_date_passes_the_year_check() {
        let top = json!({ "score": 75.0 });
        assert!(accept_top_candidate(&top, None, Some(1971)).is_ok());
    }

    #[test]
    fn missing_score_counts_as_zero() {
        let top = json!({ "title": ["x"] });
        assert!(matches!(
            accept_top_candidate(&top, None, None),
            Err(Error::NotFound(_))
        ));
    }

    // ── entry type mapping ─────────────────────────────────────────────

    #[test]
    fn known_types_map_to_entry_kinds() {
        assert_eq!(entry_type_for("journal-article"), EntryType::Article);
        assert_eq!(entry_type_for("book-chapter"), EntryType::InCollection);
        assert_eq!(entry_type_for("book-section"), EntryType::InCollection);
        assert_eq!(entry_type_for("book"), EntryType::Book);
        assert_eq!(entry_type_for("monograph"), EntryType::Book);
        assert_eq!(entry_type_for("edited-book"), EntryType::Book);
        assert_eq!(entry_type_for("proceedings-article"), EntryType::InProceedings);
        assert_eq!(entry_type_for("dissertation"), EntryType::PhdThesis);
        assert_eq!(entry_type_for("report"), EntryType::TechReport);
    }

    #[test]
    fn unknown_types_fall_back_to_misc() {
        assert_eq!(entry_type_for("posted-content"), EntryType::Misc);
        assert_eq!(entry_type_for("reference-entry"), EntryType::Misc);
        assert_eq!(entry_type_for("peer-review"), EntryType::Misc);
        assert_eq!(entry_type_for(""), EntryType::Misc);
    }

    #[test]
    fn entry_types_serialize_as_bibtex_names() {
        assert_eq!(
            serde_json::to_string(&EntryType::InCollection).unwrap(),
            "\"incollection\""
        );
        assert_eq!(
            serde_json::to_string(&EntryType::PhdThesis).unwrap(),
            "\"phdthesis\""
        );
    }

    // ── formatting ─────────────────────────────────────────────────────

    #[test]
    fn formats_the_full_record() {
        let paper = format_result(&candidate(88.0), VerifyMethod::BibliographicSearch, Some(88.0));
        assert!(paper.verified);
        assert_eq!(paper.doi, "10.2307/2024717");
        assert_eq!(paper.title, "Freedom of the Will and the Concept of a Person");
        assert_eq!(paper.authors[0].family, "Frankfurt");
        assert_eq!(paper.authors[0].given, "Harry G.");
        assert_eq!(paper.year, Some(1971));
        assert_eq!(paper.container_title, "The Journal of Philosophy");
        assert_eq!(paper.page, "5-20");
        assert_eq!(paper.suggested_bibtex_type, EntryType::Article);
        assert_eq!(paper.url.as_deref(), Some("https://doi.org/10.2307/2024717"));
        assert_eq!(paper.score, Some(88.0));
    }

    #[test]
    fn missing_doi_means_no_url() {
        let paper = format_result(&json!({}), VerifyMethod::DoiLookup, None);
        assert_eq!(paper.doi, "");
        assert!(paper.url.is_none());
        assert_eq!(paper.suggested_bibtex_type, EntryType::Misc);
    }

    #[test]
    fn organization_names_survive_extraction() {
        let item = json!({ "author": [ { "name": "UNESCO" } ] });
        let names = extract_names(&item["author"]);
        assert_eq!(names[0].family, "UNESCO");
        assert_eq!(names[0].given, "");
    }

    #[test]
    fn year_prefers_published_over_created() {
        let item = json!({
            "created": { "date-parts": [[2005]] },
            "published": { "date-parts": [[1971]] }
        });
        assert_eq!(extract_year(&item, DATE_FIELDS), Some(1971));
    }

    #[test]
    fn year_falls_back_through_the_field_list() {
        let item = json!({ "created": { "date-parts": [[2005]] } });
        assert_eq!(extract_year(&item, DATE_FIELDS), Some(2005));
        // The acceptance check ignores the created date
        assert_eq!(extract_year(&item, &DATE_FIELDS[..3]), None);
    }
}
