//! Integration tests for the abstract resolution fallback chain, using
//! mock providers so no network is touched.

use std::sync::Arc;
use std::time::Duration;

use litref_core::resolver::AbstractChain;
use litref_core::sources::mock::{MockProvider, MockResponse};
use litref_core::sources::{AbstractProvider, AbstractSource};
use litref_core::{AbstractQuery, Error};

const TIMEOUT: Duration = Duration::from_secs(5);

fn full_query() -> AbstractQuery {
    AbstractQuery {
        doi: Some("10.1111/nous.12191".into()),
        s2_id: Some("649def34f8be52c8b66281af98ae884c09aef38b".into()),
        title: Some("Freedom of the Will and the Concept of a Person".into()),
        author: Some("Frankfurt".into()),
        year: Some(1971),
    }
}

fn chain_of(providers: Vec<Arc<MockProvider>>) -> AbstractChain {
    AbstractChain::from_providers(
        providers
            .into_iter()
            .map(|p| Box::new(p) as Box<dyn AbstractProvider>)
            .collect(),
    )
}

#[tokio::test]
async fn first_success_short_circuits_later_sources() {
    let s2 = Arc::new(MockProvider::new(
        AbstractSource::SemanticScholar,
        MockResponse::Abstract("An S2 abstract.".into()),
    ));
    let openalex = Arc::new(MockProvider::new(
        AbstractSource::OpenAlex,
        MockResponse::Abstract("Should never be reached.".into()),
    ));
    let core = Arc::new(MockProvider::new(
        AbstractSource::Core,
        MockResponse::Abstract("Nor this.".into()),
    ));
    let chain = chain_of(vec![s2.clone(), openalex.clone(), core.clone()]);

    let result = chain
        .resolve(&full_query(), &reqwest::Client::new(), TIMEOUT)
        .await
        .unwrap();

    assert_eq!(result.text(), Some("An S2 abstract."));
    assert_eq!(result.source(), Some(AbstractSource::SemanticScholar));
    assert_eq!(s2.call_count(), 1);
    assert_eq!(openalex.call_count(), 0);
    assert_eq!(core.call_count(), 0);
}

#[tokio::test]
async fn empty_answer_falls_through_to_the_next_source() {
    let s2 = Arc::new(MockProvider::new(
        AbstractSource::SemanticScholar,
        MockResponse::NoAbstract,
    ));
    let openalex = Arc::new(MockProvider::new(
        AbstractSource::OpenAlex,
        MockResponse::Abstract("This is a test".into()),
    ));
    let chain = chain_of(vec![s2.clone(), openalex.clone()]);

    let result = chain
        .resolve(&full_query(), &reqwest::Client::new(), TIMEOUT)
        .await
        .unwrap();

    assert_eq!(result.text(), Some("This is a test"));
    assert_eq!(result.source(), Some(AbstractSource::OpenAlex));
    assert_eq!(s2.call_count(), 1);
    assert_eq!(openalex.call_count(), 1);
}

#[tokio::test]
async fn inapplicable_sources_are_skipped_without_a_call() {
    let s2 = Arc::new(MockProvider::inapplicable(AbstractSource::SemanticScholar));
    let core = Arc::new(MockProvider::new(
        AbstractSource::Core,
        MockResponse::Abstract("From CORE.".into()),
    ));
    let chain = chain_of(vec![s2.clone(), core.clone()]);

    let result = chain
        .resolve(&full_query(), &reqwest::Client::new(), TIMEOUT)
        .await
        .unwrap();

    assert_eq!(result.source(), Some(AbstractSource::Core));
    assert_eq!(s2.call_count(), 0);
    assert_eq!(core.call_count(), 1);
}

#[tokio::test]
async fn all_sources_empty_is_a_normal_miss() {
    let providers: Vec<Arc<MockProvider>> = [
        AbstractSource::SemanticScholar,
        AbstractSource::OpenAlex,
        AbstractSource::Core,
    ]
    .into_iter()
    .map(|source| Arc::new(MockProvider::new(source, MockResponse::NoAbstract)))
    .collect();
    let chain = chain_of(providers.clone());

    let result = chain
        .resolve(&full_query(), &reqwest::Client::new(), TIMEOUT)
        .await
        .unwrap();

    assert!(!result.is_found());
    assert_eq!(result.text(), None);
    assert_eq!(result.source(), None);
    for provider in &providers {
        assert_eq!(provider.call_count(), 1);
    }
}

#[tokio::test]
async fn mid_chain_failure_falls_through() {
    let s2 = Arc::new(MockProvider::new(
        AbstractSource::SemanticScholar,
        MockResponse::Network("connection refused".into()),
    ));
    let openalex = Arc::new(MockProvider::new(
        AbstractSource::OpenAlex,
        MockResponse::Abstract("Recovered downstream.".into()),
    ));
    let chain = chain_of(vec![s2.clone(), openalex.clone()]);

    let result = chain
        .resolve(&full_query(), &reqwest::Client::new(), TIMEOUT)
        .await
        .unwrap();

    assert_eq!(result.source(), Some(AbstractSource::OpenAlex));
    assert_eq!(s2.call_count(), 1);
}

#[tokio::test]
async fn failure_of_the_final_stage_propagates() {
    let s2 = Arc::new(MockProvider::new(
        AbstractSource::SemanticScholar,
        MockResponse::NoAbstract,
    ));
    let core = Arc::new(MockProvider::new(
        AbstractSource::Core,
        MockResponse::RateLimited,
    ));
    let chain = chain_of(vec![s2, core]);

    let err = chain
        .resolve(&full_query(), &reqwest::Client::new(), TIMEOUT)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::RateLimited(_)));
}

#[tokio::test]
async fn failure_followed_by_a_clean_miss_is_not_an_error() {
    let s2 = Arc::new(MockProvider::new(
        AbstractSource::SemanticScholar,
        MockResponse::Status(500),
    ));
    let openalex = Arc::new(MockProvider::new(
        AbstractSource::OpenAlex,
        MockResponse::NoAbstract,
    ));
    let chain = chain_of(vec![s2, openalex]);

    let result = chain
        .resolve(&full_query(), &reqwest::Client::new(), TIMEOUT)
        .await
        .unwrap();

    assert!(!result.is_found());
}

#[tokio::test]
async fn empty_chain_resolves_to_a_miss() {
    let chain = AbstractChain::from_providers(vec![]);
    let result = chain
        .resolve(&full_query(), &reqwest::Client::new(), TIMEOUT)
        .await
        .unwrap();
    assert!(!result.is_found());
}
