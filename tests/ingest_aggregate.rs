// tests/ingest_aggregate.rs
//
// Aggregator: partial source failure, cross-source dedup and output order.

use std::collections::BTreeSet;

use ai_news_tracker::error::Error;
use ai_news_tracker::ingest::config::default_keywords;
use ai_news_tracker::ingest::providers::{
    arxiv::ArxivProvider, hackernews::HackerNewsProvider, newsapi::NewsApiProvider,
    rss_feed::RssFeedProvider,
};
use ai_news_tracker::ingest::types::SourceProvider;
use ai_news_tracker::ingest::Aggregator;

const HN: &str = include_str!("fixtures/hn_search.json");
const ARXIV: &str = include_str!("fixtures/arxiv_atom.xml");
const NEWSAPI: &str = include_str!("fixtures/newsapi.json");
const MEDIUM: &str = include_str!("fixtures/medium_rss.xml");

#[tokio::test]
async fn one_failing_source_of_four_does_not_block_the_others() {
    let kw = default_keywords();
    let providers: Vec<Box<dyn SourceProvider>> = vec![
        Box::new(HackerNewsProvider::from_fixture(HN, kw.clone())),
        Box::new(ArxivProvider::from_fixture(ARXIV)),
        Box::new(NewsApiProvider::from_fixture(NEWSAPI, kw.clone())),
        Box::new(RssFeedProvider::from_fixture("Medium", "<rss><broken", kw)),
    ];
    let agg = Aggregator::new(providers);
    let report = agg.run_once().await;

    assert_eq!(report.failures.len(), 1);
    assert!(matches!(
        &report.failures[0],
        Error::SourceUnavailable { source_name, .. } if source_name == "Medium"
    ));
    assert_eq!(report.articles.len(), 6);

    let sources: BTreeSet<&str> = report
        .articles
        .iter()
        .map(|a| a.source.split(" / ").next().unwrap_or_default())
        .collect();
    assert_eq!(
        sources,
        BTreeSet::from(["Hacker News", "arXiv", "NewsAPI"])
    );
}

#[tokio::test]
async fn same_url_from_two_sources_collapses_into_one_article() {
    let kw = default_keywords();
    let providers: Vec<Box<dyn SourceProvider>> = vec![
        Box::new(RssFeedProvider::from_fixture("Medium", MEDIUM, kw.clone())),
        Box::new(RssFeedProvider::from_fixture("Mirror", MEDIUM, kw)),
    ];
    let report = Aggregator::new(providers).run_once().await;

    assert!(report.failures.is_empty());
    assert_eq!(report.fetched, 2);
    assert_eq!(report.dedup, 1);
    assert_eq!(report.articles.len(), 1);
}

#[tokio::test]
async fn output_is_ordered_by_points_then_recency() {
    let kw = default_keywords();
    let providers: Vec<Box<dyn SourceProvider>> = vec![
        Box::new(ArxivProvider::from_fixture(ARXIV)),
        Box::new(HackerNewsProvider::from_fixture(HN, kw)),
    ];
    let report = Aggregator::new(providers).run_once().await;

    let points: Vec<u32> = report.articles.iter().map(|a| a.points).collect();
    assert_eq!(points, [412, 87, 0, 0]);
    // Papers have no points: newest publication first.
    assert!(report.articles[2].published_at > report.articles[3].published_at);
}
