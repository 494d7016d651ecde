// tests/providers.rs
//
// Source adapters against recorded fixtures: eligibility rules, field mapping
// and failure reporting.

use ai_news_tracker::error::Error;
use ai_news_tracker::ingest::config::default_keywords;
use ai_news_tracker::ingest::providers::{
    arxiv::ArxivProvider, hackernews::HackerNewsProvider, newsapi::NewsApiProvider,
    rss_feed::RssFeedProvider,
};
use ai_news_tracker::ingest::types::SourceProvider;

const HN: &str = include_str!("fixtures/hn_search.json");
const ARXIV: &str = include_str!("fixtures/arxiv_atom.xml");
const NEWSAPI: &str = include_str!("fixtures/newsapi.json");
const MEDIUM: &str = include_str!("fixtures/medium_rss.xml");

#[tokio::test]
async fn hackernews_keeps_relevant_stories_above_points_floor() {
    let p = HackerNewsProvider::from_fixture(HN, default_keywords());
    let v = p.fetch_latest().await.expect("fixture parses");

    let titles: Vec<&str> = v.iter().map(|a| a.title.as_str()).collect();
    assert_eq!(
        titles,
        [
            "Anthropic ships a new Claude model for coding agents",
            "Show HN: An open-source LLM gateway written in Rust"
        ]
    );
    assert_eq!(v[0].points, 412);
    assert_eq!(v[0].source, "Hacker News");
    // No URL: falls back to the discussion page.
    assert_eq!(v[1].url, "https://news.ycombinator.com/item?id=41000002");
    assert_eq!(
        v[1].excerpt,
        "We built a gateway that routes requests across providers."
    );
    assert!(v.iter().all(|a| a.tags.contains("hacker-news")));
    assert!(v.iter().all(|a| !a.is_analyzed()));
}

#[tokio::test]
async fn arxiv_maps_every_entry_with_first_three_authors() {
    let p = ArxivProvider::from_fixture(ARXIV);
    let v = p.fetch_latest().await.expect("fixture parses");

    assert_eq!(v.len(), 2);
    assert_eq!(v[0].title, "Speculative Decoding for Low-Latency Inference Serving");
    assert_eq!(v[0].url, "http://arxiv.org/abs/2503.01234v1");
    assert_eq!(
        v[0].author.as_deref(),
        Some("Ada Lovelace, Alan Turing, Grace Hopper")
    );
    assert!(v[0].tags.contains("research") && v[0].tags.contains("arxiv"));
    assert_eq!(v[1].source, "arXiv");
}

#[tokio::test]
async fn newsapi_prefixes_publisher_and_filters_by_keyword() {
    let p = NewsApiProvider::from_fixture(NEWSAPI, default_keywords());
    let v = p.fetch_latest().await.expect("fixture parses");

    let sources: Vec<&str> = v.iter().map(|a| a.source.as_str()).collect();
    assert_eq!(sources, ["NewsAPI / TechCrunch", "NewsAPI / The Verge"]);
    assert_eq!(v[0].author.as_deref(), Some("Kyle W."));
}

#[tokio::test]
async fn newsapi_error_status_is_source_unavailable() {
    let body = r#"{"status":"error","code":"apiKeyInvalid","message":"Your API key is invalid."}"#;
    let p = NewsApiProvider::from_fixture(body, default_keywords());
    match p.fetch_latest().await {
        Err(Error::SourceUnavailable { source_name, reason }) => {
            assert_eq!(source_name, "NewsAPI");
            assert!(reason.contains("invalid"));
        }
        other => panic!("expected SourceUnavailable, got {other:?}"),
    }
}

#[tokio::test]
async fn medium_feed_keeps_on_topic_items() {
    let p = RssFeedProvider::from_fixture("Medium", MEDIUM, default_keywords());
    let v = p.fetch_latest().await.expect("fixture parses");

    assert_eq!(v.len(), 1);
    assert_eq!(v[0].title, "Shipping RAG pipelines to production");
    assert_eq!(v[0].source, "Medium");
    assert!(v[0].tags.contains("llm"));
}

#[tokio::test]
async fn malformed_payloads_fail_with_source_unavailable() {
    let hn = HackerNewsProvider::from_fixture("not json", vec![]);
    assert!(matches!(
        hn.fetch_latest().await,
        Err(Error::SourceUnavailable { .. })
    ));
    let ax = ArxivProvider::from_fixture("<feed><entry>");
    assert!(ax.fetch_latest().await.is_err());
}
