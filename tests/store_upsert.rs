// tests/store_upsert.rs
//
// Store semantics: merge on re-sighting, idempotence, subscriber cap,
// query order/filters and snapshot persistence.

use chrono::{Duration, TimeZone, Utc};

use ai_news_tracker::error::Error;
use ai_news_tracker::model::{Article, Category, DeliveryOutcome, DigestRecord, Subscriber};
use ai_news_tracker::store::{ArticleQuery, Store};

fn at(h: u32) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 4, h, 0, 0).unwrap()
}

fn analyzed(title: &str, url: &str, cat: Category, score: u8, h: u32) -> Article {
    let mut a = Article::new(title, url, "Hacker News", at(h)).with_excerpt("body");
    a.category = cat;
    a.relevance_score = Some(score);
    a.summary = Some(format!("summary of {title}"));
    a.analyzed_at = Some(at(h));
    a
}

#[tokio::test]
async fn resighting_across_cycles_merges_into_one_record() {
    let store = Store::in_memory(20);

    let first = Article::new("Claude 4 released", "https://x.io/claude-4", "Hacker News", at(9))
        .with_excerpt("Anthropic announced a new model.")
        .with_tags(["hacker-news"]);
    store.upsert_articles(vec![first.clone()]).await.unwrap();

    // Same story via another URL spelling, with fields the first lacked.
    let mut second = Article::new("", "https://X.io/claude-4/?ref=feed", "Hacker News", at(9))
        .with_tags(["llm"]);
    second.author = Some("dario".into());
    second.points = 300;
    store.upsert_articles(vec![second]).await.unwrap();

    assert_eq!(store.article_count().await, 1);
    let got = store.get_article(&first.fingerprint).await.unwrap();
    assert_eq!(got.title, "Claude 4 released");
    assert_eq!(got.excerpt, "Anthropic announced a new model.");
    assert_eq!(got.author.as_deref(), Some("dario"));
    assert_eq!(got.points, 300);
    assert!(got.tags.contains("hacker-news") && got.tags.contains("llm"));
}

#[tokio::test]
async fn upserting_identical_content_twice_is_idempotent() {
    let store = Store::in_memory(20);
    let a = analyzed("Model X", "https://x.io/m", Category::AiModel, 8, 9);

    store.upsert_article(a.clone()).await.unwrap();
    let stats1 = store.stats().await;
    let rec1 = store.get_article(&a.fingerprint).await;
    let cands1 = store.digest_candidates(at(0)).await;

    store.upsert_article(a.clone()).await.unwrap();
    assert_eq!(store.stats().await, stats1);
    assert_eq!(store.get_article(&a.fingerprint).await, rec1);
    assert_eq!(store.digest_candidates(at(0)).await, cands1);
}

#[tokio::test]
async fn raw_resighting_never_erases_analysis() {
    let store = Store::in_memory(20);
    let a = analyzed("Model X", "https://x.io/m", Category::AiModel, 8, 9);
    store.upsert_article(a.clone()).await.unwrap();

    let raw = Article::new("Model X", "https://x.io/m", "Hacker News", at(9));
    store.upsert_article(raw).await.unwrap();

    let got = store.get_article(&a.fingerprint).await.unwrap();
    assert_eq!(got.category, Category::AiModel);
    assert_eq!(got.relevance_score, Some(8));
    assert!(got.summary.is_some());
    assert!(store
        .articles_needing_analysis(&[a.fingerprint.clone(), "unknown".into()])
        .await
        .contains("unknown"));
    assert!(!store
        .articles_needing_analysis(&[a.fingerprint.clone()])
        .await
        .contains(&a.fingerprint));
}

#[tokio::test]
async fn subscriber_cap_rejects_the_twenty_first_and_leaves_the_set_unchanged() {
    let store = Store::in_memory(20);
    for i in 0..20 {
        store
            .add_subscriber(Subscriber::new(&format!("user{i}@example.com"), "U"))
            .await
            .unwrap();
    }
    let before = store.list_subscribers().await;

    let err = store
        .add_subscriber(Subscriber::new("late@example.com", "Late"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CapacityExceeded { max: 20 }));
    assert_eq!(store.list_subscribers().await, before);

    // Updating an existing subscriber is not a new one.
    let updated = store
        .add_subscriber(Subscriber::new("USER3@example.com", "Three").with_min_relevance(8))
        .await
        .unwrap();
    assert_eq!(updated.min_relevance, 8);
    assert_eq!(store.list_active_subscribers().await.len(), 20);
}

#[tokio::test]
async fn invalid_and_missing_subscribers_are_reported() {
    let store = Store::in_memory(20);
    assert!(matches!(
        store.add_subscriber(Subscriber::new("nope", "x")).await,
        Err(Error::InvalidInput(_))
    ));
    assert!(matches!(
        store.remove_subscriber("ghost@example.com").await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn query_orders_by_relevance_then_recency_with_unanalyzed_last() {
    let store = Store::in_memory(20);
    store
        .upsert_articles(vec![
            analyzed("low", "https://x.io/1", Category::IndustryNews, 4, 10),
            analyzed("high old", "https://x.io/2", Category::AiModel, 9, 6),
            analyzed("high new", "https://x.io/3", Category::ProductTool, 9, 8),
            Article::new("raw newest", "https://x.io/4", "arXiv", at(12)),
        ])
        .await
        .unwrap();

    let page = store.query_articles(&ArticleQuery::default()).await.unwrap();
    let titles: Vec<&str> = page.articles.iter().map(|a| a.title.as_str()).collect();
    assert_eq!(titles, ["high new", "high old", "low", "raw newest"]);
    assert_eq!(page.total, 4);

    let q = ArticleQuery {
        category: Some("ai model".into()),
        ..Default::default()
    };
    let page = store.query_articles(&q).await.unwrap();
    assert_eq!(page.count, 1);
    assert_eq!(page.articles[0].title, "high old");

    let q = ArticleQuery {
        min_relevance: Some(5),
        search: Some("HIGH".into()),
        limit: Some(1),
        offset: Some(1),
        ..Default::default()
    };
    let page = store.query_articles(&q).await.unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(page.articles[0].title, "high old");

    let q = ArticleQuery {
        source: Some("arx".into()),
        ..Default::default()
    };
    assert_eq!(store.query_articles(&q).await.unwrap().count, 1);

    let q = ArticleQuery {
        category: Some("Gossip".into()),
        ..Default::default()
    };
    assert!(matches!(
        store.query_articles(&q).await,
        Err(Error::InvalidInput(_))
    ));
}

#[tokio::test]
async fn snapshot_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state").join("news.json");

    {
        let store = Store::open(&path, 20).await.unwrap();
        store
            .upsert_article(analyzed("kept", "https://x.io/k", Category::AiModel, 7, 9))
            .await
            .unwrap();
        store
            .add_subscriber(Subscriber::new("a@example.com", "A"))
            .await
            .unwrap();
        store
            .append_digest_record(DigestRecord {
                sent_at: at(8),
                recipient: "a@example.com".into(),
                article_count: 1,
                outcome: DeliveryOutcome::Sent,
            })
            .await
            .unwrap();
    }
    assert!(!path.with_extension("json.tmp").exists());

    let reopened = Store::open(&path, 20).await.unwrap();
    assert_eq!(reopened.article_count().await, 1);
    assert_eq!(reopened.list_subscribers().await.len(), 1);
    let log = reopened.digest_log(10).await;
    assert_eq!(log.len(), 1);
    assert!(log[0].outcome.is_sent());
    assert_eq!(reopened.stats().await.digests_sent, 1);
}

#[tokio::test]
async fn digest_candidates_respect_the_window() {
    let store = Store::in_memory(20);
    let now = at(12);
    let mut old = analyzed("old", "https://x.io/o", Category::AiModel, 7, 0);
    old.published_at = now - Duration::hours(48);
    old.analyzed_at = Some(now - Duration::hours(47));
    store
        .upsert_articles(vec![old, analyzed("fresh", "https://x.io/f", Category::AiModel, 7, 11)])
        .await
        .unwrap();

    let c = store.digest_candidates(now - Duration::hours(24)).await;
    assert_eq!(c.len(), 1);
    assert_eq!(c[0].title, "fresh");
}

#[tokio::test]
async fn undated_resighting_does_not_pull_an_article_back_into_the_window() {
    let store = Store::in_memory(20);
    let day1 = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
    let day5 = Utc.with_ymd_and_hms(2025, 3, 5, 9, 0, 0).unwrap();

    let mut first = Article::new("Agent SDK 1.0", "https://x.io/agent-sdk", "Dev.to", day1);
    first.category = Category::ProductTool;
    first.relevance_score = Some(8);
    first.analyzed_at = Some(day1);
    store.upsert_article(first).await.unwrap();

    // The feed dropped the date; the adapter fell back to the fetch time.
    let mut again = Article::new("Agent SDK 1.0", "https://x.io/agent-sdk", "Dev.to", day5);
    again.fetched_at = day5;
    store.upsert_article(again).await.unwrap();

    let stored = store.query_articles(&ArticleQuery::default()).await.unwrap();
    assert_eq!(stored.articles[0].published_at, day1);
    assert!(store.digest_candidates(day5 - Duration::hours(24)).await.is_empty());
}
