// tests/http_integrations.rs
//
// Outbound HTTP integrations against a local mock server: page enrichment,
// the Anthropic analysis provider and Resend delivery.

use chrono::Utc;
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ai_news_tracker::analyze::ai_adapter::{
    AiClient, AnalysisItem, AnthropicProvider, BudgetedClient,
};
use ai_news_tracker::config::EnrichConfig;
use ai_news_tracker::digest::Digest;
use ai_news_tracker::error::Error;
use ai_news_tracker::ingest::enrich::Enricher;
use ai_news_tracker::model::Article;
use ai_news_tracker::notify::{Notifier, ResendNotifier};

const PAGE: &str = r#"<!doctype html><html><head>
<meta property="og:description" content="A practical walkthrough of serving open-weight models behind an autoscaling gateway.">
</head><body>hi</body></html>"#;

#[tokio::test]
async fn enricher_fills_short_excerpts_and_skips_failures() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/post"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(PAGE, "text/html"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let enricher = Enricher::new(reqwest::Client::new(), &EnrichConfig::default());
    let long = "x".repeat(200);
    let input = vec![
        Article::new("short", format!("{}/post", server.uri()), "HN", Utc::now()),
        Article::new("missing", format!("{}/gone", server.uri()), "HN", Utc::now()),
        Article::new("long", format!("{}/post?long", server.uri()), "HN", Utc::now())
            .with_excerpt(long.clone()),
        Article::new("discussion", "https://news.ycombinator.com/item?id=1", "HN", Utc::now()),
    ];

    let out = enricher.enrich_all(input).await;

    assert_eq!(
        out[0].enriched_excerpt.as_deref(),
        Some("A practical walkthrough of serving open-weight models behind an autoscaling gateway.")
    );
    assert_eq!(out[0].body_text(), out[0].enriched_excerpt.as_deref().unwrap());
    assert!(out[1].enriched_excerpt.is_none());
    assert!(out[2].enriched_excerpt.is_none());
    assert_eq!(out[2].body_text(), long);
    assert!(out[3].enriched_excerpt.is_none());
}

fn items() -> Vec<AnalysisItem> {
    (1..=2)
        .map(|id| AnalysisItem {
            id,
            title: format!("story {id}"),
            excerpt: "text".into(),
            source: "HN".into(),
        })
        .collect()
}

#[tokio::test]
async fn anthropic_provider_parses_fenced_batch_answers() {
    let server = MockServer::start().await;
    let text = "```json\n[{\"id\":2,\"summary\":\"second\",\"category\":\"Research Paper\",\"relevance_score\":6},\
{\"id\":1,\"summary\":\"first\",\"category\":\"Product/Tool\",\"relevance_score\":9,\"is_product_or_tool\":true,\
\"product_name\":\"Acme\",\"competitors\":[{\"name\":\"Other\",\"description\":\"d\",\"comparison\":\"c\"}]}]\n```";
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "test-key"))
        .and(header("anthropic-version", "2023-06-01"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{"type": "text", "text": text}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = AnthropicProvider::new("test-key".into(), None)
        .with_endpoint(format!("{}/v1/messages", server.uri()));
    let client = BudgetedClient::new(provider, 10);

    let out = client.analyze_batch(&items()).await.expect("batch ok");
    assert_eq!(out.len(), 2);
    let first = out.iter().find(|r| r.id == 1).unwrap();
    assert_eq!(first.product_name.as_deref(), Some("Acme"));
    assert_eq!(first.competitors.len(), 1);
    assert_eq!(client.calls_today(), 1);
}

#[tokio::test]
async fn anthropic_error_status_fails_the_whole_batch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(529).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let provider = AnthropicProvider::new("k".into(), Some("claude-test"))
        .with_endpoint(format!("{}/v1/messages", server.uri()));
    let client = BudgetedClient::new(provider, 10);

    match client.analyze_batch(&items()).await {
        Err(Error::AnalysisBatchFailed { articles, reason }) => {
            assert_eq!(articles, 2);
            assert!(reason.contains("529"));
        }
        other => panic!("expected batch failure, got {other:?}"),
    }
}

fn digest(to: &str) -> Digest {
    Digest {
        recipient: to.into(),
        name: "Reader".into(),
        subject: "AI News Digest".into(),
        html: "<p>hi</p>".into(),
        text: "hi".into(),
        article_count: 1,
    }
}

#[tokio::test]
async fn resend_posts_the_digest_with_bearer_auth() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/emails"))
        .and(header("authorization", "Bearer re_test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "abc"})))
        .expect(1)
        .mount(&server)
        .await;

    let n = ResendNotifier::new("re_test", "Digest <digest@example.com>")
        .with_endpoint(format!("{}/emails", server.uri()));
    n.send(&digest("reader@example.com")).await.expect("sent");
}

#[tokio::test]
async fn resend_rejection_is_a_delivery_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({"message": "invalid to"})))
        .mount(&server)
        .await;

    let n = ResendNotifier::new("re_test", "digest@example.com")
        .with_endpoint(format!("{}/emails", server.uri()));
    match n.send(&digest("bad@example.com")).await {
        Err(Error::DeliveryFailed { recipient, reason }) => {
            assert_eq!(recipient, "bad@example.com");
            assert!(reason.contains("422"));
        }
        other => panic!("expected delivery failure, got {other:?}"),
    }
}
