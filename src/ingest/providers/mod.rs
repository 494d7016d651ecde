pub mod arxiv;
pub mod hackernews;
pub mod newsapi;
pub mod rss_feed;

use std::time::Duration;

use chrono::{DateTime, Utc};
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

use crate::config::SourcesConfig;
use crate::ingest::types::SourceProvider;

pub const USER_AGENT: &str = "ai-news-tracker/0.1 (+https://github.com/ai-news-tracker)";

/// Shared client for source fetches.
pub fn http_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(5))
        .timeout(timeout)
        .build()
}

/// Register the enabled sources in a fixed order.
pub fn build_providers(
    cfg: &SourcesConfig,
    keywords: &[String],
    client: &reqwest::Client,
) -> Vec<Box<dyn SourceProvider>> {
    let mut out: Vec<Box<dyn SourceProvider>> = Vec::new();
    if cfg.hackernews.enabled {
        out.push(Box::new(hackernews::HackerNewsProvider::from_config(
            &cfg.hackernews,
            keywords.to_vec(),
            client.clone(),
        )));
    }
    if cfg.arxiv.enabled {
        out.push(Box::new(arxiv::ArxivProvider::from_config(
            &cfg.arxiv,
            client.clone(),
        )));
    }
    if cfg.newsapi.enabled {
        out.push(Box::new(newsapi::NewsApiProvider::from_config(
            &cfg.newsapi,
            keywords.to_vec(),
            client.clone(),
        )));
    }
    for group in &cfg.feeds {
        out.push(Box::new(rss_feed::RssFeedProvider::from_config(
            group,
            keywords.to_vec(),
            client.clone(),
        )));
    }
    out
}

pub(crate) fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    OffsetDateTime::parse(ts.trim(), &Rfc2822)
        .ok()
        .and_then(|dt| DateTime::from_timestamp(dt.unix_timestamp(), 0))
}

pub(crate) fn parse_rfc3339(ts: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(ts.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_helpers_parse_common_feed_formats() {
        let a = parse_rfc2822("Tue, 04 Mar 2025 10:00:00 +0000").unwrap();
        let b = parse_rfc3339("2025-03-04T10:00:00Z").unwrap();
        assert_eq!(a, b);
        assert!(parse_rfc2822("yesterday").is_none());
    }
}
