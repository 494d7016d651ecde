// src/ingest/providers/rss_feed.rs
use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use serde::Deserialize;

use crate::config::FeedGroupConfig;
use crate::error::{Error, Result};
use crate::ingest::types::{Mode, SourceProvider};
use crate::ingest::{is_relevant, normalize_text, truncate_chars};
use crate::model::Article;

use super::parse_rfc2822;

const EXCERPT_CHARS: usize = 500;

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    #[serde(rename = "content:encoded")]
    content: Option<String>,
    #[serde(rename = "dc:creator")]
    creator: Option<String>,
    #[serde(rename = "category", default)]
    categories: Vec<String>,
}

/// Generic RSS 2.0 source: several feeds reported under one display name
/// (Medium tag feeds, newsletters, community blogs).
pub struct RssFeedProvider {
    name: String,
    feeds: Vec<Mode>,
    max_items: usize,
    tags: Vec<String>,
    keywords: Vec<String>,
}

impl RssFeedProvider {
    pub fn from_fixture(name: &str, xml: &str, keywords: Vec<String>) -> Self {
        Self::from_fixtures(name, &[xml], keywords)
    }

    pub fn from_fixtures(name: &str, xmls: &[&str], keywords: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            feeds: xmls.iter().map(|x| Mode::fixture(x)).collect(),
            max_items: 10,
            tags: Vec::new(),
            keywords,
        }
    }

    pub fn from_config(cfg: &FeedGroupConfig, keywords: Vec<String>, client: reqwest::Client) -> Self {
        Self {
            name: cfg.name.clone(),
            feeds: cfg
                .urls
                .iter()
                .map(|u| Mode::http(u.clone(), client.clone()))
                .collect(),
            max_items: cfg.max_items,
            tags: cfg.tags.clone(),
            keywords,
        }
    }

    fn parse_items_from_str(&self, s: &str) -> Result<Vec<Article>> {
        let t0 = std::time::Instant::now();
        let xml_clean = scrub_html_entities_for_xml(s);
        let rss: Rss = from_str(&xml_clean).map_err(|e| Error::source_unavailable(&self.name, e))?;

        let mut out = Vec::new();
        for it in rss.channel.item.into_iter().take(self.max_items) {
            let title = normalize_text(it.title.as_deref().unwrap_or_default());
            let Some(link) = it.link.filter(|l| !l.trim().is_empty()) else {
                continue;
            };
            let body_raw = it
                .description
                .as_deref()
                .filter(|d| !d.trim().is_empty())
                .or(it.content.as_deref())
                .unwrap_or_default();
            let body = truncate_chars(&normalize_text(body_raw), EXCERPT_CHARS);
            if title.is_empty() || !is_relevant(&title, &body, &self.keywords) {
                continue;
            }

            let published = it
                .pub_date
                .as_deref()
                .and_then(parse_rfc2822)
                .unwrap_or_else(Utc::now);
            let mut a = Article::new(title, link.trim(), self.name.as_str(), published)
                .with_excerpt(body)
                .with_tags(self.tags.iter().cloned())
                .with_tags(
                    it.categories
                        .iter()
                        .map(|c| c.trim().to_lowercase())
                        .filter(|c| !c.is_empty())
                        .take(3),
                );
            a.author = it.creator.map(|c| c.trim().to_string()).filter(|c| !c.is_empty());
            out.push(a);
        }

        histogram!("ingest_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        counter!("ingest_events_total").increment(out.len() as u64);
        Ok(out)
    }

    async fn fetch_one(&self, feed: &Mode) -> Result<Vec<Article>> {
        match feed {
            Mode::Fixture(s) => self.parse_items_from_str(s),
            Mode::Http { url, client } => {
                let body = client
                    .get(url.as_str())
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .map_err(|e| Error::source_unavailable(&self.name, e))?
                    .text()
                    .await
                    .map_err(|e| Error::source_unavailable(&self.name, e))?;
                self.parse_items_from_str(&body)
            }
        }
    }
}

#[async_trait]
impl SourceProvider for RssFeedProvider {
    /// A single broken feed is skipped; the source fails only when every feed does.
    async fn fetch_latest(&self) -> Result<Vec<Article>> {
        let results = join_all(self.feeds.iter().map(|f| self.fetch_one(f))).await;

        let mut out = Vec::new();
        let mut last_err = None;
        let mut ok_feeds = 0usize;
        for res in results {
            match res {
                Ok(mut v) => {
                    ok_feeds += 1;
                    out.append(&mut v);
                }
                Err(e) => {
                    tracing::warn!(target: "ingest", source = %self.name, error = %e, "feed error");
                    last_err = Some(e);
                }
            }
        }

        match last_err {
            Some(e) if ok_feeds == 0 => Err(e),
            _ => Ok(out),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&hellip;", "...")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}
