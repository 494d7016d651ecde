use async_trait::async_trait;
use chrono::Utc;
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use serde::Deserialize;

use crate::config::ArxivConfig;
use crate::error::{Error, Result};
use crate::ingest::normalize_text;
use crate::ingest::types::{Mode, SourceProvider};
use crate::model::Article;

use super::parse_rfc3339;

const NAME: &str = "arXiv";

#[derive(Debug, Deserialize)]
struct Feed {
    #[serde(rename = "entry", default)]
    entries: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    id: String,
    title: Option<String>,
    summary: Option<String>,
    published: Option<String>,
    updated: Option<String>,
    #[serde(rename = "author", default)]
    authors: Vec<Author>,
}

#[derive(Debug, Deserialize)]
struct Author {
    name: String,
}

/// Latest papers from the arXiv Atom API. Every entry is eligible: the query
/// itself is the topic filter.
pub struct ArxivProvider {
    mode: Mode,
    settings: ArxivConfig,
}

impl ArxivProvider {
    pub fn from_fixture(s: &str) -> Self {
        Self {
            mode: Mode::fixture(s),
            settings: ArxivConfig::default(),
        }
    }

    pub fn from_config(cfg: &ArxivConfig, client: reqwest::Client) -> Self {
        Self {
            mode: Mode::http(cfg.url.clone(), client),
            settings: cfg.clone(),
        }
    }

    fn parse_feed(s: &str) -> Result<Vec<Article>> {
        let t0 = std::time::Instant::now();
        let feed: Feed = from_str(s).map_err(|e| Error::source_unavailable(NAME, e))?;

        let mut out = Vec::with_capacity(feed.entries.len());
        for e in feed.entries {
            let title = normalize_text(e.title.as_deref().unwrap_or_default());
            if title.is_empty() || e.id.trim().is_empty() {
                continue;
            }
            let published = e
                .published
                .as_deref()
                .or(e.updated.as_deref())
                .and_then(parse_rfc3339)
                .unwrap_or_else(Utc::now);
            let authors: Vec<&str> = e.authors.iter().take(3).map(|a| a.name.trim()).collect();

            let mut a = Article::new(title, e.id.trim(), NAME, published)
                .with_excerpt(normalize_text(e.summary.as_deref().unwrap_or_default()))
                .with_tags(["research", "arxiv"]);
            if !authors.is_empty() {
                a.author = Some(authors.join(", "));
            }
            out.push(a);
        }

        histogram!("ingest_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        counter!("ingest_events_total").increment(out.len() as u64);
        Ok(out)
    }
}

#[async_trait]
impl SourceProvider for ArxivProvider {
    async fn fetch_latest(&self) -> Result<Vec<Article>> {
        match &self.mode {
            Mode::Fixture(s) => Self::parse_feed(s),
            Mode::Http { url, client } => {
                let body = client
                    .get(url)
                    .query(&[
                        ("search_query", self.settings.query.clone()),
                        ("sortBy", "lastUpdatedDate".to_string()),
                        ("sortOrder", "descending".to_string()),
                        ("max_results", self.settings.max_results.to_string()),
                    ])
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .map_err(|e| Error::source_unavailable(NAME, e))?
                    .text()
                    .await
                    .map_err(|e| Error::source_unavailable(NAME, e))?;
                Self::parse_feed(&body)
            }
        }
    }

    fn name(&self) -> &str {
        NAME
    }
}
