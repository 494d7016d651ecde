use async_trait::async_trait;
use chrono::Utc;
use metrics::{counter, histogram};
use serde::Deserialize;

use crate::config::HackerNewsConfig;
use crate::error::{Error, Result};
use crate::ingest::types::{Mode, SourceProvider};
use crate::ingest::{is_relevant, normalize_text};
use crate::model::Article;

use super::parse_rfc3339;

const NAME: &str = "Hacker News";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    title: Option<String>,
    url: Option<String>,
    story_text: Option<String>,
    created_at: Option<String>,
    points: Option<u32>,
    author: Option<String>,
    #[serde(rename = "objectID")]
    object_id: String,
}

/// Algolia HN search, filtered to keyword-matching stories above a points floor.
pub struct HackerNewsProvider {
    mode: Mode,
    settings: HackerNewsConfig,
    keywords: Vec<String>,
}

impl HackerNewsProvider {
    pub fn from_fixture(s: &str, keywords: Vec<String>) -> Self {
        Self {
            mode: Mode::fixture(s),
            settings: HackerNewsConfig::default(),
            keywords,
        }
    }

    pub fn from_config(
        cfg: &HackerNewsConfig,
        keywords: Vec<String>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            mode: Mode::http(cfg.url.clone(), client),
            settings: cfg.clone(),
            keywords,
        }
    }

    fn parse_hits(&self, body: &str) -> Result<Vec<Article>> {
        let t0 = std::time::Instant::now();
        let resp: SearchResponse =
            serde_json::from_str(body).map_err(|e| Error::source_unavailable(NAME, e))?;

        let mut out = Vec::with_capacity(resp.hits.len());
        for hit in resp.hits {
            let title = normalize_text(hit.title.as_deref().unwrap_or_default());
            let body = normalize_text(hit.story_text.as_deref().unwrap_or_default());
            let points = hit.points.unwrap_or(0);
            if title.is_empty()
                || points <= self.settings.min_points
                || !is_relevant(&title, &body, &self.keywords)
            {
                continue;
            }

            let url = hit
                .url
                .filter(|u| !u.trim().is_empty())
                .unwrap_or_else(|| {
                    format!("https://news.ycombinator.com/item?id={}", hit.object_id)
                });
            let published = hit
                .created_at
                .as_deref()
                .and_then(parse_rfc3339)
                .unwrap_or_else(Utc::now);

            let mut a = Article::new(title, url, NAME, published)
                .with_excerpt(body)
                .with_tags(["hacker-news"]);
            a.points = points;
            a.author = hit.author.filter(|s| !s.is_empty());
            out.push(a);
        }

        histogram!("ingest_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        counter!("ingest_events_total").increment(out.len() as u64);
        Ok(out)
    }
}

#[async_trait]
impl SourceProvider for HackerNewsProvider {
    async fn fetch_latest(&self) -> Result<Vec<Article>> {
        match &self.mode {
            Mode::Fixture(s) => self.parse_hits(s),
            Mode::Http { url, client } => {
                let body = client
                    .get(url)
                    .query(&[
                        ("query", self.settings.query.clone()),
                        ("tags", "story".to_string()),
                        (
                            "numericFilters",
                            format!("points>{}", self.settings.min_points),
                        ),
                        ("hitsPerPage", self.settings.hits_per_page.to_string()),
                    ])
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .map_err(|e| Error::source_unavailable(NAME, e))?
                    .text()
                    .await
                    .map_err(|e| Error::source_unavailable(NAME, e))?;
                self.parse_hits(&body)
            }
        }
    }

    fn name(&self) -> &str {
        NAME
    }
}
