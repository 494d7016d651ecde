use async_trait::async_trait;
use chrono::Utc;
use metrics::{counter, histogram};
use serde::Deserialize;

use crate::config::NewsApiConfig;
use crate::error::{Error, Result};
use crate::ingest::types::{Mode, SourceProvider};
use crate::ingest::{is_relevant, normalize_text};
use crate::model::Article;

use super::parse_rfc3339;

const NAME: &str = "NewsAPI";

#[derive(Debug, Deserialize)]
struct EverythingResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    articles: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    description: Option<String>,
    url: Option<String>,
    #[serde(rename = "publishedAt")]
    published_at: Option<String>,
    author: Option<String>,
    source: Option<Publisher>,
}

#[derive(Debug, Deserialize)]
struct Publisher {
    name: Option<String>,
}

/// NewsAPI `everything` search. Without an API key the source is simply empty.
pub struct NewsApiProvider {
    mode: Mode,
    settings: NewsApiConfig,
    keywords: Vec<String>,
}

impl NewsApiProvider {
    pub fn from_fixture(s: &str, keywords: Vec<String>) -> Self {
        Self {
            mode: Mode::fixture(s),
            settings: NewsApiConfig::default(),
            keywords,
        }
    }

    pub fn from_config(cfg: &NewsApiConfig, keywords: Vec<String>, client: reqwest::Client) -> Self {
        Self {
            mode: Mode::http(cfg.url.clone(), client),
            settings: cfg.clone(),
            keywords,
        }
    }

    fn parse_articles(&self, body: &str) -> Result<Vec<Article>> {
        let t0 = std::time::Instant::now();
        let resp: EverythingResponse =
            serde_json::from_str(body).map_err(|e| Error::source_unavailable(NAME, e))?;
        if resp.status.as_deref() == Some("error") {
            return Err(Error::source_unavailable(
                NAME,
                resp.message.unwrap_or_else(|| "api error".to_string()),
            ));
        }

        let mut out = Vec::with_capacity(resp.articles.len());
        for it in resp.articles {
            let title = normalize_text(it.title.as_deref().unwrap_or_default());
            let desc = normalize_text(it.description.as_deref().unwrap_or_default());
            let Some(url) = it.url.filter(|u| !u.trim().is_empty()) else {
                continue;
            };
            if title.is_empty() || !is_relevant(&title, &desc, &self.keywords) {
                continue;
            }
            let publisher = it
                .source
                .and_then(|s| s.name)
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| NAME.to_string());
            let published = it
                .published_at
                .as_deref()
                .and_then(parse_rfc3339)
                .unwrap_or_else(Utc::now);

            let mut a = Article::new(title, url, format!("{NAME} / {publisher}"), published)
                .with_excerpt(desc)
                .with_tags(["news"]);
            a.author = it.author.filter(|s| !s.trim().is_empty());
            out.push(a);
        }

        histogram!("ingest_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        counter!("ingest_events_total").increment(out.len() as u64);
        Ok(out)
    }
}

#[async_trait]
impl SourceProvider for NewsApiProvider {
    async fn fetch_latest(&self) -> Result<Vec<Article>> {
        match &self.mode {
            Mode::Fixture(s) => self.parse_articles(s),
            Mode::Http { url, client } => {
                let Some(key) = self.settings.api_key.as_deref() else {
                    tracing::warn!(target: "ingest", source = NAME, "NEWS_API_KEY not set, skipping");
                    return Ok(Vec::new());
                };
                let page_size = self.settings.page_size.to_string();
                let body = client
                    .get(url)
                    .query(&[
                        ("q", self.settings.query.as_str()),
                        ("language", "en"),
                        ("sortBy", "publishedAt"),
                        ("pageSize", page_size.as_str()),
                        ("apiKey", key),
                    ])
                    .send()
                    .await
                    .map_err(|e| Error::source_unavailable(NAME, e))?
                    .text()
                    .await
                    .map_err(|e| Error::source_unavailable(NAME, e))?;
                // Error statuses carry a JSON body with `status: "error"`.
                self.parse_articles(&body)
            }
        }
    }

    fn name(&self) -> &str {
        NAME
    }
}
