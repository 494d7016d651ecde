//! Best-effort excerpt enrichment: pull a page-level description for articles
//! that arrive with little or no body text.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use metrics::counter;
use once_cell::sync::OnceCell;
use regex::Regex;
use tokio::sync::Semaphore;

use crate::config::EnrichConfig;
use crate::error::{Error, Result};
use crate::ingest::{normalize_text, truncate_chars};
use crate::model::Article;

const MIN_DESCRIPTION_CHARS: usize = 40;
const MAX_DESCRIPTION_CHARS: usize = 500;

pub struct Enricher {
    client: reqwest::Client,
    min_excerpt_len: usize,
    timeout: Duration,
    permits: Arc<Semaphore>,
}

impl Enricher {
    pub fn new(client: reqwest::Client, cfg: &EnrichConfig) -> Self {
        Self {
            client,
            min_excerpt_len: cfg.min_excerpt_len,
            timeout: Duration::from_secs(cfg.timeout_secs.max(1)),
            permits: Arc::new(Semaphore::new(cfg.concurrency.max(1))),
        }
    }

    pub fn needs_enrichment(&self, a: &Article) -> bool {
        a.body_text().chars().count() < self.min_excerpt_len
            && !a.url.is_empty()
            && !a.url.starts_with("https://news.ycombinator.com")
    }

    /// Enrich every article that needs it, concurrently. Failures leave the
    /// article untouched.
    pub async fn enrich_all(&self, articles: Vec<Article>) -> Vec<Article> {
        join_all(articles.into_iter().map(|a| self.enrich_one(a))).await
    }

    async fn enrich_one(&self, mut a: Article) -> Article {
        if !self.needs_enrichment(&a) {
            return a;
        }
        match self.fetch_description(&a.url).await {
            Ok(desc) => {
                tracing::debug!(target: "enrich", url = %a.url, "description found");
                a.enriched_excerpt = Some(desc);
            }
            Err(e) => {
                counter!("enrich_failures_total").increment(1);
                tracing::debug!(target: "enrich", error = %e, "enrichment skipped");
            }
        }
        a
    }

    pub async fn fetch_description(&self, url: &str) -> Result<String> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| Error::enrichment(url, e))?;

        let fetch = async {
            let resp = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| Error::enrichment(url, e))?;
            if !resp.status().is_success() {
                return Err(Error::enrichment(url, format!("status {}", resp.status())));
            }
            let is_html = resp
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|ct| ct.contains("html"));
            if !is_html {
                return Err(Error::enrichment(url, "not an html page"));
            }
            resp.text().await.map_err(|e| Error::enrichment(url, e))
        };

        let html = tokio::time::timeout(self.timeout, fetch)
            .await
            .map_err(|_| Error::enrichment(url, "timed out"))??;

        extract_description(&html).ok_or_else(|| Error::enrichment(url, "no description meta"))
    }
}

/// Attribute value in either quote style; the other quote may appear inside.
const QUOTED: &str = r#"(?:"([^"]*)"|'([^']*)')"#;

/// `og:description` first, then `<meta name="description">`, in either attribute order.
pub fn extract_description(html: &str) -> Option<String> {
    static PATTERNS: OnceCell<Vec<Regex>> = OnceCell::new();
    let patterns = PATTERNS.get_or_init(|| {
        [
            format!(r#"(?is)<meta[^>]+property=["']og:description["'][^>]*?\scontent={QUOTED}"#),
            format!(r#"(?is)<meta[^>]*?\scontent={QUOTED}[^>]*?\sproperty=["']og:description["']"#),
            format!(r#"(?is)<meta[^>]+name=["']description["'][^>]*?\scontent={QUOTED}"#),
            format!(r#"(?is)<meta[^>]*?\scontent={QUOTED}[^>]*?\sname=["']description["']"#),
        ]
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect()
    });

    patterns.iter().find_map(|re| {
        let caps = re.captures(html)?;
        let raw = caps.get(1).or_else(|| caps.get(2))?.as_str();
        let desc = truncate_chars(&normalize_text(raw), MAX_DESCRIPTION_CHARS);
        (desc.chars().count() > MIN_DESCRIPTION_CHARS).then_some(desc)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_og_description_in_either_order() {
        let a = r#"<head><meta property="og:description" content="A fast vector database written in Rust for RAG workloads"></head>"#;
        let b = r#"<meta content='A fast vector database written in Rust for RAG workloads' name='description'/>"#;
        assert_eq!(
            extract_description(a).as_deref(),
            Some("A fast vector database written in Rust for RAG workloads")
        );
        assert_eq!(extract_description(a), extract_description(b));
    }

    #[test]
    fn apostrophes_inside_double_quotes_are_kept() {
        let html = r#"<meta property="og:description" content="OpenAI's newest reasoning model beats every benchmark we've thrown at it so far">"#;
        assert_eq!(
            extract_description(html).as_deref(),
            Some("OpenAI's newest reasoning model beats every benchmark we've thrown at it so far")
        );
        let single = r#"<meta content='The "agentic" toolkit ships a planner, a memory store and evals' name='description'>"#;
        assert_eq!(
            extract_description(single).as_deref(),
            Some(r#"The "agentic" toolkit ships a planner, a memory store and evals"#)
        );
    }

    #[test]
    fn short_descriptions_are_ignored() {
        let html = r#"<meta name="description" content="Home">"#;
        assert!(extract_description(html).is_none());
    }
}
