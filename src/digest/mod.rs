//! Per-subscriber digest: pick the articles a subscriber cares about and render them.
//! Everything here is a pure function of the candidates, the subscriber and `now`.

pub mod render;

use std::cmp::Reverse;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::config::AppConfig;
use crate::model::{Article, Subscriber};

#[derive(Debug, Clone)]
pub struct DigestSettings {
    pub max_articles: usize,
    pub lookback: Duration,
    pub app_url: String,
}

impl Default for DigestSettings {
    fn default() -> Self {
        Self {
            max_articles: 10,
            lookback: Duration::hours(24),
            app_url: String::new(),
        }
    }
}

impl DigestSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            max_articles: cfg.digest.max_articles.max(1),
            lookback: Duration::hours(cfg.digest.lookback_hours.max(1)),
            app_url: cfg.app_url.clone(),
        }
    }
}

/// A rendered digest, ready for delivery.
#[derive(Debug, Clone, Serialize)]
pub struct Digest {
    pub recipient: String,
    pub name: String,
    pub subject: String,
    pub html: String,
    pub text: String,
    pub article_count: usize,
}

impl Digest {
    pub fn is_empty(&self) -> bool {
        self.article_count == 0
    }
}

fn within_window(a: &Article, since: DateTime<Utc>) -> bool {
    a.published_at >= since || a.analyzed_at.is_some_and(|t| t >= since)
}

/// Analyzed articles above the subscriber's threshold, in wanted categories and
/// inside the look-back window; best first, capped.
pub fn select_articles(
    sub: &Subscriber,
    candidates: &[Article],
    now: DateTime<Utc>,
    settings: &DigestSettings,
) -> Vec<Article> {
    let since = now - settings.lookback;
    let mut picked: Vec<&Article> = candidates
        .iter()
        .filter(|a| a.is_analyzed())
        .filter(|a| a.relevance_score.is_some_and(|r| r >= sub.min_relevance))
        .filter(|a| sub.wants(a.category))
        .filter(|a| within_window(a, since))
        .collect();
    picked.sort_by_key(|a| (Reverse(a.relevance_score), Reverse(a.published_at)));
    picked
        .into_iter()
        .take(settings.max_articles)
        .cloned()
        .collect()
}

pub fn build_digest(
    sub: &Subscriber,
    candidates: &[Article],
    now: DateTime<Utc>,
    settings: &DigestSettings,
) -> Digest {
    let articles = select_articles(sub, candidates, now, settings);
    let subject = render::subject(now, articles.len());
    Digest {
        recipient: sub.email.clone(),
        name: sub.name.clone(),
        html: render::html(sub, &articles, now, &settings.app_url),
        text: render::text(sub, &articles, now, &settings.app_url),
        article_count: articles.len(),
        subject,
    }
}
