//! Application configuration: TOML file with defaults for every field, then
//! environment overrides for secrets and deployment knobs.

pub mod ai;

use anyhow::{anyhow, Context, Result};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::ai::AiConfig;

pub const ENV_APP_CONFIG_PATH: &str = "APP_CONFIG_PATH";
pub const DEFAULT_APP_CONFIG_PATH: &str = "config/app.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// JSON snapshot location; `None` keeps the store in memory.
    pub store_path: Option<PathBuf>,
    pub app_url: String,
    pub schedule: ScheduleConfig,
    pub digest: DigestConfig,
    pub sources: SourcesConfig,
    pub enrich: EnrichConfig,
    pub ai: AiConfig,
    pub delivery: DeliveryConfig,
    /// Reconciled into the store on every start.
    pub seed_subscribers: Vec<SeedSubscriber>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store_path: Some(PathBuf::from("state/news_tracker.json")),
            app_url: "http://localhost:3000".to_string(),
            schedule: ScheduleConfig::default(),
            digest: DigestConfig::default(),
            sources: SourcesConfig::default(),
            enrich: EnrichConfig::default(),
            ai: AiConfig::default(),
            delivery: DeliveryConfig::default(),
            seed_subscribers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub ingest_interval_secs: u64,
    /// "HH:MM", UTC.
    pub digest_time_utc: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            ingest_interval_secs: 3600,
            digest_time_utc: "08:00".to_string(),
        }
    }
}

impl ScheduleConfig {
    pub fn digest_time(&self) -> Result<NaiveTime> {
        parse_hhmm(&self.digest_time_utc)
    }
}

pub fn parse_hhmm(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .with_context(|| format!("invalid HH:MM time '{s}'"))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DigestConfig {
    pub max_articles: usize,
    pub lookback_hours: i64,
    pub max_subscribers: usize,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            max_articles: 10,
            lookback_hours: 24,
            max_subscribers: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub hackernews: HackerNewsConfig,
    pub arxiv: ArxivConfig,
    pub newsapi: NewsApiConfig,
    pub feeds: Vec<FeedGroupConfig>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            hackernews: HackerNewsConfig::default(),
            arxiv: ArxivConfig::default(),
            newsapi: NewsApiConfig::default(),
            feeds: vec![FeedGroupConfig {
                name: "Medium".to_string(),
                urls: [
                    "artificial-intelligence",
                    "machine-learning",
                    "platform-engineering",
                    "mlops",
                ]
                .iter()
                .map(|t| format!("https://medium.com/feed/tag/{t}"))
                .collect(),
                max_items: 10,
                tags: vec!["medium".to_string()],
            }],
        }
    }
}

impl SourcesConfig {
    /// Display names of every enabled source, in registration order.
    pub fn source_names(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.hackernews.enabled {
            out.push("Hacker News".to_string());
        }
        if self.arxiv.enabled {
            out.push("arXiv".to_string());
        }
        if self.newsapi.enabled {
            out.push("NewsAPI".to_string());
        }
        out.extend(self.feeds.iter().map(|f| f.name.clone()));
        out
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HackerNewsConfig {
    pub enabled: bool,
    pub url: String,
    pub query: String,
    pub hits_per_page: u32,
    pub min_points: u32,
}

impl Default for HackerNewsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "https://hn.algolia.com/api/v1/search".to_string(),
            query: "AI machine learning LLM platform engineering".to_string(),
            hits_per_page: 30,
            min_points: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArxivConfig {
    pub enabled: bool,
    pub url: String,
    pub query: String,
    pub max_results: u32,
}

impl Default for ArxivConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "https://export.arxiv.org/api/query".to_string(),
            query: "all:LLM OR all:\"large language model\" OR all:\"AI agent\" OR all:\"foundation model\""
                .to_string(),
            max_results: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NewsApiConfig {
    pub enabled: bool,
    pub url: String,
    pub query: String,
    pub page_size: u32,
    /// Filled from NEWS_API_KEY; never read from the file.
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for NewsApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "https://newsapi.org/v2/everything".to_string(),
            query: "AI OR LLM OR \"machine learning\" OR \"platform engineering\" OR MLOps"
                .to_string(),
            page_size: 20,
            api_key: None,
        }
    }
}

/// One RSS adapter reading several feeds under a single display name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedGroupConfig {
    pub name: String,
    pub urls: Vec<String>,
    #[serde(default = "default_feed_max_items")]
    pub max_items: usize,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_feed_max_items() -> usize {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichConfig {
    pub min_excerpt_len: usize,
    pub timeout_secs: u64,
    pub concurrency: usize,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            min_excerpt_len: 80,
            timeout_secs: 8,
            concurrency: 10,
        }
    }
}

/// Secrets only come from the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    pub from_email: String,
    #[serde(skip)]
    pub resend_api_key: Option<String>,
    #[serde(skip)]
    pub smtp: Option<SmtpConfig>,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            from_email: "AI News Tracker <digest@example.com>".to_string(),
            resend_api_key: None,
            smtp: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub user: String,
    pub pass: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedSubscriber {
    pub name: String,
    pub email: String,
}

/// Parse `"Alice:alice@example.com,Bob:bob@example.com"`. Malformed entries are skipped.
pub fn parse_seed_subscribers(raw: &str) -> Vec<SeedSubscriber> {
    raw.split(',')
        .filter_map(|entry| {
            let (name, email) = entry.trim().split_once(':')?;
            let email = email.trim();
            if email.is_empty() {
                return None;
            }
            Some(SeedSubscriber {
                name: name.trim().to_string(),
                email: email.to_string(),
            })
        })
        .collect()
}

impl AppConfig {
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading app config from {}", path.display()))?;
        let cfg: AppConfig =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        Ok(cfg)
    }

    /// Resolve config using env var + fallbacks, then apply env overrides:
    /// 1) $APP_CONFIG_PATH
    /// 2) config/app.toml
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self> {
        let base = if let Ok(p) = std::env::var(ENV_APP_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("APP_CONFIG_PATH points to non-existent path"));
            }
            Self::load_from(&pb)?
        } else {
            let default_p = PathBuf::from(DEFAULT_APP_CONFIG_PATH);
            if default_p.exists() {
                Self::load_from(&default_p)?
            } else {
                Self::default()
            }
        };
        base.with_env_overrides()
    }

    pub fn with_env_overrides(mut self) -> Result<Self> {
        let var = |k: &str| std::env::var(k).ok().filter(|v| !v.trim().is_empty());

        if let Some(p) = var("STORE_PATH") {
            self.store_path = if p.eq_ignore_ascii_case("memory") {
                None
            } else {
                Some(PathBuf::from(p))
            };
        }
        if let Some(u) = var("APP_URL") {
            self.app_url = u;
        }
        if let Some(secs) = var("INGEST_INTERVAL_SECS") {
            self.schedule.ingest_interval_secs = secs
                .parse()
                .with_context(|| format!("INGEST_INTERVAL_SECS='{secs}'"))?;
        }
        if let Some(t) = var("DIGEST_TIME_UTC") {
            self.schedule.digest_time_utc = t;
        }
        // Validate early so a typo fails startup instead of the digest loop.
        self.schedule.digest_time()?;

        self.sources.newsapi.api_key = var("NEWS_API_KEY");
        self.delivery.resend_api_key = var("RESEND_API_KEY");
        if let Some(from) = var("FROM_EMAIL") {
            self.delivery.from_email = from;
        }
        if let Some(host) = var("SMTP_HOST") {
            self.delivery.smtp = Some(SmtpConfig {
                host,
                user: var("SMTP_USER").unwrap_or_default(),
                pass: var("SMTP_PASS").unwrap_or_default(),
            });
        }
        if let Some(seed) = var("SEED_SUBSCRIBERS") {
            self.seed_subscribers.extend(parse_seed_subscribers(&seed));
        }

        self.ai = self.ai.normalized();
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_parsing_skips_malformed_entries() {
        let v = parse_seed_subscribers(" Alice:alice@example.com, broken ,Bob: bob@x.io,:");
        assert_eq!(
            v,
            vec![
                SeedSubscriber {
                    name: "Alice".into(),
                    email: "alice@example.com".into()
                },
                SeedSubscriber {
                    name: "Bob".into(),
                    email: "bob@x.io".into()
                },
            ]
        );
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: AppConfig = toml::from_str(
            r#"
[schedule]
digest_time_utc = "07:30"

[[sources.feeds]]
name = "Platform Weekly"
urls = ["https://platformweekly.com/rss"]
"#,
        )
        .unwrap();
        assert_eq!(cfg.schedule.ingest_interval_secs, 3600);
        assert_eq!(
            cfg.schedule.digest_time().unwrap(),
            NaiveTime::from_hms_opt(7, 30, 0).unwrap()
        );
        assert_eq!(cfg.sources.feeds.len(), 1);
        assert_eq!(cfg.sources.feeds[0].max_items, 10);
        assert_eq!(cfg.digest.max_subscribers, 20);
        assert!(cfg.sources.source_names().contains(&"Platform Weekly".to_string()));
    }

    #[test]
    fn bad_digest_time_is_rejected() {
        assert!(parse_hhmm("25:00").is_err());
        assert!(parse_hhmm("08:05").is_ok());
    }
}
