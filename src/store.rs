//! Keyed record of articles, subscribers and the digest audit log.
//!
//! All state sits behind one async `RwLock`. When a snapshot path is set the
//! whole state is written as one JSON document (temp file + rename) after
//! every mutation, while the write lock is still held, so snapshots land in
//! mutation order.

use std::cmp::Reverse;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::model::{normalize_email, Article, Category, DigestRecord, Subscriber};

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct State {
    #[serde(default)]
    articles: BTreeMap<String, Article>,
    #[serde(default)]
    subscribers: Vec<Subscriber>,
    #[serde(default)]
    digest_log: Vec<DigestRecord>,
}

/// Filters for `query_articles`. Field names double as HTTP query parameters.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct ArticleQuery {
    pub category: Option<String>,
    pub source: Option<String>,
    pub min_relevance: Option<u8>,
    pub search: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl ArticleQuery {
    pub fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ArticlePage {
    pub articles: Vec<Article>,
    /// Articles on this page.
    pub count: usize,
    /// Matches before pagination.
    pub total: usize,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct StoreStats {
    pub total_articles: usize,
    pub analyzed_articles: usize,
    pub product_articles: usize,
    pub by_category: BTreeMap<String, usize>,
    pub by_source: BTreeMap<String, usize>,
    pub active_subscribers: usize,
    pub digests_sent: usize,
    pub last_fetched_at: Option<DateTime<Utc>>,
}

pub struct Store {
    state: RwLock<State>,
    path: Option<PathBuf>,
    max_subscribers: usize,
}

impl Store {
    pub fn in_memory(max_subscribers: usize) -> Self {
        Self {
            state: RwLock::new(State::default()),
            path: None,
            max_subscribers,
        }
    }

    /// Load the snapshot at `path` if it exists; a missing file starts empty.
    pub async fn open(path: impl AsRef<Path>, max_subscribers: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let state = match tokio::fs::read_to_string(&path).await {
            Ok(s) if !s.trim().is_empty() => serde_json::from_str(&s)?,
            Ok(_) => State::default(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => State::default(),
            Err(e) => return Err(e.into()),
        };
        tracing::info!(
            target: "store",
            path = %path.display(),
            articles = state.articles.len(),
            subscribers = state.subscribers.len(),
            "store opened"
        );
        Ok(Self {
            state: RwLock::new(state),
            path: Some(path),
            max_subscribers,
        })
    }

    pub fn max_subscribers(&self) -> usize {
        self.max_subscribers
    }

    async fn persist(&self, state: &State) -> Result<()> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };
        write_snapshot(path, state).await.map_err(|e| {
            metrics::counter!("store_persist_failures_total").increment(1);
            Error::Store(format!("persist {}: {e}", path.display()))
        })
    }

    // ---------------- articles ----------------

    pub async fn upsert_article(&self, article: Article) -> Result<()> {
        self.upsert_articles(vec![article]).await
    }

    pub async fn upsert_articles(&self, batch: Vec<Article>) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut g = self.state.write().await;
        for a in batch {
            match g.articles.entry(a.fingerprint.clone()) {
                Entry::Occupied(mut e) => e.get_mut().merge_from(a),
                Entry::Vacant(e) => {
                    e.insert(a);
                }
            }
        }
        self.persist(&g).await
    }

    pub async fn get_article(&self, fingerprint: &str) -> Option<Article> {
        self.state.read().await.articles.get(fingerprint).cloned()
    }

    pub async fn article_count(&self) -> usize {
        self.state.read().await.articles.len()
    }

    pub async fn query_articles(&self, q: &ArticleQuery) -> Result<ArticlePage> {
        let category = match q.category.as_deref().map(str::trim) {
            Some(c) if !c.is_empty() => Some(c.parse::<Category>().map_err(Error::InvalidInput)?),
            _ => None,
        };
        let source = q.source.as_deref().map(|s| s.trim().to_lowercase()).filter(|s| !s.is_empty());
        let search = q.search.as_deref().map(|s| s.trim().to_lowercase()).filter(|s| !s.is_empty());

        let g = self.state.read().await;
        let mut hits: Vec<&Article> = g
            .articles
            .values()
            .filter(|a| category.map_or(true, |c| a.category == c))
            .filter(|a| {
                source
                    .as_deref()
                    .map_or(true, |s| a.source.to_lowercase().contains(s))
            })
            .filter(|a| {
                q.min_relevance
                    .map_or(true, |m| a.relevance_score.is_some_and(|r| r >= m))
            })
            .filter(|a| {
                search.as_deref().map_or(true, |s| {
                    a.title.to_lowercase().contains(s)
                        || a.summary.as_deref().unwrap_or_default().to_lowercase().contains(s)
                })
            })
            .collect();
        hits.sort_by_key(|a| (Reverse(a.relevance_score), Reverse(a.published_at)));

        let total = hits.len();
        let articles: Vec<Article> = hits
            .into_iter()
            .skip(q.offset.unwrap_or(0))
            .take(q.effective_limit())
            .cloned()
            .collect();
        Ok(ArticlePage {
            count: articles.len(),
            total,
            articles,
        })
    }

    /// Of the given fingerprints, those that are unknown or not yet analyzed.
    pub async fn articles_needing_analysis(&self, fingerprints: &[String]) -> BTreeSet<String> {
        let g = self.state.read().await;
        fingerprints
            .iter()
            .filter(|fp| !g.articles.get(*fp).is_some_and(Article::is_analyzed))
            .cloned()
            .collect()
    }

    /// Analyzed articles analyzed or published at/after `since`.
    pub async fn digest_candidates(&self, since: DateTime<Utc>) -> Vec<Article> {
        let g = self.state.read().await;
        g.articles
            .values()
            .filter(|a| a.is_analyzed())
            .filter(|a| a.published_at >= since || a.analyzed_at.is_some_and(|t| t >= since))
            .cloned()
            .collect()
    }

    pub async fn stats(&self) -> StoreStats {
        let g = self.state.read().await;
        let mut s = StoreStats {
            total_articles: g.articles.len(),
            ..StoreStats::default()
        };
        for a in g.articles.values() {
            if a.is_analyzed() {
                s.analyzed_articles += 1;
            }
            if a.is_product() {
                s.product_articles += 1;
            }
            *s.by_category.entry(a.category.to_string()).or_default() += 1;
            *s.by_source.entry(a.source.clone()).or_default() += 1;
            s.last_fetched_at = s.last_fetched_at.max(Some(a.fetched_at));
        }
        s.active_subscribers = g.subscribers.iter().filter(|x| x.active).count();
        s.digests_sent = g.digest_log.iter().filter(|r| r.outcome.is_sent()).count();
        s
    }

    // ---------------- subscribers ----------------

    pub async fn list_subscribers(&self) -> Vec<Subscriber> {
        self.state.read().await.subscribers.clone()
    }

    pub async fn list_active_subscribers(&self) -> Vec<Subscriber> {
        let g = self.state.read().await;
        g.subscribers.iter().filter(|s| s.active).cloned().collect()
    }

    /// Insert, or update preferences of an existing email in place. A new
    /// active subscriber beyond the cap fails without touching the set.
    pub async fn add_subscriber(&self, sub: Subscriber) -> Result<Subscriber> {
        let sub = Subscriber {
            email: normalize_email(&sub.email),
            ..sub
        };
        validate_email(&sub.email)?;

        let mut g = self.state.write().await;
        let active = g.subscribers.iter().filter(|s| s.active).count();
        let stored = match g.subscribers.iter().position(|s| s.email == sub.email) {
            Some(i) => {
                let existing = &mut g.subscribers[i];
                if sub.active && !existing.active && active >= self.max_subscribers {
                    return Err(Error::CapacityExceeded {
                        max: self.max_subscribers,
                    });
                }
                if !sub.name.is_empty() {
                    existing.name = sub.name;
                }
                existing.min_relevance = sub.min_relevance;
                existing.categories = sub.categories;
                existing.active = sub.active;
                existing.clone()
            }
            None => {
                if sub.active && active >= self.max_subscribers {
                    return Err(Error::CapacityExceeded {
                        max: self.max_subscribers,
                    });
                }
                g.subscribers.push(sub.clone());
                sub
            }
        };
        self.persist(&g).await?;
        Ok(stored)
    }

    pub async fn remove_subscriber(&self, email: &str) -> Result<()> {
        let email = normalize_email(email);
        let mut g = self.state.write().await;
        let before = g.subscribers.len();
        g.subscribers.retain(|s| s.email != email);
        if g.subscribers.len() == before {
            return Err(Error::NotFound(format!("subscriber {email}")));
        }
        self.persist(&g).await
    }

    // ---------------- digest audit ----------------

    pub async fn append_digest_records(&self, records: Vec<DigestRecord>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut g = self.state.write().await;
        g.digest_log.extend(records);
        self.persist(&g).await
    }

    pub async fn append_digest_record(&self, record: DigestRecord) -> Result<()> {
        self.append_digest_records(vec![record]).await
    }

    /// Newest first.
    pub async fn digest_log(&self, limit: usize) -> Vec<DigestRecord> {
        let g = self.state.read().await;
        g.digest_log.iter().rev().take(limit).cloned().collect()
    }
}

pub fn validate_email(email: &str) -> Result<()> {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !email.contains(' ') => {
            Ok(())
        }
        _ => Err(Error::InvalidInput(format!("invalid email '{email}'"))),
    }
}

async fn write_snapshot(path: &Path, state: &State) -> std::io::Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir).await?;
    }
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_vec_pretty(state)?;
    tokio::fs::write(&tmp, json).await?;
    tokio::fs::rename(&tmp, path).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation() {
        assert!(validate_email("a@b.io").is_ok());
        assert!(validate_email("nobody").is_err());
        assert!(validate_email("@b.io").is_err());
        assert!(validate_email("a b@c.io").is_err());
    }

    #[test]
    fn page_size_is_clamped() {
        let q = ArticleQuery {
            limit: Some(1000),
            ..Default::default()
        };
        assert_eq!(q.effective_limit(), MAX_PAGE_SIZE);
        assert_eq!(ArticleQuery::default().effective_limit(), DEFAULT_PAGE_SIZE);
    }
}
