// src/ingest/mod.rs
pub mod config;
pub mod enrich;
pub mod providers;
pub mod types;

use crate::error::Error;
use crate::ingest::types::SourceProvider;
use crate::model::Article;
use futures::future::join_all;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge};
use once_cell::sync::OnceCell;
use std::collections::HashMap;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "ingest_events_total",
            "Candidate articles parsed from sources."
        );
        describe_counter!(
            "ingest_kept_total",
            "Articles kept after fingerprint deduplication."
        );
        describe_counter!(
            "ingest_dedup_total",
            "Articles collapsed into an existing fingerprint."
        );
        describe_counter!(
            "ingest_provider_errors_total",
            "Source fetch/parse errors."
        );
        describe_histogram!("ingest_parse_ms", "Source parse time in milliseconds.");
        describe_gauge!(
            "ingest_pipeline_last_run_ts",
            "Unix ts when the aggregator last ran."
        );
    });
}

/// Max characters kept from any source body.
pub const MAX_EXCERPT_CHARS: usize = 1500;

/// Normalize text: decode entities, strip tags, straighten quotes, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    truncate_chars(&out, MAX_EXCERPT_CHARS)
}

pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        s.chars().take(max).collect()
    } else {
        s.to_string()
    }
}

/// Case-insensitive keyword match over title + body. An empty keyword list accepts everything.
pub fn is_relevant(title: &str, body: &str, keywords: &[String]) -> bool {
    if keywords.is_empty() {
        return true;
    }
    let text = format!("{title} {body}").to_lowercase();
    keywords.iter().any(|kw| text.contains(&kw.to_lowercase()))
}

/// Collapse articles sharing a fingerprint. The most recently fetched
/// representation wins; the older one only fills gaps it leaves empty.
/// Output is ordered by source points, then publication time, descending.
pub fn merge_dedup(raw: Vec<Article>) -> (Vec<Article>, usize) {
    let mut by_fp: HashMap<String, Article> = HashMap::with_capacity(raw.len());
    let mut dedup = 0usize;

    for a in raw {
        match by_fp.remove(&a.fingerprint) {
            None => {
                by_fp.insert(a.fingerprint.clone(), a);
            }
            Some(prev) => {
                dedup += 1;
                let (mut base, newer) = if a.fetched_at >= prev.fetched_at {
                    (prev, a)
                } else {
                    (a, prev)
                };
                base.merge_from(newer);
                by_fp.insert(base.fingerprint.clone(), base);
            }
        }
    }

    let mut out: Vec<Article> = by_fp.into_values().collect();
    out.sort_by(|a, b| {
        b.points
            .cmp(&a.points)
            .then(b.published_at.cmp(&a.published_at))
            .then(a.fingerprint.cmp(&b.fingerprint))
    });
    (out, dedup)
}

/// Result of one aggregation pass.
#[derive(Debug, Default)]
pub struct AggregateReport {
    pub articles: Vec<Article>,
    pub failures: Vec<Error>,
    pub fetched: usize,
    pub dedup: usize,
}

/// Fans out to every registered source concurrently and merges the results.
pub struct Aggregator {
    providers: Vec<Box<dyn SourceProvider>>,
}

impl Aggregator {
    pub fn new(providers: Vec<Box<dyn SourceProvider>>) -> Self {
        Self { providers }
    }

    pub fn source_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    /// Run every source once. Failed sources are reported, never fatal.
    pub async fn run_once(&self) -> AggregateReport {
        ensure_metrics_described();

        let results = join_all(
            self.providers
                .iter()
                .map(|p| async move { (p.name(), p.fetch_latest().await) }),
        )
        .await;

        let mut raw = Vec::new();
        let mut failures = Vec::new();
        for (name, res) in results {
            match res {
                Ok(mut v) => {
                    tracing::info!(target: "ingest", source = name, count = v.len(), "source fetched");
                    raw.append(&mut v);
                }
                Err(e) => {
                    tracing::warn!(target: "ingest", error = %e, source = name, "source error");
                    counter!("ingest_provider_errors_total", "source" => name.to_string())
                        .increment(1);
                    failures.push(e);
                }
            }
        }

        let fetched = raw.len();
        let (articles, dedup) = merge_dedup(raw);

        counter!("ingest_kept_total").increment(articles.len() as u64);
        counter!("ingest_dedup_total").increment(dedup as u64);
        gauge!("ingest_pipeline_last_run_ts").set(chrono::Utc::now().timestamp() as f64);

        AggregateReport {
            articles,
            failures,
            fetched,
            dedup,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn normalize_text_strips_tags_and_collapses_ws() {
        let s = "  <p>Hello,&nbsp;&nbsp; <b>world</b>!</p>  ";
        assert_eq!(normalize_text(s), "Hello, world !");
    }

    #[test]
    fn keyword_matching_is_case_insensitive() {
        let kw = vec!["LLM".to_string(), "platform engineering".into()];
        assert!(is_relevant("New llm release", "", &kw));
        assert!(is_relevant("Weekly", "All about Platform Engineering", &kw));
        assert!(!is_relevant("Gardening tips", "tomatoes", &kw));
        assert!(is_relevant("anything", "", &[]));
    }

    #[test]
    fn dedup_keeps_most_recent_and_fills_gaps() {
        let t0 = Utc.with_ymd_and_hms(2025, 5, 1, 10, 0, 0).unwrap();
        let mut older = Article::new("Old title", "https://a.io/x", "HN", t0).with_excerpt("old body");
        older.fetched_at = t0;
        let mut newer = Article::new("New title", "https://A.io/x/?ref=rss", "Medium", t0);
        newer.fetched_at = t0 + Duration::minutes(5);

        let (out, dedup) = merge_dedup(vec![newer, older]);
        assert_eq!(dedup, 1);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].title, "New title");
        assert_eq!(out[0].source, "Medium");
        assert_eq!(out[0].excerpt, "old body");
    }
}
