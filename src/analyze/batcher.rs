//! Batch analysis: chunk articles, call the AI once per chunk, correlate the
//! answers back by id and fold them into the articles.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use metrics::counter;
use serde::Serialize;

use crate::analyze::ai_adapter::{AnalysisItem, AnalysisResult, DynAiClient};
use crate::config::ai::MAX_BATCH_SIZE;
use crate::error::Error;
use crate::ingest::truncate_chars;
use crate::model::{Article, Category, Competitor};

const MAX_TAGS: usize = 5;
const MAX_COMPETITORS: usize = 3;
const EXCERPT_FOR_PROMPT: usize = 600;

#[derive(Debug, Default, Clone, Serialize, PartialEq, Eq)]
pub struct AnalysisReport {
    pub analyzed: usize,
    pub unanalyzed: usize,
    pub failed_batches: usize,
}

pub struct Batcher {
    client: DynAiClient,
    batch_size: usize,
    disabled_logged: AtomicBool,
}

impl Batcher {
    pub fn new(client: DynAiClient, batch_size: usize) -> Self {
        Self {
            client,
            batch_size: batch_size.clamp(1, MAX_BATCH_SIZE),
            disabled_logged: AtomicBool::new(false),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.client.is_enabled()
    }

    /// Every input article comes back; the ones the AI answered for carry
    /// their analysis, the rest are unchanged.
    pub async fn analyze(&self, articles: Vec<Article>) -> (Vec<Article>, AnalysisReport) {
        let mut report = AnalysisReport::default();
        if articles.is_empty() {
            return (articles, report);
        }
        if !self.client.is_enabled() {
            if !self.disabled_logged.swap(true, Ordering::Relaxed) {
                tracing::info!(target: "analyze", "AI analysis disabled, articles stay unanalyzed");
            }
            report.unanalyzed = articles.len();
            return (articles, report);
        }

        let chunks: Vec<Vec<Article>> = articles
            .chunks(self.batch_size)
            .map(<[Article]>::to_vec)
            .collect();
        let done = join_all(chunks.into_iter().map(|c| self.analyze_chunk(c))).await;

        let mut out = Vec::new();
        for (chunk, failed) in done {
            if failed {
                report.failed_batches += 1;
            }
            for a in &chunk {
                if a.is_analyzed() {
                    report.analyzed += 1;
                } else {
                    report.unanalyzed += 1;
                }
            }
            out.extend(chunk);
        }
        counter!("articles_analyzed_total").increment(report.analyzed as u64);
        (out, report)
    }

    /// Returns the chunk and whether the AI call itself failed.
    async fn analyze_chunk(&self, mut chunk: Vec<Article>) -> (Vec<Article>, bool) {
        counter!("analysis_batches_total").increment(1);
        let items: Vec<AnalysisItem> = chunk
            .iter()
            .enumerate()
            .map(|(i, a)| AnalysisItem {
                id: i + 1,
                title: a.title.clone(),
                excerpt: truncate_chars(a.body_text(), EXCERPT_FOR_PROMPT),
                source: a.source.clone(),
            })
            .collect();

        let results = match self.client.analyze_batch(&items).await {
            Ok(r) => r,
            Err(e) => {
                counter!("analysis_batch_failures_total").increment(1);
                tracing::warn!(target: "analyze", error = %e, provider = self.client.provider_name(), "batch failed");
                return (chunk, true);
            }
        };

        let mut by_id: HashMap<i64, AnalysisResult> = HashMap::with_capacity(results.len());
        for r in results {
            by_id.entry(r.id).or_insert(r);
        }

        let now = Utc::now();
        let mut missing = 0usize;
        for (i, a) in chunk.iter_mut().enumerate() {
            match by_id.remove(&((i + 1) as i64)) {
                Some(r) => apply_result(a, r, now),
                None => missing += 1,
            }
        }
        if missing > 0 {
            let e = Error::batch_failed(missing, "no result returned for article");
            tracing::warn!(target: "analyze", error = %e, "partial batch response");
        }
        (chunk, false)
    }
}

fn clean(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|v| clean(&v)).filter(|v| !v.is_empty())
}

/// Fold one AI answer into its article, normalizing what the model returned.
pub fn apply_result(a: &mut Article, r: AnalysisResult, now: DateTime<Utc>) {
    let summary = clean(&r.summary);
    if !summary.is_empty() {
        a.summary = Some(summary);
    }
    a.category = Category::from_ai_label(&r.category);
    a.relevance_score = Some(r.relevance_score.clamp(1, 10) as u8);
    a.tags.extend(
        r.tags
            .iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .take(MAX_TAGS),
    );

    let product = if r.is_product_or_tool {
        non_empty(r.product_name)
    } else {
        None
    };
    if product.is_some() {
        a.competitors = r
            .competitors
            .into_iter()
            .filter(|c| !c.name.trim().is_empty())
            .take(MAX_COMPETITORS)
            .map(|c| Competitor {
                name: clean(&c.name),
                description: clean(&c.description),
                comparison: clean(&c.comparison),
            })
            .collect();
        a.competitive_advantage = non_empty(r.competitive_advantage);
    } else {
        a.competitors.clear();
        a.competitive_advantage = None;
    }
    a.product_name = product;
    a.analyzed_at = Some(now);
}
