// src/pipeline.rs
//! The two jobs: ingestion (aggregate, store, enrich, analyze, store) and the
//! daily digest (select, render, deliver, audit).

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::gauge;
use serde::Serialize;

use crate::analyze::{AnalysisReport, Batcher};
use crate::config::SeedSubscriber;
use crate::digest::{build_digest, DigestSettings};
use crate::error::{Error, Result};
use crate::ingest::enrich::Enricher;
use crate::ingest::Aggregator;
use crate::model::{Article, Subscriber};
use crate::notify::Dispatcher;
use crate::scheduler::{JobKind, JobRunner};
use crate::store::Store;

#[derive(Debug, Default, Clone, Serialize)]
pub struct IngestionReport {
    pub fetched: usize,
    pub unique: usize,
    pub source_failures: usize,
    pub pending_analysis: usize,
    pub enriched: usize,
    pub analysis: AnalysisReport,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct DigestRunReport {
    pub subscribers: usize,
    pub sent: usize,
    pub failed: usize,
    pub skipped: usize,
}

pub struct Pipeline {
    aggregator: Aggregator,
    enricher: Option<Enricher>,
    batcher: Batcher,
    store: Arc<Store>,
    dispatcher: Dispatcher,
    digest: DigestSettings,
}

impl Pipeline {
    pub fn new(aggregator: Aggregator, batcher: Batcher, store: Arc<Store>, dispatcher: Dispatcher) -> Self {
        Self {
            aggregator,
            enricher: None,
            batcher,
            store,
            dispatcher,
            digest: DigestSettings::default(),
        }
    }

    pub fn with_enricher(mut self, enricher: Enricher) -> Self {
        self.enricher = Some(enricher);
        self
    }

    pub fn with_digest_settings(mut self, settings: DigestSettings) -> Self {
        self.digest = settings;
        self
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub async fn run_ingestion(&self) -> Result<IngestionReport> {
        let agg = self.aggregator.run_once().await;
        let mut report = IngestionReport {
            fetched: agg.fetched,
            unique: agg.articles.len(),
            source_failures: agg.failures.len(),
            ..Default::default()
        };

        let fingerprints: Vec<String> = agg.articles.iter().map(|a| a.fingerprint.clone()).collect();
        let pending_fps: BTreeSet<String> = self.store.articles_needing_analysis(&fingerprints).await;
        self.store.upsert_articles(agg.articles.clone()).await?;

        let mut pending: Vec<Article> = agg
            .articles
            .into_iter()
            .filter(|a| pending_fps.contains(&a.fingerprint))
            .collect();
        report.pending_analysis = pending.len();

        if let Some(enricher) = &self.enricher {
            pending = enricher.enrich_all(pending).await;
            report.enriched = pending.iter().filter(|a| a.enriched_excerpt.is_some()).count();
        }

        let (processed, analysis) = self.batcher.analyze(pending).await;
        report.analysis = analysis;
        self.store.upsert_articles(processed).await?;

        gauge!("articles_stored").set(self.store.article_count().await as f64);
        tracing::info!(
            target: "pipeline",
            fetched = report.fetched,
            unique = report.unique,
            source_failures = report.source_failures,
            pending = report.pending_analysis,
            enriched = report.enriched,
            analyzed = report.analysis.analyzed,
            "ingestion finished"
        );
        Ok(report)
    }

    pub async fn run_digest(&self, now: DateTime<Utc>) -> Result<DigestRunReport> {
        let subscribers = self.store.list_active_subscribers().await;
        if subscribers.is_empty() {
            tracing::info!(target: "pipeline", "no active subscribers, digest skipped");
            return Ok(DigestRunReport::default());
        }

        let candidates = self.store.digest_candidates(now - self.digest.lookback).await;
        let digests = subscribers
            .iter()
            .map(|s| build_digest(s, &candidates, now, &self.digest))
            .collect();

        let dispatched = self.dispatcher.dispatch(digests, now).await;
        let report = DigestRunReport {
            subscribers: subscribers.len(),
            sent: dispatched.sent,
            failed: dispatched.failed,
            skipped: dispatched.skipped,
        };
        self.store.append_digest_records(dispatched.records).await?;

        tracing::info!(
            target: "pipeline",
            channel = self.dispatcher.channel(),
            subscribers = report.subscribers,
            sent = report.sent,
            failed = report.failed,
            skipped = report.skipped,
            "digest finished"
        );
        Ok(report)
    }
}

#[async_trait]
impl JobRunner for Pipeline {
    async fn run_job(&self, kind: JobKind) -> Result<()> {
        match kind {
            JobKind::Ingestion => self.run_ingestion().await.map(|_| ()),
            JobKind::Digest => self.run_digest(Utc::now()).await.map(|_| ()),
        }
    }
}

/// Add configured seed subscribers that are not in the store yet. Existing
/// entries keep their preferences; seeds over the cap are logged and skipped.
pub async fn reconcile_seed_subscribers(store: &Store, seeds: &[SeedSubscriber]) -> Result<usize> {
    let known: BTreeSet<String> = store
        .list_subscribers()
        .await
        .into_iter()
        .map(|s| s.email)
        .collect();

    let mut added = 0;
    for seed in seeds {
        let sub = Subscriber::new(&seed.email, &seed.name);
        if known.contains(&sub.email) {
            continue;
        }
        match store.add_subscriber(sub).await {
            Ok(_) => added += 1,
            Err(e @ (Error::CapacityExceeded { .. } | Error::InvalidInput(_))) => {
                tracing::warn!(target: "pipeline", email = %seed.email, error = %e, "seed subscriber skipped");
            }
            Err(e) => return Err(e),
        }
    }
    if added > 0 {
        tracing::info!(target: "pipeline", added, "seed subscribers added");
    }
    Ok(added)
}
