use anyhow::Context;
use metrics::{describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use shuttle_axum::axum::{routing::get, Router};

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder and describe the job-level series.
    pub fn init(ingest_interval_secs: u64) -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;

        describe_counter!("job_runs_total", "Completed job runs by job.");
        describe_counter!("job_failures_total", "Job runs that ended in an error.");
        describe_counter!("job_skipped_total", "Job starts refused because the job was running.");
        describe_gauge!("job_last_run_ts", "Unix ts of the last finished run by job.");
        describe_counter!("analysis_batches_total", "AI analysis calls attempted.");
        describe_counter!("analysis_batch_failures_total", "AI analysis calls that failed.");
        describe_counter!("articles_analyzed_total", "Articles that received an analysis.");
        describe_counter!("enrich_failures_total", "Excerpt enrichment fetches that failed.");
        describe_counter!("digest_sent_total", "Digests delivered by channel.");
        describe_counter!("digest_failed_total", "Digest deliveries that failed by channel.");
        describe_counter!("digest_skipped_total", "Empty digests that were not sent.");
        describe_counter!("store_persist_failures_total", "Failed store snapshot writes.");
        describe_gauge!("articles_stored", "Articles held by the store.");
        describe_gauge!("ingest_interval_secs", "Configured ingestion interval.");

        gauge!("ingest_interval_secs").set(ingest_interval_secs as f64);

        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
