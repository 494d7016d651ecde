//! AI News Tracker: binary entrypoint.
//! Loads configuration, opens the store, wires sources, AI analysis and
//! delivery into the pipeline, starts the scheduler and serves the HTTP API.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ai_news_tracker::analyze::{build_client_from_config, Batcher};
use ai_news_tracker::api::{self, AppState, ConfigSummary};
use ai_news_tracker::config::AppConfig;
use ai_news_tracker::digest::DigestSettings;
use ai_news_tracker::ingest::config::load_keywords_default;
use ai_news_tracker::ingest::enrich::Enricher;
use ai_news_tracker::ingest::providers::{build_providers, http_client};
use ai_news_tracker::ingest::Aggregator;
use ai_news_tracker::metrics::Metrics;
use ai_news_tracker::notify::{build_notifier, Dispatcher};
use ai_news_tracker::pipeline::{reconcile_seed_subscribers, Pipeline};
use ai_news_tracker::scheduler::{JobRunner, Scheduler, SchedulerCfg};
use ai_news_tracker::store::Store;

/// Shuttle may already own the global subscriber; then ours is skipped.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ai_news_tracker=info,warn"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    let res = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

async fn build_app() -> anyhow::Result<shuttle_axum::axum::Router> {
    let cfg = AppConfig::load_default().context("loading configuration")?;

    let store = match cfg.store_path.as_deref() {
        Some(p) => Store::open(p, cfg.digest.max_subscribers)
            .await
            .with_context(|| format!("opening store at {}", p.display()))?,
        None => Store::in_memory(cfg.digest.max_subscribers),
    };
    let store = Arc::new(store);
    reconcile_seed_subscribers(&store, &cfg.seed_subscribers).await?;

    let keywords = load_keywords_default()?;
    let client = http_client(Duration::from_secs(20)).context("building HTTP client")?;
    let aggregator = Aggregator::new(build_providers(&cfg.sources, &keywords, &client));
    tracing::info!(sources = ?aggregator.source_names(), keywords = keywords.len(), "sources registered");

    let batcher = Batcher::new(build_client_from_config(&cfg.ai), cfg.ai.batch_size);
    let notifier = build_notifier(&cfg.delivery);
    let summary = ConfigSummary::new(&cfg, batcher.is_enabled(), notifier.channel());

    let pipeline = Pipeline::new(aggregator, batcher, Arc::clone(&store), Dispatcher::new(notifier))
        .with_enricher(Enricher::new(client.clone(), &cfg.enrich))
        .with_digest_settings(DigestSettings::from_config(&cfg));
    let runner: Arc<dyn JobRunner> = Arc::new(pipeline);

    let scheduler = Scheduler::new(SchedulerCfg {
        ingest_interval: Duration::from_secs(cfg.schedule.ingest_interval_secs.max(60)),
        digest_time: cfg.schedule.digest_time()?,
    });
    scheduler.spawn(Arc::clone(&runner));

    let state = AppState {
        store,
        scheduler,
        runner,
        config: Arc::new(summary),
    };
    let mut router = api::router(state);
    match Metrics::init(cfg.schedule.ingest_interval_secs) {
        Ok(m) => router = router.merge(m.router()),
        Err(e) => tracing::warn!(error = %e, "metrics disabled"),
    }
    Ok(router)
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let router = build_app().await?;
    Ok(router.into())
}
