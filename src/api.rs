use std::sync::Arc;

use serde::{Deserialize, Serialize};
use shuttle_axum::axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::config::AppConfig;
use crate::error::Error;
use crate::model::{Category, DigestRecord, Subscriber};
use crate::scheduler::{JobKind, JobRunner, JobStatus, Scheduler, TriggerAck};
use crate::store::{ArticlePage, ArticleQuery, Store, StoreStats};

/// What `/api/config` reports: which integrations are wired, never their secrets.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigSummary {
    pub ai_enabled: bool,
    pub ai_provider: String,
    pub ai_model: String,
    pub delivery_channel: String,
    pub newsapi_configured: bool,
    pub sources: Vec<String>,
    pub ingest_interval_secs: u64,
    pub digest_time_utc: String,
    pub max_subscribers: usize,
    pub digest_max_articles: usize,
    pub categories: Vec<&'static str>,
}

impl ConfigSummary {
    pub fn new(cfg: &AppConfig, ai_enabled: bool, delivery_channel: &str) -> Self {
        Self {
            ai_enabled,
            ai_provider: cfg.ai.provider.clone(),
            ai_model: cfg.ai.model.clone(),
            delivery_channel: delivery_channel.to_string(),
            newsapi_configured: cfg.sources.newsapi.api_key.is_some(),
            sources: cfg.sources.source_names(),
            ingest_interval_secs: cfg.schedule.ingest_interval_secs,
            digest_time_utc: cfg.schedule.digest_time_utc.clone(),
            max_subscribers: cfg.digest.max_subscribers,
            digest_max_articles: cfg.digest.max_articles,
            categories: Category::ANALYZED.iter().map(Category::as_str).collect(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub scheduler: Arc<Scheduler>,
    pub runner: Arc<dyn JobRunner>,
    pub config: Arc<ConfigSummary>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/news", get(list_news))
        .route("/api/news/stats", get(news_stats))
        .route("/api/news/categories", get(news_categories))
        .route("/api/news/sources", get(news_sources))
        .route("/api/users", get(list_users).post(add_user))
        .route("/api/users/{email}", delete(remove_user))
        .route("/api/digests", get(list_digests))
        .route("/api/config", get(show_config))
        .route("/api/jobs", get(list_jobs))
        .route("/api/trigger-refresh", post(trigger_refresh))
        .route("/api/trigger-digest", post(trigger_digest))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::CapacityExceeded { .. } => StatusCode::CONFLICT,
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::JobAlreadyRunning(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(target: "api", error = %self, "request failed");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

async fn list_news(
    State(state): State<AppState>,
    Query(q): Query<ArticleQuery>,
) -> Result<Json<ArticlePage>, Error> {
    Ok(Json(state.store.query_articles(&q).await?))
}

async fn news_stats(State(state): State<AppState>) -> Json<StoreStats> {
    Json(state.store.stats().await)
}

#[derive(Serialize)]
struct CategoryCount {
    category: &'static str,
    count: usize,
}

async fn news_categories(State(state): State<AppState>) -> Json<Vec<CategoryCount>> {
    let stats = state.store.stats().await;
    Json(
        Category::ANALYZED
            .iter()
            .map(|c| CategoryCount {
                category: c.as_str(),
                count: stats.by_category.get(c.as_str()).copied().unwrap_or(0),
            })
            .collect(),
    )
}

#[derive(Serialize)]
struct SourceCount {
    source: String,
    count: usize,
}

async fn news_sources(State(state): State<AppState>) -> Json<Vec<SourceCount>> {
    let mut out: Vec<SourceCount> = state
        .store
        .stats()
        .await
        .by_source
        .into_iter()
        .map(|(source, count)| SourceCount { source, count })
        .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.source.cmp(&b.source)));
    Json(out)
}

async fn list_users(State(state): State<AppState>) -> Json<Vec<Subscriber>> {
    Json(state.store.list_subscribers().await)
}

#[derive(Deserialize)]
struct NewUser {
    email: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    min_relevance: Option<u8>,
    #[serde(default)]
    categories: Vec<String>,
    #[serde(default = "yes")]
    active: bool,
}

fn yes() -> bool {
    true
}

async fn add_user(
    State(state): State<AppState>,
    Json(body): Json<NewUser>,
) -> Result<(StatusCode, Json<Subscriber>), Error> {
    let categories = body
        .categories
        .iter()
        .map(|c| c.parse::<Category>().map_err(Error::InvalidInput))
        .collect::<Result<Vec<_>, _>>()?;
    let mut sub = Subscriber::new(&body.email, &body.name).with_categories(categories);
    if let Some(m) = body.min_relevance {
        sub = sub.with_min_relevance(m);
    }
    sub.active = body.active;

    let stored = state.store.add_subscriber(sub).await?;
    Ok((StatusCode::CREATED, Json(stored)))
}

async fn remove_user(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<StatusCode, Error> {
    state.store.remove_subscriber(&email).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct LimitQuery {
    limit: Option<usize>,
}

async fn list_digests(
    State(state): State<AppState>,
    Query(q): Query<LimitQuery>,
) -> Json<Vec<DigestRecord>> {
    Json(state.store.digest_log(q.limit.unwrap_or(50).min(500)).await)
}

async fn show_config(State(state): State<AppState>) -> Json<ConfigSummary> {
    Json(state.config.as_ref().clone())
}

async fn list_jobs(State(state): State<AppState>) -> Json<Vec<JobStatus>> {
    Json(state.scheduler.statuses())
}

#[derive(Serialize)]
struct TriggerResp {
    job: JobKind,
    status: TriggerAck,
}

fn trigger(state: &AppState, job: JobKind) -> (StatusCode, Json<TriggerResp>) {
    let status = state.scheduler.trigger(Arc::clone(&state.runner), job);
    (StatusCode::ACCEPTED, Json(TriggerResp { job, status }))
}

async fn trigger_refresh(State(state): State<AppState>) -> (StatusCode, Json<TriggerResp>) {
    trigger(&state, JobKind::Ingestion)
}

async fn trigger_digest(State(state): State<AppState>) -> (StatusCode, Json<TriggerResp>) {
    trigger(&state, JobKind::Digest)
}
