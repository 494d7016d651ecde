//! AI adapter: provider abstraction + daily call budget.
//! One call analyzes a whole batch; results carry the request `id` so callers
//! never depend on response order.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::config::ai::AiConfig;
use crate::error::{Error, Result};
use crate::model::Competitor;

// ------------------------------------------------------------
// Public surface
// ------------------------------------------------------------

/// One article as sent to the AI.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AnalysisItem {
    pub id: usize,
    pub title: String,
    pub excerpt: String,
    pub source: String,
}

/// Per-article analysis returned by the AI.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct AnalysisResult {
    #[serde(deserialize_with = "lenient_int")]
    pub id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub summary: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub category: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    #[serde(default = "default_score", deserialize_with = "lenient_score")]
    pub relevance_score: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_product_or_tool: bool,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub competitors: Vec<Competitor>,
    #[serde(default)]
    pub competitive_advantage: Option<String>,
}

fn default_score() -> i64 {
    5
}

/// `null` reads as the field's empty value.
fn null_as_default<'de, D, T>(d: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Num {
    I(i64),
    F(f64),
    S(String),
}

impl Num {
    fn to_i64<E: serde::de::Error>(self) -> std::result::Result<i64, E> {
        match self {
            Num::I(i) => Ok(i),
            Num::F(f) => Ok(f.round() as i64),
            Num::S(s) => s
                .trim()
                .parse::<f64>()
                .map(|f| f.round() as i64)
                .map_err(E::custom),
        }
    }
}

/// Models sometimes quote numbers or emit floats.
fn lenient_int<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<i64, D::Error> {
    Num::deserialize(d)?.to_i64()
}

fn lenient_score<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<i64, D::Error> {
    match Option::<Num>::deserialize(d)? {
        Some(n) => n.to_i64(),
        None => Ok(default_score()),
    }
}

pub type BatchFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<AnalysisResult>>> + Send + 'a>>;

/// Trait object used by the batcher.
pub trait AiClient: Send + Sync {
    /// Analyze a batch; `Err` means the whole call failed.
    fn analyze_batch<'a>(&'a self, items: &'a [AnalysisItem]) -> BatchFuture<'a>;
    /// Provider name for diagnostics.
    fn provider_name(&self) -> &'static str;
    /// `false` for the disabled client: the batcher then skips analysis entirely.
    fn is_enabled(&self) -> bool {
        true
    }
}

pub type DynAiClient = Arc<dyn AiClient>;

/// Factory: build a client according to config and environment variables.
///
/// * If `AI_TEST_MODE=mock` or provider is "mock", returns a deterministic mock.
/// * Else if disabled or no key, returns a disabled client.
/// * Else builds the Anthropic provider wrapped with the daily budget.
pub fn build_client_from_config(config: &AiConfig) -> DynAiClient {
    let mock_mode = std::env::var("AI_TEST_MODE")
        .map(|v| v == "mock")
        .unwrap_or(false)
        || config.provider == "mock";
    if mock_mode {
        return Arc::new(BudgetedClient::new(MockProvider, config.daily_limit));
    }

    if !config.enabled || !config.has_key() {
        return Arc::new(DisabledClient);
    }

    match config.provider.as_str() {
        "anthropic" | "claude" => {
            let provider = AnthropicProvider::new(config.api_key.clone(), Some(&config.model));
            Arc::new(BudgetedClient::new(provider, config.daily_limit))
        }
        other => {
            tracing::warn!(provider = other, "unknown AI provider, analysis disabled");
            Arc::new(DisabledClient)
        }
    }
}

// ------------------------------------------------------------
// Provider abstraction + concrete providers
// ------------------------------------------------------------

/// Low-level provider: does a *real* remote call. Separated so the budget
/// wrapper is shared between production and tests.
pub trait Provider: Send + Sync + 'static {
    fn fetch<'a>(&'a self, items: &'a [AnalysisItem]) -> BatchFuture<'a>;
    fn name(&self) -> &'static str;
}

pub const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";

const SYSTEM_PROMPT: &str = "You are an expert AI/ML analyst specializing in software development and platform engineering. \
You analyze AI news articles and provide structured analysis. Always respond with valid JSON only, no markdown.";

/// Anthropic Messages API provider.
pub struct AnthropicProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl AnthropicProvider {
    pub fn new(api_key: String, model_override: Option<&str>) -> Self {
        // Builder only fails on TLS backend init; fall back to defaults then.
        let http = reqwest::Client::builder()
            .user_agent(crate::ingest::providers::USER_AGENT)
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();
        Self {
            http,
            api_key,
            model: model_override
                .unwrap_or("claude-haiku-4-5-20251001")
                .to_string(),
            endpoint: ANTHROPIC_URL.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

impl Provider for AnthropicProvider {
    fn fetch<'a>(&'a self, items: &'a [AnalysisItem]) -> BatchFuture<'a> {
        Box::pin(async move {
            #[derive(Serialize)]
            struct Msg<'a> {
                role: &'a str,
                content: &'a str,
            }
            #[derive(Serialize)]
            struct Req<'a> {
                model: &'a str,
                max_tokens: u32,
                system: &'a str,
                messages: Vec<Msg<'a>>,
            }
            #[derive(Deserialize)]
            struct Resp {
                #[serde(default)]
                content: Vec<Block>,
            }
            #[derive(Deserialize)]
            struct Block {
                #[serde(default)]
                text: String,
            }

            let prompt = build_prompt(items);
            let req = Req {
                model: &self.model,
                max_tokens: 700 * items.len().max(1) as u32,
                system: SYSTEM_PROMPT,
                messages: vec![Msg {
                    role: "user",
                    content: &prompt,
                }],
            };

            let resp = self
                .http
                .post(&self.endpoint)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", "2023-06-01")
                .json(&req)
                .send()
                .await
                .map_err(|e| Error::batch_failed(items.len(), e))?;

            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(Error::batch_failed(
                    items.len(),
                    format!("status {status}: {}", body.chars().take(200).collect::<String>()),
                ));
            }
            let body: Resp = resp
                .json()
                .await
                .map_err(|e| Error::batch_failed(items.len(), e))?;
            let text: String = body.content.into_iter().map(|b| b.text).collect();
            parse_batch_response(&text).map_err(|e| Error::batch_failed(items.len(), e))
        })
    }

    fn name(&self) -> &'static str {
        "anthropic"
    }
}

pub fn build_prompt(items: &[AnalysisItem]) -> String {
    let mut out = String::from(
        "Analyze each AI/tech article below and return a JSON array with one object per article.\n\n",
    );
    for it in items {
        out.push_str(&format!(
            "[id {}]\nTitle: {}\nSource: {}\nContent: {}\n\n",
            it.id,
            it.title,
            it.source,
            crate::ingest::truncate_chars(&it.excerpt, 600)
        ));
    }
    out.push_str(
        r#"Each object must have this exact structure:
{
  "id": <the article id>,
  "summary": "2-3 sentence summary focused on what matters for software engineers and platform engineers",
  "category": "one of: Product/Tool | AI Model | Research Paper | Industry News | Tutorial/Guide | Platform/Infrastructure",
  "tags": ["tag1", "tag2", "tag3"],
  "relevance_score": <1-10 score for software dev / platform engineering relevance>,
  "is_product_or_tool": <true if this is about a product, tool, model, framework, or platform>,
  "product_name": "<name if is_product_or_tool, else empty string>",
  "competitors": [{"name": "Competitor Name", "description": "brief description", "comparison": "how this new thing differs or improves on this competitor"}],
  "competitive_advantage": "<if is_product_or_tool: what makes it stand out vs competitors, else empty string>"
}
For competitors: only include if is_product_or_tool is true. List 2-3 most relevant competitors max."#,
    );
    out
}

/// Accepts a bare JSON array or `{"results": [...]}`, optionally wrapped in a
/// markdown code fence. Items that do not parse are dropped one by one, so
/// their articles stay unanalyzed while the rest of the batch survives.
pub fn parse_batch_response(text: &str) -> std::result::Result<Vec<AnalysisResult>, serde_json::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Shape {
        List(Vec<serde_json::Value>),
        Wrapped { results: Vec<serde_json::Value> },
    }

    let clean = text
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    let items = match serde_json::from_str::<Shape>(clean)? {
        Shape::List(v) | Shape::Wrapped { results: v } => v,
    };
    Ok(items
        .into_iter()
        .filter_map(|v| match serde_json::from_value::<AnalysisResult>(v) {
            Ok(r) => Some(r),
            Err(e) => {
                tracing::warn!(target: "analyze", error = %e, "dropping unparseable analysis item");
                None
            }
        })
        .collect())
}

/// Used when AI is disabled.
pub struct DisabledClient;

impl AiClient for DisabledClient {
    fn analyze_batch<'a>(&'a self, items: &'a [AnalysisItem]) -> BatchFuture<'a> {
        Box::pin(async move { Err(Error::batch_failed(items.len(), "AI analysis disabled")) })
    }
    fn provider_name(&self) -> &'static str {
        "disabled"
    }
    fn is_enabled(&self) -> bool {
        false
    }
}

/// Deterministic provider for local runs: mid relevance, title as summary.
pub struct MockProvider;

impl Provider for MockProvider {
    fn fetch<'a>(&'a self, items: &'a [AnalysisItem]) -> BatchFuture<'a> {
        let out = items
            .iter()
            .map(|it| AnalysisResult {
                id: it.id as i64,
                summary: format!("{} (mock summary)", it.title),
                category: "Industry News".to_string(),
                tags: vec!["mock".to_string()],
                relevance_score: 5,
                is_product_or_tool: false,
                product_name: None,
                competitors: Vec::new(),
                competitive_advantage: None,
            })
            .collect();
        Box::pin(async move { Ok(out) })
    }
    fn name(&self) -> &'static str {
        "mock"
    }
}

// ------------------------------------------------------------
// Budget wrapper (daily call limit)
// ------------------------------------------------------------

/// Counts real calls per UTC day and refuses new ones once the limit is hit.
pub struct BudgetedClient<P: Provider> {
    inner: P,
    daily_limit_max: u32,
    counter: Mutex<DailyCounter>,
}

#[derive(Debug, Clone)]
struct DailyCounter {
    date: NaiveDate,
    count: u32,
}

impl DailyCounter {
    fn today() -> Self {
        Self {
            date: Utc::now().date_naive(),
            count: 0,
        }
    }
}

impl<P: Provider> BudgetedClient<P> {
    pub fn new(inner: P, daily_limit_max: u32) -> Self {
        Self {
            inner,
            daily_limit_max,
            counter: Mutex::new(DailyCounter::today()),
        }
    }

    /// Reserve one call for today; `false` when the budget is spent.
    fn try_reserve(&self) -> bool {
        let mut g = self.counter.lock().unwrap_or_else(|p| p.into_inner());
        if g.date != Utc::now().date_naive() {
            *g = DailyCounter::today();
        }
        if g.count >= self.daily_limit_max {
            return false;
        }
        g.count += 1;
        true
    }

    pub fn calls_today(&self) -> u32 {
        self.counter.lock().unwrap_or_else(|p| p.into_inner()).count
    }
}

impl<P: Provider> AiClient for BudgetedClient<P> {
    fn analyze_batch<'a>(&'a self, items: &'a [AnalysisItem]) -> BatchFuture<'a> {
        Box::pin(async move {
            if !self.try_reserve() {
                return Err(Error::batch_failed(items.len(), "daily AI call limit reached"));
            }
            self.inner.fetch(items).await
        })
    }
    fn provider_name(&self) -> &'static str {
        self.inner.name()
    }
}
