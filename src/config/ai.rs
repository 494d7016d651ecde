use serde::{Deserialize, Serialize};
use std::env;

fn default_provider() -> String {
    "anthropic".to_string()
}
fn default_model() -> String {
    "claude-haiku-4-5-20251001".to_string()
}
fn default_daily_limit() -> u32 {
    200
}
/// Upper bound on articles per analysis request.
pub const MAX_BATCH_SIZE: usize = 5;

fn default_batch_size() -> usize {
    MAX_BATCH_SIZE
}
fn default_api_key() -> String {
    "ENV".to_string()
}
fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// "anthropic" | "mock" (case-insensitive)
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Max real API calls per UTC day.
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,
    /// Articles per analysis request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// "ENV" means: read from ANTHROPIC_API_KEY.
    #[serde(default = "default_api_key", skip_serializing)]
    pub api_key: String,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            provider: default_provider(),
            model: default_model(),
            daily_limit: default_daily_limit(),
            batch_size: default_batch_size(),
            api_key: default_api_key(),
        }
    }
}

impl AiConfig {
    /// Lowercase provider, resolve the "ENV" key indirection and keep the
    /// batch size in a sane range. A missing key leaves `api_key` empty, which
    /// disables the real provider instead of failing startup.
    pub fn normalized(mut self) -> Self {
        self.provider = self.provider.trim().to_lowercase();

        if self.api_key.trim().eq_ignore_ascii_case("env") {
            self.api_key = match self.provider.as_str() {
                "anthropic" | "claude" => env::var("ANTHROPIC_API_KEY").unwrap_or_default(),
                _ => String::new(),
            };
        }

        self.batch_size = match self.batch_size {
            0 => default_batch_size(),
            n => n.min(MAX_BATCH_SIZE),
        };
        self
    }

    pub fn has_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}
