// src/ingest/types.rs
use crate::error::Result;
use crate::model::Article;

/// One external news source. Implementations decide eligibility themselves
/// and must never share mutable state; a failure stays local to the source.
#[async_trait::async_trait]
pub trait SourceProvider: Send + Sync {
    async fn fetch_latest(&self) -> Result<Vec<Article>>;
    fn name(&self) -> &str;
}

/// How a provider gets its payload: live HTTP or an embedded fixture.
pub enum Mode {
    // Owned copy so tests can pass any &str.
    Fixture(String),
    Http {
        url: String,
        client: reqwest::Client,
    },
}

impl Mode {
    pub fn fixture(s: &str) -> Self {
        Mode::Fixture(s.to_string())
    }

    pub fn http(url: impl Into<String>, client: reqwest::Client) -> Self {
        Mode::Http {
            url: url.into(),
            client,
        }
    }
}
