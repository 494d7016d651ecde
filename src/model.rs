//! Core records: articles, subscribers and the digest audit log.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fixed category set assigned by analysis. `Unanalyzed` marks articles the
/// AI has not (yet) annotated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum Category {
    #[serde(rename = "Product/Tool")]
    ProductTool,
    #[serde(rename = "AI Model")]
    AiModel,
    #[serde(rename = "Research Paper")]
    ResearchPaper,
    #[serde(rename = "Industry News")]
    IndustryNews,
    #[serde(rename = "Tutorial/Guide")]
    TutorialGuide,
    #[serde(rename = "Platform/Infrastructure")]
    PlatformInfrastructure,
    #[default]
    #[serde(rename = "Unanalyzed")]
    Unanalyzed,
}

impl Category {
    /// Categories the AI may assign (excludes `Unanalyzed`).
    pub const ANALYZED: [Category; 6] = [
        Category::ProductTool,
        Category::AiModel,
        Category::ResearchPaper,
        Category::IndustryNews,
        Category::TutorialGuide,
        Category::PlatformInfrastructure,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::ProductTool => "Product/Tool",
            Category::AiModel => "AI Model",
            Category::ResearchPaper => "Research Paper",
            Category::IndustryNews => "Industry News",
            Category::TutorialGuide => "Tutorial/Guide",
            Category::PlatformInfrastructure => "Platform/Infrastructure",
            Category::Unanalyzed => "Unanalyzed",
        }
    }

    /// Lenient mapping for AI output: case-insensitive, unknown labels fall
    /// back to `IndustryNews`.
    pub fn from_ai_label(label: &str) -> Category {
        label.parse().unwrap_or(Category::IndustryNews)
    }

    pub fn is_analyzed(&self) -> bool {
        !matches!(self, Category::Unanalyzed)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Category::ANALYZED
            .iter()
            .chain(std::iter::once(&Category::Unanalyzed))
            .find(|c| c.as_str().eq_ignore_ascii_case(wanted))
            .copied()
            .ok_or_else(|| format!("unknown category '{wanted}'"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Competitor {
    pub name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub comparison: String,
}

fn null_as_empty<'de, D: serde::Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(d)?.unwrap_or_default())
}

/// Canonical form of an article URL used for identity: trimmed, lowercased,
/// without query, fragment or trailing slash.
pub fn canonical_url(url: &str) -> String {
    let mut s = url.trim().to_ascii_lowercase();
    if let Some(i) = s.find('#') {
        s.truncate(i);
    }
    if let Some(i) = s.find('?') {
        s.truncate(i);
    }
    while s.ends_with('/') {
        s.pop();
    }
    s
}

/// Stable identity of an article: first 8 bytes of SHA-256 over the canonical URL, hex encoded.
pub fn fingerprint(url: &str) -> String {
    use sha2::{Digest, Sha256};
    use std::fmt::Write as _;

    let digest = Sha256::digest(canonical_url(url).as_bytes());
    let mut out = String::with_capacity(16);
    for b in digest.iter().take(8) {
        let _ = write!(&mut out, "{b:02x}");
    }
    out
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub fingerprint: String,
    pub title: String,
    pub source: String,
    pub url: String,
    #[serde(default)]
    pub excerpt: String,
    #[serde(default)]
    pub enriched_excerpt: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    /// Upstream popularity (HN points); 0 when the source has none.
    #[serde(default)]
    pub points: u32,
    pub published_at: DateTime<Utc>,
    pub fetched_at: DateTime<Utc>,
    #[serde(default)]
    pub analyzed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub relevance_score: Option<u8>,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default)]
    pub competitors: Vec<Competitor>,
    #[serde(default)]
    pub competitive_advantage: Option<String>,
}

impl Article {
    /// Fresh, unanalyzed article as emitted by a source adapter.
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        source: impl Into<String>,
        published_at: DateTime<Utc>,
    ) -> Self {
        let url = url.into();
        Self {
            fingerprint: fingerprint(&url),
            title: title.into(),
            source: source.into(),
            url,
            excerpt: String::new(),
            enriched_excerpt: None,
            author: None,
            points: 0,
            published_at,
            fetched_at: Utc::now(),
            analyzed_at: None,
            summary: None,
            category: Category::Unanalyzed,
            tags: BTreeSet::new(),
            relevance_score: None,
            product_name: None,
            competitors: Vec::new(),
            competitive_advantage: None,
        }
    }

    pub fn with_excerpt(mut self, excerpt: impl Into<String>) -> Self {
        self.excerpt = excerpt.into();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn is_analyzed(&self) -> bool {
        self.category.is_analyzed() && self.relevance_score.is_some()
    }

    pub fn is_product(&self) -> bool {
        self.category == Category::ProductTool && self.product_name.is_some()
    }

    /// Best text available for analysis: the enriched excerpt wins over the raw one.
    pub fn body_text(&self) -> &str {
        match self.enriched_excerpt.as_deref() {
            Some(e) if !e.is_empty() => e,
            _ => &self.excerpt,
        }
    }

    /// Field-level merge: non-empty fields of `incoming` override, empty or
    /// absent fields never erase what is already here. Tags are unioned and an
    /// unanalyzed category never replaces an analyzed one.
    pub fn merge_from(&mut self, incoming: Article) {
        fn take_str(dst: &mut String, src: String) {
            if !src.trim().is_empty() {
                *dst = src;
            }
        }
        fn take_opt<T>(dst: &mut Option<T>, src: Option<T>, empty: impl Fn(&T) -> bool) {
            if let Some(v) = src {
                if !empty(&v) {
                    *dst = Some(v);
                }
            }
        }
        let blank = |s: &String| s.trim().is_empty();

        take_str(&mut self.title, incoming.title);
        take_str(&mut self.source, incoming.source);
        take_str(&mut self.url, incoming.url);
        take_str(&mut self.excerpt, incoming.excerpt);
        take_opt(&mut self.enriched_excerpt, incoming.enriched_excerpt, blank);
        take_opt(&mut self.author, incoming.author, blank);
        if incoming.points > 0 {
            self.points = incoming.points;
        }
        // Adapters stamp the fetch time when a feed omits the date; never move it forward.
        self.published_at = self.published_at.min(incoming.published_at);
        self.fetched_at = self.fetched_at.max(incoming.fetched_at);
        take_opt(&mut self.analyzed_at, incoming.analyzed_at, |_| false);
        take_opt(&mut self.summary, incoming.summary, blank);
        if incoming.category.is_analyzed() {
            self.category = incoming.category;
        }
        self.tags.extend(incoming.tags);
        take_opt(&mut self.relevance_score, incoming.relevance_score, |_| false);
        take_opt(&mut self.product_name, incoming.product_name, blank);
        if !incoming.competitors.is_empty() {
            self.competitors = incoming.competitors;
        }
        take_opt(
            &mut self.competitive_advantage,
            incoming.competitive_advantage,
            blank,
        );
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    pub email: String,
    pub name: String,
    pub min_relevance: u8,
    /// Empty means every category.
    #[serde(default)]
    pub categories: BTreeSet<Category>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

pub const DEFAULT_MIN_RELEVANCE: u8 = 5;

impl Subscriber {
    pub fn new(email: &str, name: &str) -> Self {
        Self {
            email: normalize_email(email),
            name: name.trim().to_string(),
            min_relevance: DEFAULT_MIN_RELEVANCE,
            categories: BTreeSet::new(),
            active: true,
            created_at: Utc::now(),
        }
    }

    pub fn with_min_relevance(mut self, min: u8) -> Self {
        self.min_relevance = min.clamp(1, 10);
        self
    }

    pub fn with_categories<I: IntoIterator<Item = Category>>(mut self, cats: I) -> Self {
        self.categories = cats.into_iter().filter(Category::is_analyzed).collect();
        self
    }

    pub fn wants(&self, category: Category) -> bool {
        self.categories.is_empty() || self.categories.contains(&category)
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Sent,
    Failed { reason: String },
    Skipped,
}

impl DeliveryOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, DeliveryOutcome::Sent)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestRecord {
    pub sent_at: DateTime<Utc>,
    pub recipient: String,
    pub article_count: usize,
    #[serde(flatten)]
    pub outcome: DeliveryOutcome,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, h, 0, 0).unwrap()
    }

    #[test]
    fn fingerprint_ignores_case_query_fragment_and_trailing_slash() {
        let a = fingerprint("https://Example.com/Post/1/?utm_source=x#top");
        let b = fingerprint("  https://example.com/post/1 ");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert_ne!(a, fingerprint("https://example.com/post/2"));
    }

    #[test]
    fn category_parses_case_insensitively_and_falls_back() {
        assert_eq!("ai model".parse::<Category>().unwrap(), Category::AiModel);
        assert_eq!(Category::from_ai_label("Gossip"), Category::IndustryNews);
        assert_eq!(
            serde_json::to_string(&Category::PlatformInfrastructure).unwrap(),
            "\"Platform/Infrastructure\""
        );
    }

    #[test]
    fn merge_keeps_existing_fields_when_incoming_is_empty() {
        let mut stored = Article::new("Title", "https://x.io/a", "HN", at(1)).with_excerpt("body");
        stored.summary = Some("sum".into());
        stored.category = Category::AiModel;
        stored.relevance_score = Some(8);

        let mut incoming = Article::new("", "https://x.io/a", "HN", at(2)).with_tags(["t"]);
        incoming.author = Some("bob".into());
        stored.merge_from(incoming);

        assert_eq!(stored.title, "Title");
        assert_eq!(stored.excerpt, "body");
        assert_eq!(stored.summary.as_deref(), Some("sum"));
        assert_eq!(stored.category, Category::AiModel);
        assert_eq!(stored.relevance_score, Some(8));
        assert_eq!(stored.author.as_deref(), Some("bob"));
        assert!(stored.tags.contains("t"));
        assert_eq!(stored.published_at, at(1));
    }

    #[test]
    fn subscriber_threshold_is_clamped_and_email_normalized() {
        let s = Subscriber::new("  Alice@Example.COM ", "Alice").with_min_relevance(42);
        assert_eq!(s.email, "alice@example.com");
        assert_eq!(s.min_relevance, 10);
        assert!(s.wants(Category::ResearchPaper));
    }
}
