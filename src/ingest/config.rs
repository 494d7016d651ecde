// src/ingest/config.rs
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

const ENV_PATH: &str = "INGEST_KEYWORDS_PATH";

/// Built-in topic keywords used when no keyword file is configured.
pub const DEFAULT_KEYWORDS: &[&str] = &[
    "artificial intelligence",
    "machine learning",
    "LLM",
    "large language model",
    "GPT",
    "Claude",
    "Gemini",
    "Llama",
    "transformer",
    "neural network",
    "generative AI",
    "foundation model",
    "RAG",
    "vector database",
    "MLOps",
    "LLMOps",
    "AI platform",
    "AI infrastructure",
    "model deployment",
    "inference",
    "fine-tuning",
    "embeddings",
    "AI agent",
    "agentic",
    "kubernetes AI",
    "cloud AI",
    "AI observability",
    "AI gateway",
    "openai",
    "anthropic",
    "mistral",
    "cohere",
    "hugging face",
    "langchain",
    "llamaindex",
    "dspy",
    "crewai",
    "autogen",
    "platform engineering",
    "developer platform",
    "AI tooling",
    "AI SDK",
];

pub fn default_keywords() -> Vec<String> {
    clean_list(DEFAULT_KEYWORDS.iter().map(|s| s.to_string()).collect())
}

/// Load keywords from an explicit path. Supports TOML or JSON formats.
pub fn load_keywords_from(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading keywords from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_keywords(&content, ext.as_str())
}

/// Load keywords using env var + fallbacks:
/// 1) $INGEST_KEYWORDS_PATH
/// 2) config/keywords.toml
/// 3) config/keywords.json
/// 4) built-in list
pub fn load_keywords_default() -> Result<Vec<String>> {
    if let Ok(p) = std::env::var(ENV_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_keywords_from(&pb);
        } else {
            return Err(anyhow!("INGEST_KEYWORDS_PATH points to non-existent path"));
        }
    }
    let toml_p = PathBuf::from("config/keywords.toml");
    if toml_p.exists() {
        return load_keywords_from(&toml_p);
    }
    let json_p = PathBuf::from("config/keywords.json");
    if json_p.exists() {
        return load_keywords_from(&json_p);
    }
    Ok(default_keywords())
}

fn parse_keywords(s: &str, hint_ext: &str) -> Result<Vec<String>> {
    let try_toml = hint_ext == "toml" || s.contains("keywords");
    if try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    if let Ok(v) = parse_json(s) {
        return Ok(v);
    }
    if !try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    Err(anyhow!("unsupported keyword list format"))
}

fn parse_toml(s: &str) -> Result<Vec<String>> {
    #[derive(serde::Deserialize)]
    struct TomlKw {
        keywords: Vec<String>,
    }
    let v: TomlKw = toml::from_str(s)?;
    Ok(clean_list(v.keywords))
}

fn parse_json(s: &str) -> Result<Vec<String>> {
    let v: Vec<String> = serde_json::from_str(s)?;
    Ok(clean_list(v))
}

/// Trim, drop empties and dedup case-insensitively (first spelling wins).
fn clean_list(items: Vec<String>) -> Vec<String> {
    use std::collections::HashSet;
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(items.len());
    for it in items {
        let t = it.trim();
        if !t.is_empty() && seen.insert(t.to_ascii_lowercase()) {
            out.push(t.to_string());
        }
    }
    out
}
