//! Render the digest a subscriber would get right now, without sending it.
//!
//! Usage: `digest_preview [email] [--html]`. Without an email the first active
//! subscriber is used.

use anyhow::{anyhow, Context, Result};
use chrono::Utc;

use ai_news_tracker::config::AppConfig;
use ai_news_tracker::digest::{build_digest, DigestSettings};
use ai_news_tracker::store::Store;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_target(false).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let html = args.iter().any(|a| a == "--html");
    let wanted = args.iter().find(|a| !a.starts_with("--")).map(|s| s.to_lowercase());

    let cfg = AppConfig::load_default()?;
    let path = cfg
        .store_path
        .as_deref()
        .ok_or_else(|| anyhow!("STORE_PATH is 'memory'; nothing to preview"))?;
    let store = Store::open(path, cfg.digest.max_subscribers)
        .await
        .with_context(|| format!("opening {}", path.display()))?;

    let subs = store.list_active_subscribers().await;
    let sub = match wanted {
        Some(email) => subs.into_iter().find(|s| s.email == email),
        None => subs.into_iter().next(),
    }
    .ok_or_else(|| anyhow!("no matching active subscriber"))?;

    let settings = DigestSettings::from_config(&cfg);
    let now = Utc::now();
    let candidates = store.digest_candidates(now - settings.lookback).await;
    let digest = build_digest(&sub, &candidates, now, &settings);

    println!("To: {}\nSubject: {}\n", digest.recipient, digest.subject);
    println!("{}", if html { &digest.html } else { &digest.text });
    Ok(())
}
