//! Digest delivery channels and the dispatcher that fans a digest run out to them.

pub mod dispatch;
pub mod email;
pub mod resend;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::DeliveryConfig;
use crate::digest::Digest;
use crate::error::{Error, Result};

pub use dispatch::{DispatchReport, Dispatcher};
pub use email::SmtpNotifier;
pub use resend::ResendNotifier;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// One delivery attempt; failure is `DeliveryFailed`.
    async fn send(&self, digest: &Digest) -> Result<()>;
    fn channel(&self) -> &'static str;
}

pub type DynNotifier = Arc<dyn Notifier>;

/// Used when no channel is configured: every delivery fails, nothing is sent.
pub struct DisabledNotifier;

#[async_trait]
impl Notifier for DisabledNotifier {
    async fn send(&self, digest: &Digest) -> Result<()> {
        Err(Error::delivery(&digest.recipient, "no delivery channel configured"))
    }
    fn channel(&self) -> &'static str {
        "disabled"
    }
}

/// Resend when an API key is present, otherwise SMTP, otherwise disabled.
pub fn build_notifier(cfg: &DeliveryConfig) -> DynNotifier {
    if let Some(key) = cfg.resend_api_key.as_deref().filter(|k| !k.trim().is_empty()) {
        return Arc::new(ResendNotifier::new(key, &cfg.from_email));
    }
    if let Some(smtp) = cfg.smtp.as_ref() {
        match SmtpNotifier::from_config(smtp, &cfg.from_email) {
            Ok(n) => return Arc::new(n),
            Err(e) => tracing::warn!(target: "notify", error = %e, "SMTP notifier unavailable"),
        }
    }
    tracing::warn!(target: "notify", "no delivery channel configured, digests will be recorded as failed");
    Arc::new(DisabledNotifier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_resend_then_smtp_then_disabled() {
        let mut cfg = DeliveryConfig::default();
        assert_eq!(build_notifier(&cfg).channel(), "disabled");
        cfg.smtp = Some(crate::config::SmtpConfig {
            host: "smtp.example.com".into(),
            user: "u".into(),
            pass: "p".into(),
        });
        assert_eq!(build_notifier(&cfg).channel(), "smtp");
        cfg.resend_api_key = Some("re_123".into());
        assert_eq!(build_notifier(&cfg).channel(), "resend");
    }
}
