use lettre::message::{Mailbox, Message, MultiPart};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};

use async_trait::async_trait;

use super::Notifier;
use crate::config::SmtpConfig;
use crate::digest::Digest;
use crate::error::{Error, Result};

/// SMTP delivery (STARTTLS relay with credentials).
pub struct SmtpNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpNotifier {
    pub fn from_config(cfg: &SmtpConfig, from: &str) -> Result<Self> {
        let creds = Credentials::new(cfg.user.clone(), cfg.pass.clone());
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.host)
            .map_err(|e| Error::InvalidInput(format!("SMTP_HOST '{}': {e}", cfg.host)))?
            .credentials(creds)
            .build();
        let from = from
            .parse()
            .map_err(|e| Error::InvalidInput(format!("FROM_EMAIL '{from}': {e}")))?;
        Ok(Self { mailer, from })
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, digest: &Digest) -> Result<()> {
        let to: Mailbox = digest
            .recipient
            .parse()
            .map_err(|e| Error::delivery(&digest.recipient, e))?;
        let msg = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(digest.subject.as_str())
            .multipart(MultiPart::alternative_plain_html(
                digest.text.clone(),
                digest.html.clone(),
            ))
            .map_err(|e| Error::delivery(&digest.recipient, e))?;

        self.mailer
            .send(msg)
            .await
            .map_err(|e| Error::delivery(&digest.recipient, e))?;
        Ok(())
    }

    fn channel(&self) -> &'static str {
        "smtp"
    }
}
