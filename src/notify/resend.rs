use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use super::Notifier;
use crate::digest::Digest;
use crate::error::{Error, Result};

pub const RESEND_URL: &str = "https://api.resend.com/emails";

/// Resend HTTP API delivery.
pub struct ResendNotifier {
    client: reqwest::Client,
    api_key: String,
    from: String,
    endpoint: String,
}

#[derive(Serialize)]
struct SendEmail<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
    text: &'a str,
}

impl ResendNotifier {
    pub fn new(api_key: &str, from: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key: api_key.to_string(),
            from: from.to_string(),
            endpoint: RESEND_URL.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl Notifier for ResendNotifier {
    async fn send(&self, digest: &Digest) -> Result<()> {
        let body = SendEmail {
            from: &self.from,
            to: [&digest.recipient],
            subject: &digest.subject,
            html: &digest.html,
            text: &digest.text,
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::delivery(&digest.recipient, e))?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(Error::delivery(
                &digest.recipient,
                format!("status {status}: {}", detail.chars().take(200).collect::<String>()),
            ));
        }
        Ok(())
    }

    fn channel(&self) -> &'static str {
        "resend"
    }
}
