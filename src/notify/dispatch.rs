use chrono::{DateTime, Utc};
use futures::future::join_all;
use metrics::counter;
use serde::Serialize;

use super::DynNotifier;
use crate::digest::Digest;
use crate::model::{DeliveryOutcome, DigestRecord};

#[derive(Debug, Default, Clone, Serialize)]
pub struct DispatchReport {
    pub sent: usize,
    pub failed: usize,
    pub skipped: usize,
    pub records: Vec<DigestRecord>,
}

/// Sends each non-empty digest once, concurrently, and produces one audit
/// record per digest. No retries.
pub struct Dispatcher {
    notifier: DynNotifier,
}

impl Dispatcher {
    pub fn new(notifier: DynNotifier) -> Self {
        Self { notifier }
    }

    pub fn channel(&self) -> &'static str {
        self.notifier.channel()
    }

    pub async fn dispatch(&self, digests: Vec<Digest>, now: DateTime<Utc>) -> DispatchReport {
        let outcomes = join_all(digests.iter().map(|d| self.deliver(d))).await;

        let mut report = DispatchReport::default();
        for (d, outcome) in digests.iter().zip(outcomes) {
            match &outcome {
                DeliveryOutcome::Sent => report.sent += 1,
                DeliveryOutcome::Failed { .. } => report.failed += 1,
                DeliveryOutcome::Skipped => report.skipped += 1,
            }
            report.records.push(DigestRecord {
                sent_at: now,
                recipient: d.recipient.clone(),
                article_count: d.article_count,
                outcome,
            });
        }
        report
    }

    async fn deliver(&self, d: &Digest) -> DeliveryOutcome {
        if d.is_empty() {
            counter!("digest_skipped_total").increment(1);
            tracing::info!(target: "notify", recipient = %d.recipient, "empty digest, not sent");
            return DeliveryOutcome::Skipped;
        }
        match self.notifier.send(d).await {
            Ok(()) => {
                counter!("digest_sent_total", "channel" => self.notifier.channel()).increment(1);
                tracing::info!(target: "notify", recipient = %d.recipient, articles = d.article_count, "digest sent");
                DeliveryOutcome::Sent
            }
            Err(e) => {
                counter!("digest_failed_total", "channel" => self.notifier.channel()).increment(1);
                tracing::warn!(target: "notify", error = %e, "digest delivery failed");
                DeliveryOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }
}
