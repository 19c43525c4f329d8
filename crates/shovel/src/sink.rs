//! 🚰 The Bulk Sink, where enriched events go to become documents (or statistics).
//!
//! 🎬 *[a batch of 200 events approaches the cluster. the cluster is having a day.]*
//! *[some are accepted. some are throttled. one has a mapping conflict and no regrets.]*
//!
//! 🧠 Knowledge graph:
//! - Input: one batch of `Result<EnrichedEvent, MalformedEvent>` + a backend.
//! - Output: `BulkResult { succeeded, failed }`. ALWAYS, for partial failure. Partial failure
//!   is not an error. Partial failure is Tuesday.
//! - Malformed lines are counted failed up front and never sent.
//! - Retries, in the time-honored bulk-helper tradition:
//!   - whole request came back 429/502/503/504 or timed out → resend everything still pending
//!   - individual items came back 429 → resend only those
//!   - exponential backoff: 1s, 2s, 4s, 8s, 16s (capped), at most `max_retries` resends
//!   - budget exhausted → whatever is still pending is counted failed, not raised
//! - Connection refused, 4xx on the whole request, signing failure, gibberish reply:
//!   `ShovelError::Submission`. The supervisor catches it and marks the file failed.

use std::time::Duration;

use tracing::{debug, warn};

use crate::backends::{BulkBackend, BulkReply};
use crate::common::BulkResult;
use crate::enrich::{EnrichedEvent, MalformedEvent};
use crate::error::ShovelError;

/// 🔄 How stubborn the sink is allowed to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 🔁 Resends after the first attempt. 5 means up to 6 requests for the unluckiest document.
    pub max_retries: u32,
    /// 😴 The first nap. Doubles every retry.
    pub initial_backoff: Duration,
    /// 😴 The longest nap we will ever take.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(600),
        }
    }
}

impl RetryPolicy {
    /// 😴 Delay before resend number `retry` (1-based): `initial * 2^(retry-1)`, capped.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// 📄 A rendered bulk entry waiting for the cluster to accept it.
#[derive(Debug)]
struct PendingDoc {
    id: String,
    entry: String,
}

/// 🚰 Submits batches and counts the outcome.
#[derive(Debug, Clone, Default)]
pub struct BulkSink {
    policy: RetryPolicy,
}

impl BulkSink {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// 📡 Send one batch as one bulk write (plus retries) and report the counts.
    ///
    /// 💀 Only raises for non-recoverable submission errors. Everything per-document is counted.
    pub async fn submit<B>(
        &self,
        backend: &B,
        events: Vec<Result<EnrichedEvent, MalformedEvent>>,
    ) -> Result<BulkResult, ShovelError>
    where
        B: BulkBackend + ?Sized,
    {
        let mut result = BulkResult::default();
        let mut pending = Vec::with_capacity(events.len());

        for event in events {
            match event {
                Ok(event) => match event.to_bulk_entry() {
                    Ok(entry) => pending.push(PendingDoc { id: event.id, entry }),
                    Err(err) => {
                        warn!("💀 could not render document {} for bulk: {err}", event.id);
                        result.failed += 1;
                    }
                },
                Err(malformed) => {
                    if result.failed == 0 {
                        warn!("🧩 malformed event, counted as failed: {malformed}");
                    } else {
                        debug!("🧩 malformed event, counted as failed: {malformed}");
                    }
                    result.failed += 1;
                }
            }
        }

        let mut retries = 0u32;
        while !pending.is_empty() {
            let payload = collect_ndjson(&pending);
            debug!(
                "📡 sending {} documents ({} bytes) to {}",
                pending.len(),
                payload.len(),
                backend.endpoint()
            );

            match backend.submit_bulk(payload).await {
                Ok(reply) => pending = settle(reply, pending, &mut result),
                Err(err) if err.is_transient() => {
                    warn!("🐢 transient bulk failure, {} documents pending: {err}", pending.len());
                }
                Err(source) => return Err(ShovelError::Submission { source }),
            }

            if pending.is_empty() {
                break;
            }
            if retries >= self.policy.max_retries {
                warn!(
                    "💀 giving up on {} documents after {} retries",
                    pending.len(),
                    retries
                );
                result.failed += pending.len();
                break;
            }

            retries += 1;
            let delay = self.policy.backoff(retries);
            debug!("😴 retry {retries}/{} in {delay:?}", self.policy.max_retries);
            tokio::time::sleep(delay).await;
        }

        Ok(result)
    }
}

/// 🧵 Glue entries into one `_bulk` body. Every entry gets its trailing `\n`, the last one too.
fn collect_ndjson(pending: &[PendingDoc]) -> String {
    let estimated_size: usize = pending.iter().map(|doc| doc.entry.len() + 1).sum();
    let mut payload = String::with_capacity(estimated_size);
    for doc in pending {
        payload.push_str(&doc.entry);
        payload.push('\n');
    }
    payload
}

/// ⚖️ Match reply items to pending docs by position. Returns the throttled ones for another go.
fn settle(reply: BulkReply, pending: Vec<PendingDoc>, result: &mut BulkResult) -> Vec<PendingDoc> {
    let mut throttled = Vec::new();
    let mut items = reply.items.into_iter();
    let mut complained = false;

    for doc in pending {
        match items.next() {
            Some(item) if item.is_success() => result.succeeded += 1,
            Some(item) if item.is_throttled() => throttled.push(doc),
            Some(item) => {
                let reason = item
                    .error
                    .as_ref()
                    .map(|raw| raw.get().to_string())
                    .unwrap_or_else(|| "no error body".to_string());
                if complained {
                    debug!("💀 document {} rejected (HTTP {}): {reason}", doc.id, item.status);
                } else {
                    warn!("💀 document {} rejected (HTTP {}): {reason}", doc.id, item.status);
                    complained = true;
                }
                result.failed += 1;
            }
            None => {
                debug!("👻 no bulk item came back for document {}", doc.id);
                result.failed += 1;
            }
        }
    }

    throttled
}
