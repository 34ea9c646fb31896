//! Batch dispatcher — paced, bounded-concurrency delivery of one payload to
//! a recipient list.
//!
//! Two-level structure: batches bound how much personalized payload is in
//! flight at once, chunks bound concurrent connections to the provider.
//! All sends in a chunk run together behind a barrier; chunks within a
//! batch are separated by a short sleep, batches by a longer one. Fallback
//! never happens mid-batch — the adapter passed in owns the whole job.

use futures::future::join_all;
use sendfleet_core::config::DispatchConfig;
use sendfleet_core::error::Result;
use sendfleet_core::traits::ProviderAdapter;
use sendfleet_core::types::{ChannelPayload, Recipient};
use std::time::Duration;

use crate::jobs::JobStore;
use crate::render;

/// Final tally for one dispatch pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchReport {
    pub sent: u32,
    pub failed: u32,
    /// Sample of the most recent provider error, for the job record.
    pub last_error: Option<String>,
}

pub struct BatchDispatcher {
    batch_size: usize,
    chunk_concurrency: usize,
    chunk_delay: Duration,
    batch_delay: Duration,
    send_timeout: Duration,
}

impl BatchDispatcher {
    pub fn new(config: &DispatchConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            chunk_concurrency: config.chunk_concurrency.max(1),
            chunk_delay: Duration::from_millis(config.chunk_delay_ms),
            batch_delay: Duration::from_millis(config.batch_delay_ms),
            send_timeout: Duration::from_secs(config.send_timeout_secs),
        }
    }

    /// Attempt every recipient exactly once, streaming progress to the job
    /// store after each chunk. Per-recipient failures (rejections, transport
    /// errors, timeouts) are counted, never fatal; the only `Err` paths out
    /// of here are store failures.
    pub async fn dispatch(
        &self,
        job_id: &str,
        adapter: &dyn ProviderAdapter,
        payload: &ChannelPayload,
        recipients: &[Recipient],
        store: &JobStore,
    ) -> Result<DispatchReport> {
        let mut report = DispatchReport::default();
        let batch_count = recipients.len().div_ceil(self.batch_size);

        for (batch_idx, batch) in recipients.chunks(self.batch_size).enumerate() {
            if batch_idx > 0 {
                tokio::time::sleep(self.batch_delay).await;
            }

            for (chunk_idx, chunk) in batch.chunks(self.chunk_concurrency).enumerate() {
                if chunk_idx > 0 {
                    tokio::time::sleep(self.chunk_delay).await;
                }

                let sends = chunk.iter().map(|recipient| {
                    let rendered = render::render_payload(payload, recipient);
                    async move {
                        tokio::time::timeout(self.send_timeout, adapter.send(recipient, &rendered))
                            .await
                    }
                });

                for result in join_all(sends).await {
                    match result {
                        Ok(Ok(outcome)) if outcome.accepted => report.sent += 1,
                        Ok(Ok(outcome)) => {
                            report.failed += 1;
                            if outcome.error.is_some() {
                                report.last_error = outcome.error;
                            }
                        }
                        Ok(Err(e)) => {
                            report.failed += 1;
                            report.last_error = Some(e.to_string());
                        }
                        Err(_) => {
                            report.failed += 1;
                            report.last_error = Some(format!(
                                "Send timed out after {}s",
                                self.send_timeout.as_secs()
                            ));
                        }
                    }
                }

                store.update_progress(job_id, report.sent, report.failed)?;
            }

            tracing::info!(
                "📦 Job {job_id}: batch {}/{batch_count} done ({} sent, {} failed)",
                batch_idx + 1,
                report.sent,
                report.failed
            );
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::CampaignJob;
    use async_trait::async_trait;
    use sendfleet_core::error::SendFleetError;
    use sendfleet_core::types::{ChannelKind, SendOutcome};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Records the addresses it was asked to send to, in completion order
    /// per chunk; fails any address containing "bounce".
    #[derive(Debug)]
    struct RecordingAdapter {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ProviderAdapter for RecordingAdapter {
        fn vendor(&self) -> &str {
            "mock"
        }
        fn channel(&self) -> ChannelKind {
            ChannelKind::Email
        }
        async fn send(
            &self,
            recipient: &Recipient,
            payload: &ChannelPayload,
        ) -> sendfleet_core::error::Result<SendOutcome> {
            let ChannelPayload::Email { body, .. } = payload else {
                return Err(SendFleetError::Adapter("wrong payload".into()));
            };
            self.seen.lock().unwrap().push(recipient.address.clone());
            if recipient.address.contains("bounce") {
                Ok(SendOutcome::rejected("mailbox unavailable"))
            } else {
                assert!(
                    !body.contains('{'),
                    "payload must be rendered before the adapter sees it"
                );
                Ok(SendOutcome::accepted(format!("id-{}", recipient.address)))
            }
        }
    }

    fn fast_dispatcher() -> BatchDispatcher {
        BatchDispatcher::new(&DispatchConfig {
            batch_size: 50,
            chunk_concurrency: 5,
            chunk_delay_ms: 0,
            batch_delay_ms: 0,
            send_timeout_secs: 5,
        })
    }

    fn recipients(n: usize) -> Vec<Recipient> {
        (0..n)
            .map(|i| Recipient {
                address: format!("user{i}@example.com"),
                display_name: format!("User {i}"),
                custom_fields: HashMap::from([("first_name".to_string(), format!("U{i}"))]),
            })
            .collect()
    }

    fn store_with_claimed_job(total: u32) -> (JobStore, CampaignJob, std::path::PathBuf) {
        let path = std::env::temp_dir().join(format!(
            "sendfleet-batch-test-{}-{}.db",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .subsec_nanos()
        ));
        let store = JobStore::open(&path).unwrap();
        let job = CampaignJob::new(
            "acme",
            "test",
            ChannelPayload::Email {
                subject: "Hi {first_name}".into(),
                body: "Hello {first_name}".into(),
                from_name: None,
            },
            total,
            "tester",
        );
        store.create(&job).unwrap();
        assert!(store.claim(&job.id).unwrap());
        (store, job, path)
    }

    #[tokio::test]
    async fn every_recipient_attempted_exactly_once() {
        // The documented scenario: 120 recipients, batches of 50, chunks
        // of 5 → 3 batches (50/50/20), all attempted, zero failures.
        let list = recipients(120);
        let (store, job, path) = store_with_claimed_job(120);
        let adapter = RecordingAdapter {
            seen: Mutex::new(Vec::new()),
        };

        let report = fast_dispatcher()
            .dispatch(
                &job.id,
                &adapter,
                &job.payload,
                &list,
                &store,
            )
            .await
            .unwrap();

        assert_eq!(report.sent, 120);
        assert_eq!(report.failed, 0);
        assert_eq!(report.sent + report.failed, 120);

        // Exhaustive and once-each: the union of all chunks is the
        // original list.
        let mut seen = adapter.seen.into_inner().unwrap();
        seen.sort();
        let mut expected: Vec<String> = list.iter().map(|r| r.address.clone()).collect();
        expected.sort();
        assert_eq!(seen, expected);

        let stored = store.get(&job.id).unwrap().unwrap();
        assert_eq!(stored.progress.sent, 120);
        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn chunk_order_follows_list_order() {
        // With chunk concurrency 1 the send order must equal list order.
        let list = recipients(7);
        let (store, job, path) = store_with_claimed_job(7);
        let adapter = RecordingAdapter {
            seen: Mutex::new(Vec::new()),
        };
        let dispatcher = BatchDispatcher::new(&DispatchConfig {
            batch_size: 3,
            chunk_concurrency: 1,
            chunk_delay_ms: 0,
            batch_delay_ms: 0,
            send_timeout_secs: 5,
        });

        dispatcher
            .dispatch(&job.id, &adapter, &job.payload, &list, &store)
            .await
            .unwrap();

        let seen = adapter.seen.into_inner().unwrap();
        let expected: Vec<String> = list.iter().map(|r| r.address.clone()).collect();
        assert_eq!(seen, expected);
        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn failures_never_abort_later_chunks() {
        let mut list = recipients(12);
        // Poison an entire early chunk.
        for r in list.iter_mut().take(5) {
            r.address = format!("bounce-{}", r.address);
        }
        let (store, job, path) = store_with_claimed_job(12);
        let adapter = RecordingAdapter {
            seen: Mutex::new(Vec::new()),
        };

        let report = fast_dispatcher()
            .dispatch(&job.id, &adapter, &job.payload, &list, &store)
            .await
            .unwrap();

        assert_eq!(report.sent, 7);
        assert_eq!(report.failed, 5);
        assert_eq!(report.sent + report.failed, 12);
        assert_eq!(report.last_error.as_deref(), Some("mailbox unavailable"));
        assert_eq!(adapter.seen.into_inner().unwrap().len(), 12);
        std::fs::remove_file(&path).ok();
    }
}
