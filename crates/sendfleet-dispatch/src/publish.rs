//! Publish entry point — validation, job creation, and the dispatch pass.
//!
//! `publish()` does everything user-actionable up front (payload validation,
//! recipient resolution, provider routing) and returns a receipt plus the
//! prepared recipient list; `run_dispatch()` claims the job and runs the
//! batch dispatcher to completion. HTTP callers spawn the dispatch and
//! return the receipt immediately; CLI and tests await it inline.

use sendfleet_core::error::{Result, SendFleetError};
use sendfleet_core::types::{ChannelKind, ChannelPayload, Recipient};
use sendfleet_providers::ProviderRouter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::batch::{BatchDispatcher, DispatchReport};
use crate::jobs::{CampaignJob, JobStatus, JobStore};
use crate::resolver::{self, ContactDirectory, RecipientSource, SkipTally};
use crate::suppression::SuppressionStore;

/// One channel's publish request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishRequest {
    pub company_id: String,
    pub campaign_name: String,
    pub payload: ChannelPayload,
    pub source: RecipientSource,
    pub created_by: String,
}

/// What the caller gets back as soon as the job exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishReceipt {
    pub job_id: String,
    pub channel: ChannelKind,
    pub total: u32,
    pub skipped: SkipTally,
}

/// A published job plus the ephemeral recipient list it needs for dispatch.
/// Recipients are never persisted — if this is dropped without dispatch the
/// job stays `pending` for a manual re-publish.
#[derive(Debug)]
pub struct PreparedDispatch {
    pub receipt: PublishReceipt,
    company_id: String,
    job_id: String,
    channel: ChannelKind,
    payload: ChannelPayload,
    recipients: Vec<Recipient>,
}

/// Aggregate result of a multi-channel publish: channels succeed and fail
/// independently, nothing rolls back.
#[derive(Default)]
pub struct MultiPublishOutcome {
    pub prepared: Vec<PreparedDispatch>,
    pub failures: Vec<(ChannelKind, SendFleetError)>,
}

pub struct Publisher {
    jobs: Arc<JobStore>,
    suppression: Arc<SuppressionStore>,
    router: Arc<ProviderRouter>,
    dispatcher: BatchDispatcher,
    directory: Option<Arc<dyn ContactDirectory>>,
}

impl Publisher {
    pub fn new(
        jobs: Arc<JobStore>,
        suppression: Arc<SuppressionStore>,
        router: Arc<ProviderRouter>,
        dispatcher: BatchDispatcher,
        directory: Option<Arc<dyn ContactDirectory>>,
    ) -> Self {
        Self {
            jobs,
            suppression,
            router,
            dispatcher,
            directory,
        }
    }

    /// Validate, resolve, route, and create the job (status pending).
    ///
    /// Configuration and validation failures surface as typed errors before
    /// any send. If routing fails after the job row exists, the job goes
    /// straight `pending → failed` with `last_error` set and the error is
    /// returned — no job is ever left `processing` without a dispatcher.
    pub async fn publish(&self, request: PublishRequest) -> Result<PreparedDispatch> {
        let channel = request.payload.channel();
        ProviderRouter::validate_payload(channel, &request.payload)?;

        let raw = match request.source {
            RecipientSource::Inline { recipients } => recipients,
            RecipientSource::Single { recipient } => vec![recipient],
            RecipientSource::ContactList { list_id } => match &self.directory {
                Some(directory) => {
                    directory
                        .contacts_in_list(&request.company_id, &list_id)
                        .await?
                }
                None => {
                    return Err(SendFleetError::validation(
                        "No contact directory attached; submit recipients inline",
                    ));
                }
            },
        };

        let suppressed = self
            .suppression
            .suppressed_set(&request.company_id, channel)?;
        let resolved = resolver::resolve(channel, raw, &suppressed)?;
        let total = resolved.recipients.len() as u32;

        let job = CampaignJob::new(
            &request.company_id,
            &request.campaign_name,
            request.payload.clone(),
            total,
            &request.created_by,
        );
        self.jobs.create(&job)?;

        // Routing failures surface to the user now; credentials are
        // re-decrypted at dispatch time, never carried in between.
        match self.router.candidates(&request.company_id, channel) {
            Ok(candidates) => {
                self.jobs.set_provider(&job.id, candidates[0].vendor())?;
            }
            Err(e) => {
                self.jobs.fail_before_dispatch(&job.id, &e.to_string())?;
                return Err(e);
            }
        }

        Ok(PreparedDispatch {
            receipt: PublishReceipt {
                job_id: job.id.clone(),
                channel,
                total,
                skipped: resolved.skipped,
            },
            company_id: request.company_id,
            job_id: job.id,
            channel,
            payload: request.payload,
            recipients: resolved.recipients,
        })
    }

    /// Claim the job and run the batch dispatcher to completion.
    pub async fn run_dispatch(&self, prepared: PreparedDispatch) -> Result<DispatchReport> {
        if !self.jobs.claim(&prepared.job_id)? {
            return Err(SendFleetError::Store(format!(
                "Job {} already claimed by another dispatch",
                prepared.job_id
            )));
        }

        let candidates = match self
            .router
            .candidates(&prepared.company_id, prepared.channel)
        {
            Ok(c) => c,
            Err(e) => {
                self.jobs
                    .fail_before_dispatch(&prepared.job_id, &e.to_string())?;
                return Err(e);
            }
        };
        let adapter = &candidates[0];

        let report = self
            .dispatcher
            .dispatch(
                &prepared.job_id,
                adapter.as_ref(),
                &prepared.payload,
                &prepared.recipients,
                &self.jobs,
            )
            .await?;

        let status = if report.failed == 0 {
            JobStatus::Completed
        } else {
            JobStatus::Failed
        };
        self.jobs.finish(
            &prepared.job_id,
            report.sent,
            report.failed,
            status,
            report.last_error.as_deref(),
        )?;

        tracing::info!(
            "✅ Job {} finished: {} ({} sent, {} failed)",
            prepared.job_id,
            status.as_str(),
            report.sent,
            report.failed
        );
        Ok(report)
    }

    /// Publish and dispatch inline — the CLI/test path.
    pub async fn publish_and_dispatch(
        &self,
        request: PublishRequest,
    ) -> Result<(PublishReceipt, DispatchReport)> {
        let prepared = self.publish(request).await?;
        let receipt = prepared.receipt.clone();
        let report = self.run_dispatch(prepared).await?;
        Ok((receipt, report))
    }

    /// One job per channel; each channel is independent and a failure in
    /// one never blocks or rolls back the others.
    pub async fn publish_many(
        &self,
        company_id: &str,
        campaign_name: &str,
        created_by: &str,
        payloads: Vec<ChannelPayload>,
        source: RecipientSource,
    ) -> MultiPublishOutcome {
        let mut outcome = MultiPublishOutcome::default();
        for payload in payloads {
            let channel = payload.channel();
            let request = PublishRequest {
                company_id: company_id.to_string(),
                campaign_name: campaign_name.to_string(),
                payload,
                source: source.clone(),
                created_by: created_by.to_string(),
            };
            match self.publish(request).await {
                Ok(prepared) => outcome.prepared.push(prepared),
                Err(e) => {
                    tracing::warn!("⚠️ {channel} publish failed for {company_id}: {e}");
                    outcome.failures.push((channel, e));
                }
            }
        }
        outcome
    }
}
