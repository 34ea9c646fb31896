//! Provider router — turns `(company_id, channel)` into an ordered fallback
//! chain of ready adapters, and drives whole-operation fallback for
//! single-recipient sends.
//!
//! Fallback granularity is the whole logical send: candidate₁ → candidate₂
//! in order, never per-recipient mid-batch. Bulk dispatch takes the first
//! candidate for the entire job.

use sendfleet_core::config::DispatchConfig;
use sendfleet_core::error::{Result, SendFleetError};
use sendfleet_core::traits::ProviderAdapter;
use sendfleet_core::types::{ChannelKind, ChannelPayload, Recipient, SendOutcome};
use std::sync::Arc;
use std::time::Duration;

use crate::credentials::CredentialStore;
use crate::registry;

pub struct ProviderRouter {
    store: Arc<CredentialStore>,
    send_timeout: Duration,
}

impl ProviderRouter {
    pub fn new(store: Arc<CredentialStore>, dispatch: &DispatchConfig) -> Self {
        Self {
            store,
            send_timeout: Duration::from_secs(dispatch.send_timeout_secs),
        }
    }

    /// Validate a payload against its channel before any provider work.
    /// The tagged union already guarantees shape; this checks content.
    pub fn validate_payload(channel: ChannelKind, payload: &ChannelPayload) -> Result<()> {
        if payload.channel() != channel {
            return Err(SendFleetError::Validation(format!(
                "Payload is for {}, job is for {channel}",
                payload.channel()
            )));
        }
        match payload {
            ChannelPayload::Email { subject, body, .. } => {
                if subject.trim().is_empty() {
                    return Err(SendFleetError::validation("Email subject must not be empty"));
                }
                if body.trim().is_empty() {
                    return Err(SendFleetError::validation("Email body must not be empty"));
                }
            }
            ChannelPayload::Sms { message, .. } => {
                if message.trim().is_empty() {
                    return Err(SendFleetError::validation("SMS message must not be empty"));
                }
            }
            ChannelPayload::Whatsapp {
                message,
                template_id,
                ..
            } => {
                if message.trim().is_empty() && template_id.is_none() {
                    return Err(SendFleetError::validation(
                        "WhatsApp payload needs a message or a template id",
                    ));
                }
            }
        }
        Ok(())
    }

    /// Ordered candidate adapters for a tenant on a channel.
    ///
    /// Secrets are decrypted here, per call, and live only inside the
    /// returned adapters. Entries whose bundle no longer builds (key
    /// rotated away, vendor removed) are skipped with a warning; they
    /// count as "unconfigured", not as send failures.
    pub fn candidates(
        &self,
        company_id: &str,
        channel: ChannelKind,
    ) -> Result<Vec<Box<dyn ProviderAdapter>>> {
        let records = self.store.routing_order(company_id, channel)?;
        if records.is_empty() {
            return Err(SendFleetError::ProviderNotConfigured {
                channel,
                missing: registry::missing_keys(channel),
            });
        }

        let mut adapters: Vec<Box<dyn ProviderAdapter>> = Vec::with_capacity(records.len());
        let mut build_errors = Vec::new();
        for record in &records {
            if registry::vendor_spec(channel, &record.vendor).is_none() {
                tracing::warn!(
                    "⏭️ Skipping unknown {channel} vendor '{}' for {company_id}",
                    record.vendor
                );
                continue;
            }
            let secrets = self
                .store
                .decrypt_secrets(company_id, channel, &record.vendor)?;
            match sendfleet_channels::build_adapter(
                channel,
                &record.vendor,
                &secrets,
                self.send_timeout,
            ) {
                Ok(adapter) => adapters.push(adapter),
                Err(e) => {
                    tracing::warn!(
                        "⚠️ {channel} vendor '{}' failed validation for {company_id}: {e}",
                        record.vendor
                    );
                    build_errors.push(format!("{}: {e}", record.vendor));
                }
            }
        }

        if adapters.is_empty() {
            return Err(SendFleetError::Config(format!(
                "No usable {channel} provider for {company_id}: {}",
                build_errors.join("; ")
            )));
        }
        Ok(adapters)
    }

    /// Try one logical send across the candidate chain.
    ///
    /// A rejected outcome or transport failure from one candidate advances
    /// to the next; the first accepted outcome wins. When the chain is
    /// exhausted the last rejection is returned — the caller records it,
    /// it is not an `Err`.
    pub async fn send_with_fallback(
        candidates: &[Box<dyn ProviderAdapter>],
        recipient: &Recipient,
        payload: &ChannelPayload,
    ) -> Result<SendOutcome> {
        let mut last_error = None;

        for (idx, adapter) in candidates.iter().enumerate() {
            let outcome = adapter.send(recipient, payload).await?;
            if outcome.accepted {
                if idx > 0 {
                    tracing::info!(
                        "🔄 Fallback: {} → {} (success)",
                        candidates[0].vendor(),
                        adapter.vendor()
                    );
                }
                return Ok(outcome);
            }
            tracing::warn!(
                "⚠️ {} {} rejected send to {}: {}",
                adapter.channel(),
                adapter.vendor(),
                recipient.address,
                outcome.error.as_deref().unwrap_or("unknown")
            );
            last_error = outcome.error;
        }

        Ok(SendOutcome::rejected(
            last_error.unwrap_or_else(|| "All providers rejected the send".into()),
        ))
    }
}
