//! Tick engine — externally triggered, runs to completion, no in-process
//! timers.
//!
//! Each due reminder is claimed, routed through the channel's candidate
//! chain (primary provider, then fallbacks, whole-operation granularity),
//! and persisted as sent or failed. Terminal either way: a failed reminder
//! is never re-attempted by a later tick.

use chrono::{DateTime, Utc};
use sendfleet_core::error::Result;
use sendfleet_core::types::{ChannelKind, ChannelPayload, Recipient};
use sendfleet_providers::ProviderRouter;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::appointment::Appointment;
use crate::store::ReminderDb;

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TickSummary {
    pub processed: u32,
    pub successful: u32,
    pub failed: u32,
    pub errors: Vec<String>,
}

pub struct ReminderTicker {
    db: Arc<ReminderDb>,
    router: Arc<ProviderRouter>,
    batch_limit: usize,
}

impl ReminderTicker {
    pub fn new(db: Arc<ReminderDb>, router: Arc<ProviderRouter>, batch_limit: usize) -> Self {
        Self {
            db,
            router,
            batch_limit: batch_limit.max(1),
        }
    }

    /// Process everything due at `now`. Zero due reminders is a no-op
    /// summary, not an error.
    pub async fn run_tick(&self, now: DateTime<Utc>) -> Result<TickSummary> {
        let due = self.db.due_reminders(now, self.batch_limit)?;
        if due.is_empty() {
            tracing::debug!("⏰ Reminder tick: nothing due");
            return Ok(TickSummary::default());
        }

        let mut summary = TickSummary::default();
        for (reminder, appointment) in due {
            // Conditional claim — an overlapping tick that got here first
            // owns this reminder, and losing the race is not an error.
            if !self.db.claim(&reminder.id)? {
                continue;
            }
            summary.processed += 1;

            let Some(recipient) = reminder_recipient(&appointment, reminder.channel) else {
                let error = format!(
                    "Appointment {} has no {} contact address",
                    appointment.id, reminder.channel
                );
                self.db.mark_failed(&reminder.id, &error)?;
                summary.failed += 1;
                summary.errors.push(error);
                continue;
            };
            let payload = reminder_payload(&appointment, reminder.channel);

            let candidates = match self
                .router
                .candidates(&appointment.company_id, reminder.channel)
            {
                Ok(c) => c,
                Err(e) => {
                    let error = e.to_string();
                    self.db.mark_failed(&reminder.id, &error)?;
                    summary.failed += 1;
                    summary.errors.push(format!("{}: {error}", reminder.id));
                    continue;
                }
            };

            let outcome = ProviderRouter::send_with_fallback(&candidates, &recipient, &payload)
                .await?;
            if outcome.accepted {
                self.db
                    .mark_sent(&reminder.id, outcome.provider_message_id.as_deref(), now)?;
                summary.successful += 1;
            } else {
                let error = outcome.error.unwrap_or_else(|| "send rejected".into());
                self.db.mark_failed(&reminder.id, &error)?;
                summary.failed += 1;
                summary.errors.push(format!("{}: {error}", reminder.id));
            }
        }

        tracing::info!(
            "⏰ Reminder tick: {} processed, {} sent, {} failed",
            summary.processed,
            summary.successful,
            summary.failed
        );
        Ok(summary)
    }
}

/// The reminder's recipient, from the appointment's contact fields.
fn reminder_recipient(appointment: &Appointment, channel: ChannelKind) -> Option<Recipient> {
    let address = match channel {
        ChannelKind::Email => appointment.contact_email.clone(),
        ChannelKind::Sms | ChannelKind::Whatsapp => appointment.contact_phone.clone(),
    }?;
    Some(Recipient {
        address,
        display_name: appointment.contact_name.clone(),
        custom_fields: HashMap::new(),
    })
}

/// Default reminder content per channel.
fn reminder_payload(appointment: &Appointment, channel: ChannelKind) -> ChannelPayload {
    let when = appointment.start_time.format("%A %B %-d at %H:%M UTC");
    match channel {
        ChannelKind::Email => ChannelPayload::Email {
            subject: "Upcoming appointment reminder".into(),
            body: format!(
                "<p>Hi {},</p><p>This is a reminder of your appointment on {when}.</p>",
                appointment.contact_name
            ),
            from_name: None,
        },
        ChannelKind::Sms => ChannelPayload::Sms {
            message: format!(
                "Hi {}, reminder: your appointment is on {when}.",
                appointment.contact_name
            ),
            template_id: None,
        },
        ChannelKind::Whatsapp => ChannelPayload::Whatsapp {
            message: format!(
                "Hi {}, reminder: your appointment is on {when}.",
                appointment.contact_name
            ),
            template_id: None,
            template_params: vec![],
        },
    }
}
