//! Appointment and reminder data model.

use chrono::{DateTime, Duration, Utc};
use sendfleet_core::types::ChannelKind;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Pending,
    Completed,
    Cancelled,
    NoShow,
    Rescheduled,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::NoShow => "no_show",
            Self::Rescheduled => "rescheduled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(Self::Scheduled),
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            "no_show" => Some(Self::NoShow),
            "rescheduled" => Some(Self::Rescheduled),
            _ => None,
        }
    }
}

/// One enabled lead-time slot: "remind on this channel N hours before".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderPreference {
    pub channel: ChannelKind,
    pub hours_before: u32,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderStatus {
    Pending,
    /// Transient claim state while a tick is sending — an overlapping tick
    /// that fails the claim just skips the reminder.
    Processing,
    Sent,
    Failed,
    Skipped,
}

impl ReminderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "sent" => Some(Self::Sent),
            "failed" => Some(Self::Failed),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }
}

/// A single scheduled, channel-specific notification tied to one
/// appointment and one lead-time offset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentReminder {
    pub id: String,
    pub appointment_id: String,
    pub channel: ChannelKind,
    pub hours_before: u32,
    pub scheduled_for: DateTime<Utc>,
    pub status: ReminderStatus,
    pub sent_at: Option<DateTime<Utc>>,
    pub message_id: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: String,
    pub company_id: String,
    pub contact_name: String,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub reminder_preferences: Vec<ReminderPreference>,
}

/// Deterministic reminder id — the same logical slot always maps to the
/// same id, so re-scheduling the same appointment can never duplicate a
/// reminder.
pub fn reminder_id(appointment_id: &str, channel: ChannelKind, hours_before: u32) -> String {
    format!("{appointment_id}:{channel}:{hours_before}h")
}

/// Compute the reminder set for an appointment. Slots whose fire time is
/// already in the past are silently dropped — never created, never failed.
pub fn plan_reminders(appointment: &Appointment, now: DateTime<Utc>) -> Vec<AppointmentReminder> {
    appointment
        .reminder_preferences
        .iter()
        .filter(|pref| pref.enabled)
        .filter_map(|pref| {
            let scheduled_for =
                appointment.start_time - Duration::hours(i64::from(pref.hours_before));
            if scheduled_for <= now {
                return None;
            }
            Some(AppointmentReminder {
                id: reminder_id(&appointment.id, pref.channel, pref.hours_before),
                appointment_id: appointment.id.clone(),
                channel: pref.channel,
                hours_before: pref.hours_before,
                scheduled_for,
                status: ReminderStatus::Pending,
                sent_at: None,
                message_id: None,
                error: None,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn appointment(start_in_hours: i64) -> Appointment {
        let now = Utc::now();
        Appointment {
            id: "apt-1".into(),
            company_id: "acme".into(),
            contact_name: "Pat".into(),
            contact_email: Some("pat@example.com".into()),
            contact_phone: Some("+15551230000".into()),
            start_time: now + Duration::hours(start_in_hours),
            end_time: now + Duration::hours(start_in_hours + 1),
            status: AppointmentStatus::Scheduled,
            reminder_preferences: vec![
                ReminderPreference {
                    channel: ChannelKind::Email,
                    hours_before: 24,
                    enabled: true,
                },
                ReminderPreference {
                    channel: ChannelKind::Sms,
                    hours_before: 2,
                    enabled: true,
                },
                ReminderPreference {
                    channel: ChannelKind::Whatsapp,
                    hours_before: 1,
                    enabled: false,
                },
            ],
        }
    }

    #[test]
    fn lead_time_is_exact() {
        let apt = appointment(48);
        let reminders = plan_reminders(&apt, Utc::now());
        assert_eq!(reminders.len(), 2); // disabled pref dropped
        for r in &reminders {
            assert_eq!(
                apt.start_time - r.scheduled_for,
                Duration::hours(i64::from(r.hours_before))
            );
            assert!(r.scheduled_for < apt.start_time);
        }
    }

    #[test]
    fn past_due_slots_are_never_created() {
        // Appointment in 3 hours: the 24h slot is already past, only the
        // 2h slot survives.
        let apt = appointment(3);
        let reminders = plan_reminders(&apt, Utc::now());
        assert_eq!(reminders.len(), 1);
        assert_eq!(reminders[0].channel, ChannelKind::Sms);
        assert_eq!(reminders[0].hours_before, 2);
    }

    #[test]
    fn ids_are_deterministic_per_slot() {
        let apt = appointment(48);
        let a = plan_reminders(&apt, Utc::now());
        let b = plan_reminders(&apt, Utc::now());
        let ids_a: Vec<&str> = a.iter().map(|r| r.id.as_str()).collect();
        let ids_b: Vec<&str> = b.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids_a, ids_b);
        assert_eq!(reminder_id("apt-1", ChannelKind::Email, 24), "apt-1:email:24h");
    }
}
