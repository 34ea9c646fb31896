//! # SendFleet Scheduler
//!
//! Appointment reminders on a time-driven trigger, sharing the provider
//! router and adapter layer with the campaign path.
//!
//! ```text
//! appointment scheduled
//!   └── plan: scheduled_for = start_time − hours_before (future only)
//! external tick (no in-process timers)
//!   ├── due = scheduled appointments × pending reminders × scheduled_for ≤ now
//!   ├── claim (pending → processing, conditional — overlap-safe)
//!   ├── send via channel candidate chain (whole-operation fallback)
//!   └── persist sent {message_id} | failed {error} — terminal, no retries
//! ```

pub mod appointment;
pub mod store;
pub mod tick;

pub use appointment::{
    Appointment, AppointmentReminder, AppointmentStatus, ReminderPreference, ReminderStatus,
    plan_reminders, reminder_id,
};
pub use store::ReminderDb;
pub use tick::{ReminderTicker, TickSummary};
