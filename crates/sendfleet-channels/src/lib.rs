//! # SendFleet Channels
//!
//! Concrete provider adapters. Each adapter normalizes one vendor's API
//! into the uniform [`SendOutcome`] shape; delivery failures come back as
//! rejected outcomes, never errors, so a single bad recipient can never
//! abort a batch.

pub mod email;
pub mod sms;
pub mod whatsapp;

use sendfleet_core::error::{Result, SendFleetError};
use sendfleet_core::traits::ProviderAdapter;
use sendfleet_core::types::ChannelKind;
use std::collections::HashMap;
use std::time::Duration;

/// Build an adapter for a (channel, vendor) pair from decrypted credentials.
///
/// The credential map is consumed here and dropped with the adapter when the
/// send operation finishes — decrypted secrets never outlive one dispatch.
pub fn build_adapter(
    channel: ChannelKind,
    vendor: &str,
    creds: &HashMap<String, String>,
    timeout: Duration,
) -> Result<Box<dyn ProviderAdapter>> {
    match (channel, vendor) {
        (ChannelKind::Email, "smtp") => Ok(Box::new(email::SmtpEmailAdapter::from_credentials(
            creds, timeout,
        )?)),
        (ChannelKind::Email, "resend") => Ok(Box::new(email::ResendAdapter::from_credentials(
            creds, timeout,
        )?)),
        (ChannelKind::Sms, "twilio") => Ok(Box::new(sms::TwilioSmsAdapter::from_credentials(
            creds, timeout,
        )?)),
        (ChannelKind::Sms, "vonage") => Ok(Box::new(sms::VonageSmsAdapter::from_credentials(
            creds, timeout,
        )?)),
        (ChannelKind::Whatsapp, "meta") => Ok(Box::new(
            whatsapp::MetaWhatsAppAdapter::from_credentials(creds, timeout)?,
        )),
        (ChannelKind::Whatsapp, "twilio") => Ok(Box::new(
            whatsapp::TwilioWhatsAppAdapter::from_credentials(creds, timeout)?,
        )),
        _ => Err(SendFleetError::Config(format!(
            "Unknown {channel} vendor: {vendor}"
        ))),
    }
}

/// Pull a required, non-empty credential out of the decrypted map.
pub(crate) fn require(
    creds: &HashMap<String, String>,
    key: &str,
    vendor: &str,
) -> Result<String> {
    creds
        .get(key)
        .filter(|v| !v.is_empty())
        .cloned()
        .ok_or_else(|| SendFleetError::Config(format!("{vendor}: missing credential '{key}'")))
}

/// Canonical phone (digits, optional leading `+`) → E.164 with `+`.
pub(crate) fn e164(address: &str) -> String {
    if address.starts_with('+') {
        address.to_string()
    } else {
        format!("+{address}")
    }
}
