//! Vendor registry — the static catalog of supported (channel, vendor)
//! pairs and the credential keys each one requires.
//!
//! Channel routing consults this catalog instead of iterating whatever keys
//! happen to be configured, so provider ordering is deterministic and error
//! messages can name exactly what a tenant still has to set up.

use sendfleet_core::types::ChannelKind;

/// One supported vendor on one channel.
#[derive(Debug, Clone, Copy)]
pub struct VendorSpec {
    /// Vendor identifier as stored in credential records.
    pub name: &'static str,
    pub channel: ChannelKind,
    /// Credential keys that must be present and non-empty.
    pub required_keys: &'static [&'static str],
    /// Human-readable label for dashboards and error text.
    pub label: &'static str,
}

static EMAIL_VENDORS: &[VendorSpec] = &[
    VendorSpec {
        name: "smtp",
        channel: ChannelKind::Email,
        required_keys: &["smtp_host", "username", "password", "from_email"],
        label: "SMTP relay",
    },
    VendorSpec {
        name: "resend",
        channel: ChannelKind::Email,
        required_keys: &["api_key", "from_email"],
        label: "Resend",
    },
];

static SMS_VENDORS: &[VendorSpec] = &[
    VendorSpec {
        name: "twilio",
        channel: ChannelKind::Sms,
        required_keys: &["account_sid", "auth_token", "from_number"],
        label: "Twilio SMS",
    },
    VendorSpec {
        name: "vonage",
        channel: ChannelKind::Sms,
        required_keys: &["api_key", "api_secret", "from"],
        label: "Vonage SMS",
    },
];

static WHATSAPP_VENDORS: &[VendorSpec] = &[
    VendorSpec {
        name: "meta",
        channel: ChannelKind::Whatsapp,
        required_keys: &["access_token", "phone_number_id"],
        label: "WhatsApp Cloud API",
    },
    VendorSpec {
        name: "twilio",
        channel: ChannelKind::Whatsapp,
        required_keys: &["account_sid", "auth_token", "from_number"],
        label: "Twilio WhatsApp",
    },
];

/// Supported vendors for a channel, in default priority order.
pub fn vendors_for(channel: ChannelKind) -> &'static [VendorSpec] {
    match channel {
        ChannelKind::Email => EMAIL_VENDORS,
        ChannelKind::Sms => SMS_VENDORS,
        ChannelKind::Whatsapp => WHATSAPP_VENDORS,
    }
}

/// Look up one vendor on one channel.
pub fn vendor_spec(channel: ChannelKind, name: &str) -> Option<&'static VendorSpec> {
    vendors_for(channel).iter().find(|v| v.name == name)
}

/// `vendor.key` strings for every vendor of a channel — the "what you would
/// need to configure" list in `ProviderNotConfigured` errors.
pub fn missing_keys(channel: ChannelKind) -> Vec<String> {
    vendors_for(channel)
        .iter()
        .flat_map(|v| v.required_keys.iter().map(|k| format!("{}.{k}", v.name)))
        .collect()
}
