//! Channel, payload, recipient, and send-outcome types shared across crates.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A delivery medium with its own provider ecosystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Email,
    Sms,
    Whatsapp,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 3] =
        [ChannelKind::Email, ChannelKind::Sms, ChannelKind::Whatsapp];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Sms => "sms",
            Self::Whatsapp => "whatsapp",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "email" => Some(Self::Email),
            "sms" => Some(Self::Sms),
            "whatsapp" => Some(Self::Whatsapp),
            _ => None,
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Channel-specific content for one job. Tagged by channel so a payload can
/// never be dispatched down the wrong transport; vendor-specific field
/// requirements are validated at the router boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "channel", rename_all = "snake_case")]
pub enum ChannelPayload {
    Email {
        subject: String,
        body: String,
        #[serde(default)]
        from_name: Option<String>,
    },
    Sms {
        message: String,
        #[serde(default)]
        template_id: Option<String>,
    },
    Whatsapp {
        message: String,
        #[serde(default)]
        template_id: Option<String>,
        #[serde(default)]
        template_params: Vec<String>,
    },
}

impl ChannelPayload {
    pub fn channel(&self) -> ChannelKind {
        match self {
            Self::Email { .. } => ChannelKind::Email,
            Self::Sms { .. } => ChannelKind::Sms,
            Self::Whatsapp { .. } => ChannelKind::Whatsapp,
        }
    }
}

/// A recipient as submitted by the caller — nothing validated yet.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawRecipient {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub custom_fields: HashMap<String, String>,
}

/// A validated, channel-normalized recipient. Ephemeral — lives only for
/// the duration of one dispatch, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Recipient {
    /// Normalized email address or canonical phone number.
    pub address: String,
    pub display_name: String,
    pub custom_fields: HashMap<String, String>,
}

/// Uniform result shape every provider adapter returns.
///
/// Ordinary delivery failures are a rejected outcome, not an `Err` — an
/// adapter only errors on programmer-level misuse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendOutcome {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SendOutcome {
    pub fn accepted(provider_message_id: impl Into<String>) -> Self {
        Self {
            accepted: true,
            provider_message_id: Some(provider_message_id.into()),
            error: None,
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            accepted: false,
            provider_message_id: None,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_kind_roundtrip() {
        for kind in ChannelKind::ALL {
            assert_eq!(ChannelKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ChannelKind::parse("WhatsApp"), Some(ChannelKind::Whatsapp));
        assert_eq!(ChannelKind::parse("fax"), None);
    }

    #[test]
    fn payload_tagged_by_channel() {
        let payload = ChannelPayload::Sms {
            message: "Hi {first_name}".into(),
            template_id: None,
        };
        assert_eq!(payload.channel(), ChannelKind::Sms);

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["channel"], "sms");

        let back: ChannelPayload = serde_json::from_value(json).unwrap();
        assert_eq!(back.channel(), ChannelKind::Sms);
    }

    #[test]
    fn outcome_constructors() {
        let ok = SendOutcome::accepted("msg-123");
        assert!(ok.accepted);
        assert_eq!(ok.provider_message_id.as_deref(), Some("msg-123"));

        let bad = SendOutcome::rejected("mailbox full");
        assert!(!bad.accepted);
        assert_eq!(bad.error.as_deref(), Some("mailbox full"));
    }
}
