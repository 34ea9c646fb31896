//! Error taxonomy for the delivery engine.
//!
//! Configuration and validation errors are user-actionable and surface
//! verbatim; everything else is aggregated into job counters before it
//! reaches a caller.

use crate::types::ChannelKind;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SendFleetError>;

#[derive(Error, Debug)]
pub enum SendFleetError {
    /// Missing or malformed configuration — surfaced before any send.
    #[error("Config error: {0}")]
    Config(String),

    /// No provider is configured for a channel. Names the credential keys
    /// the tenant would need to set.
    #[error("No {channel} provider configured (missing: {})", .missing.join(", "))]
    ProviderNotConfigured {
        channel: ChannelKind,
        missing: Vec<String>,
    },

    /// Malformed payload or request — surfaced before any send.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Zero valid recipients after normalization; no job is created.
    #[error("No valid recipients after normalization")]
    NoRecipients,

    /// Programmer-level adapter misuse (wrong payload type for the channel).
    #[error("Adapter error: {0}")]
    Adapter(String),

    /// Persistence failure (job store, reminder store, suppression list).
    #[error("Store error: {0}")]
    Store(String),

    #[error("Secrets error: {0}")]
    Secrets(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SendFleetError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    pub fn adapter(msg: impl Into<String>) -> Self {
        Self::Adapter(msg.into())
    }

    /// Whether the initiating user can act on this error directly.
    /// Transport-level failures are never surfaced verbatim — they end up
    /// in job counters instead.
    pub fn user_actionable(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::ProviderNotConfigured { .. }
                | Self::Validation(_)
                | Self::NoRecipients
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_not_configured_names_missing_keys() {
        let err = SendFleetError::ProviderNotConfigured {
            channel: ChannelKind::Sms,
            missing: vec!["account_sid".into(), "auth_token".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("sms"));
        assert!(msg.contains("account_sid"));
        assert!(msg.contains("auth_token"));
        assert!(err.user_actionable());
    }

    #[test]
    fn transport_errors_are_not_user_actionable() {
        assert!(!SendFleetError::Adapter("timeout".into()).user_actionable());
        assert!(!SendFleetError::Store("locked".into()).user_actionable());
        assert!(SendFleetError::NoRecipients.user_actionable());
    }
}
