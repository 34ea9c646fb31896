//! Recipient resolver — turns a source descriptor into a concrete ordered
//! recipient list, normalized and deduplicated per channel.
//!
//! Everything dropped here is a pre-send skip, tallied separately from
//! `progress.failed` (which counts provider-level failures only). No job is
//! ever created from an empty resolution.

use async_trait::async_trait;
use sendfleet_core::error::{Result, SendFleetError};
use sendfleet_core::types::{ChannelKind, RawRecipient, Recipient};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Where the recipients come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecipientSource {
    /// Recipients submitted inline with the request.
    Inline { recipients: Vec<RawRecipient> },
    /// One recipient (transactional sends, reminders).
    Single { recipient: RawRecipient },
    /// A stored contact list, resolved through the tenant's CRM store.
    ContactList { list_id: String },
}

/// The tenant contact store — an external collaborator. The engine only
/// needs "give me the raw members of this list".
#[async_trait]
pub trait ContactDirectory: Send + Sync {
    async fn contacts_in_list(&self, company_id: &str, list_id: &str)
    -> Result<Vec<RawRecipient>>;
}

/// Counts of recipients excluded before dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SkipTally {
    pub no_address: u32,
    pub invalid_format: u32,
    pub duplicate: u32,
    pub suppressed: u32,
}

impl SkipTally {
    pub fn total(&self) -> u32 {
        self.no_address + self.invalid_format + self.duplicate + self.suppressed
    }
}

#[derive(Debug)]
pub struct ResolvedRecipients {
    pub recipients: Vec<Recipient>,
    pub skipped: SkipTally,
}

/// Normalize, validate, deduplicate. Order-preserving: the first occurrence
/// of an address keeps its slot, later duplicates are tallied and dropped.
pub fn resolve(
    channel: ChannelKind,
    raw: Vec<RawRecipient>,
    suppressed: &HashSet<String>,
) -> Result<ResolvedRecipients> {
    let mut skipped = SkipTally::default();
    let mut seen: HashSet<String> = HashSet::new();
    let mut recipients = Vec::with_capacity(raw.len());

    for entry in raw {
        let Some(address) = entry.address.as_deref().map(str::trim).filter(|a| !a.is_empty())
        else {
            skipped.no_address += 1;
            continue;
        };
        let Some(normalized) = normalize_address(channel, address) else {
            skipped.invalid_format += 1;
            continue;
        };
        if !seen.insert(normalized.clone()) {
            skipped.duplicate += 1;
            continue;
        }
        if suppressed.contains(&normalized) {
            skipped.suppressed += 1;
            continue;
        }
        recipients.push(Recipient {
            address: normalized,
            display_name: entry.display_name.unwrap_or_default(),
            custom_fields: entry.custom_fields,
        });
    }

    if recipients.is_empty() {
        return Err(SendFleetError::NoRecipients);
    }

    tracing::debug!(
        "Resolved {} {channel} recipient(s), {} skipped",
        recipients.len(),
        skipped.total()
    );
    Ok(ResolvedRecipients {
        recipients,
        skipped,
    })
}

/// Channel-appropriate normalization.
pub fn normalize_address(channel: ChannelKind, address: &str) -> Option<String> {
    match channel {
        ChannelKind::Email => normalize_email(address),
        ChannelKind::Sms | ChannelKind::Whatsapp => normalize_phone(address),
    }
}

/// Lowercase, trimmed, structurally plausible email.
pub fn normalize_email(address: &str) -> Option<String> {
    let normalized = address.trim().to_ascii_lowercase();
    let (local, domain) = normalized.split_once('@')?;
    if local.is_empty()
        || domain.is_empty()
        || domain.contains('@')
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
        || normalized.chars().any(char::is_whitespace)
    {
        return None;
    }
    Some(normalized)
}

/// Canonical digit-only phone form: separators stripped, optional leading
/// `+` preserved, `00` international prefix folded into `+`.
pub fn normalize_phone(address: &str) -> Option<String> {
    let trimmed = address.trim();
    let plus = trimmed.starts_with('+') || trimmed.starts_with("00");
    let digits: String = trimmed
        .trim_start_matches("00")
        .chars()
        .filter(char::is_ascii_digit)
        .collect();
    if digits.len() < 8 || digits.len() > 15 {
        return None;
    }
    Some(if plus { format!("+{digits}") } else { digits })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn raw(address: &str) -> RawRecipient {
        RawRecipient {
            address: Some(address.to_string()),
            display_name: None,
            custom_fields: HashMap::new(),
        }
    }

    #[test]
    fn email_normalization() {
        assert_eq!(
            normalize_email("  Pat@Example.COM "),
            Some("pat@example.com".into())
        );
        assert_eq!(normalize_email("no-at-sign"), None);
        assert_eq!(normalize_email("a@b"), None);
        assert_eq!(normalize_email("a@.com"), None);
        assert_eq!(normalize_email("a b@example.com"), None);
    }

    #[test]
    fn phone_normalization() {
        assert_eq!(
            normalize_phone("+1 (555) 123-0000"),
            Some("+15551230000".into())
        );
        assert_eq!(normalize_phone("0084 90 123 4567"), Some("+84901234567".into()));
        assert_eq!(normalize_phone("555123"), None); // too short
        assert_eq!(normalize_phone("12345678901234567890"), None); // too long
    }

    #[test]
    fn dedup_is_order_preserving_first_wins() {
        let resolved = resolve(
            ChannelKind::Email,
            vec![
                raw("a@example.com"),
                raw("b@example.com"),
                raw("A@EXAMPLE.com"), // dup of first after normalization
                raw("c@example.com"),
            ],
            &HashSet::new(),
        )
        .unwrap();
        let addrs: Vec<&str> = resolved
            .recipients
            .iter()
            .map(|r| r.address.as_str())
            .collect();
        assert_eq!(addrs, vec!["a@example.com", "b@example.com", "c@example.com"]);
        assert_eq!(resolved.skipped.duplicate, 1);
    }

    #[test]
    fn skip_tally_covers_every_drop_reason() {
        let suppressed = HashSet::from(["gone@example.com".to_string()]);
        let resolved = resolve(
            ChannelKind::Email,
            vec![
                RawRecipient::default(), // no address
                raw("not-an-email"),
                raw("ok@example.com"),
                raw("ok@example.com"),
                raw("gone@example.com"),
            ],
            &suppressed,
        )
        .unwrap();
        assert_eq!(resolved.recipients.len(), 1);
        assert_eq!(
            resolved.skipped,
            SkipTally {
                no_address: 1,
                invalid_format: 1,
                duplicate: 1,
                suppressed: 1,
            }
        );
        assert_eq!(resolved.skipped.total(), 4);
    }

    #[test]
    fn empty_resolution_is_a_terminal_error() {
        let err = resolve(
            ChannelKind::Sms,
            vec![raw("junk"), RawRecipient::default()],
            &HashSet::new(),
        )
        .unwrap_err();
        assert!(matches!(err, SendFleetError::NoRecipients));
    }
}
