//! The provider adapter contract.

use crate::error::Result;
use crate::types::{ChannelKind, ChannelPayload, Recipient, SendOutcome};
use async_trait::async_trait;

/// One (channel, vendor) transport, constructed with decrypted credentials
/// for the duration of a single send operation.
///
/// Adapters normalize every vendor's API into [`SendOutcome`]: a delivery
/// failure (rejected address, provider 4xx/5xx, network timeout) is a
/// rejected outcome, never an `Err`. `Err` is reserved for programmer
/// errors such as handing an email payload to an SMS adapter.
#[async_trait]
pub trait ProviderAdapter: Send + Sync + std::fmt::Debug {
    /// Vendor identifier, e.g. "smtp", "resend", "twilio", "vonage", "meta".
    fn vendor(&self) -> &str;

    /// The channel this adapter delivers on.
    fn channel(&self) -> ChannelKind;

    /// Deliver one rendered payload to one recipient.
    async fn send(&self, recipient: &Recipient, payload: &ChannelPayload) -> Result<SendOutcome>;
}
