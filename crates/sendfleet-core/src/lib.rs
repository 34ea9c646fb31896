//! # SendFleet Core
//!
//! Shared foundation for the delivery engine: configuration, the error
//! taxonomy, channel/payload/recipient types, and the `ProviderAdapter`
//! contract every (channel, vendor) transport implements.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::SendFleetConfig;
pub use error::{Result, SendFleetError};
pub use traits::ProviderAdapter;
pub use types::{ChannelKind, ChannelPayload, RawRecipient, Recipient, SendOutcome};
