//! # SendFleet Providers
//!
//! Everything between "tenant wants to send on a channel" and "here is a
//! ready adapter": the vendor registry (which vendors exist per channel and
//! what credentials they need), the per-tenant credential store (encrypted
//! at rest, decrypted lazily per send), and the router that turns
//! `(company_id, channel)` into an ordered fallback chain of adapters.

pub mod credentials;
pub mod registry;
pub mod router;

pub use credentials::{CredentialRecord, CredentialStore};
pub use registry::{VendorSpec, vendor_spec, vendors_for};
pub use router::ProviderRouter;
