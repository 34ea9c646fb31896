//! # SendFleet Gateway
//!
//! The HTTP surface over the delivery engine. Publish is the only place a
//! dispatch is spawned; everything else is read-or-trigger: job status,
//! reminder ticks, appointment lifecycle, and inbound provider webhooks
//! that feed the suppression list.

pub mod routes;
pub mod server;

pub use server::{AppState, build_router, serve};
