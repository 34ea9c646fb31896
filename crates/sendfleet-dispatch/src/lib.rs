//! # SendFleet Dispatch
//!
//! The campaign delivery path: resolve recipients, create a durable job,
//! and drive the batch/chunk dispatcher against one provider adapter while
//! streaming progress back to the job store.
//!
//! ```text
//! publish(request)
//!   ├── Resolver: normalize + dedupe + suppression check
//!   ├── JobStore: create (pending), atomic claim (→ processing)
//!   └── BatchDispatcher
//!         ├── batch 1 ── chunk 1..n (concurrent sends, chunk barrier)
//!         │              └── 100ms between chunks
//!         ├── 500ms between batches
//!         └── batch N → finish (completed | failed)
//! ```

pub mod batch;
pub mod jobs;
pub mod publish;
pub mod render;
pub mod resolver;
pub mod suppression;

pub use batch::{BatchDispatcher, DispatchReport};
pub use jobs::{CampaignJob, JobProgress, JobStatus, JobStore};
pub use publish::{PreparedDispatch, PublishReceipt, PublishRequest, Publisher};
pub use resolver::{ContactDirectory, RecipientSource, ResolvedRecipients, SkipTally};
pub use suppression::{SuppressionEntry, SuppressionStore};
