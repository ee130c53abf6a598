//! `campusmarket-infra` — entity store backends and the request lifecycle
//! manager.
//!
//! The [`store::MarketStore`] trait is the atomic-commit boundary: every
//! lifecycle operation maps to exactly one store call, and implementations
//! guarantee each call commits all of its row changes or none. The
//! [`service::ModerationService`] orchestrates validation, file storage and
//! pure domain decisions on top of it.

pub mod service;
pub mod store;

pub use service::{ApprovalReceipt, EditSubmission, ModerationError, ModerationService};
pub use store::{
    ApprovedResolution, CommitOutcome, InMemoryMarketStore, MarketStore, RejectedResolution,
    RequestDetail, RequestFilter, StoreError, UserRecord,
};

#[cfg(feature = "postgres")]
pub use store::postgres::PostgresMarketStore;
