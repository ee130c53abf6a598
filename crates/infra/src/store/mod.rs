//! The entity store boundary.
//!
//! Each trait method is one atomic unit: implementations must commit every
//! row change it implies or none of them. The review commits
//! (`commit_approval`/`commit_rejection`) additionally carry the
//! compare-and-swap contract on the request status — a request that is no
//! longer `Pending` at commit time (terminal, deleted, or lost a concurrent
//! race) yields `CommitOutcome::AlreadyProcessed` with zero mutations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use campusmarket_catalog::Product;
use campusmarket_core::{ProductId, RequestId, UserId};
use campusmarket_moderation::{ApprovalEffect, ProductImage, ProductRequest, RequestStatus};

pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use in_memory::InMemoryMarketStore;

/// Store operation error.
///
/// Infrastructure failures (backend IO, constraint violations) as opposed to
/// domain errors. `ProductMissing` is the one workflow-visible case: an edit
/// approval whose target product vanished between submission and review. The
/// whole commit aborts, so the status flip never becomes visible.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("target product no longer exists")]
    ProductMissing,

    #[error("image ownership invariant violated: {0}")]
    Invariant(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Outcome of a guarded review commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Applied,
    AlreadyProcessed,
}

/// Identity record kept for display joins.
///
/// The workflow itself only consumes the id and role; the display name feeds
/// the joined moderation views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub display_name: String,
    pub role: String,
}

/// A request joined with everything the moderation views display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDetail {
    pub request: ProductRequest,
    /// Images still staged under the request, ordered by sort order then
    /// creation order.
    pub images: Vec<ProductImage>,
    pub requester: Option<UserRecord>,
    pub reviewer: Option<UserRecord>,
    pub original_product: Option<Product>,
}

/// Read filter for request listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestFilter {
    pub status: Option<RequestStatus>,
    pub requested_by: Option<UserId>,
}

/// An approval decision ready to be committed as one unit.
#[derive(Debug, Clone)]
pub struct ApprovedResolution {
    pub request_id: RequestId,
    pub reviewed_by: UserId,
    pub reviewed_at: DateTime<Utc>,
    pub effect: ApprovalEffect,
}

/// A rejection decision ready to be committed as one unit.
#[derive(Debug, Clone)]
pub struct RejectedResolution {
    pub request_id: RequestId,
    pub reviewed_by: UserId,
    pub reviewed_at: DateTime<Utc>,
    pub review_comment: Option<String>,
}

/// Durable records for products, images, requests and users.
#[async_trait]
pub trait MarketStore: Send + Sync {
    /// Insert a pending request together with its staged images.
    async fn insert_request(
        &self,
        request: &ProductRequest,
        staged: &[ProductImage],
    ) -> Result<(), StoreError>;

    async fn get_request(&self, id: RequestId) -> Result<Option<RequestDetail>, StoreError>;

    /// Requests matching `filter`, created-descending.
    async fn list_requests(&self, filter: RequestFilter) -> Result<Vec<RequestDetail>, StoreError>;

    /// Commit an approval: status flip (CAS on `Pending`), product creation
    /// or in-place update, prior-image deletion on the edit branch, and
    /// re-parenting of every staged image — one atomic unit.
    async fn commit_approval(
        &self,
        resolution: &ApprovedResolution,
    ) -> Result<CommitOutcome, StoreError>;

    /// Commit a rejection: status flip (CAS on `Pending`) plus audit fields.
    /// No catalog or image mutation.
    async fn commit_rejection(
        &self,
        resolution: &RejectedResolution,
    ) -> Result<CommitOutcome, StoreError>;

    /// Delete a request in any state, cascading images still owned by it.
    /// Images already re-parented to a product are untouched. Returns whether
    /// the request existed.
    async fn delete_request(&self, id: RequestId) -> Result<bool, StoreError>;

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError>;

    /// Live products, created-descending.
    async fn list_products(&self) -> Result<Vec<Product>, StoreError>;

    /// Images attached to a product, ordered by sort order then creation
    /// order.
    async fn product_images(&self, id: ProductId) -> Result<Vec<ProductImage>, StoreError>;

    /// Remove a product and its attached images. Returns whether the product
    /// existed. Pending edit requests against it keep their staged copies;
    /// their approval will then fail with `ProductMissing`.
    async fn delete_product(&self, id: ProductId) -> Result<bool, StoreError>;

    async fn upsert_user(&self, user: &UserRecord) -> Result<(), StoreError>;
}
