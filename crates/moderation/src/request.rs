//! The product request state machine.
//!
//! `Pending` is initial; `Approved` and `Rejected` are terminal. The only
//! transitions are `Pending → Approved` and `Pending → Rejected`, each
//! effective exactly once. A review attempt against a resolved request is a
//! reported outcome (`AlreadyProcessed`), never an error — the admin surface
//! treats it as information, not failure.
//!
//! The decisions here are pure. The store commits them atomically, guarded
//! by its own compare-and-swap on the status column, so a concurrent review
//! that loses the race is also reported as `AlreadyProcessed`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use campusmarket_catalog::{ListingFields, Product};
use campusmarket_core::{DomainError, DomainResult, ProductId, RequestId, UserId};

/// Lifecycle status of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }
}

impl core::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for RequestStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RequestStatus::Pending),
            "approved" => Ok(RequestStatus::Approved),
            "rejected" => Ok(RequestStatus::Rejected),
            other => Err(DomainError::validation(format!(
                "unknown request status '{other}'"
            ))),
        }
    }
}

/// Result of a review attempt.
///
/// `AlreadyProcessed` is the idempotent no-op path: the request had already
/// reached a terminal state (or lost the commit race) and nothing changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewOutcome<T> {
    Applied(T),
    AlreadyProcessed,
}

impl<T> ReviewOutcome<T> {
    pub fn is_applied(&self) -> bool {
        matches!(self, ReviewOutcome::Applied(_))
    }
}

/// What an approval does to the catalog.
///
/// Computed purely from the request; the store executes it in the same
/// atomic unit as the status flip and the image re-parenting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalEffect {
    /// New-listing branch: materialize a product from the request's fields.
    CreateProduct { product: Product },
    /// Edit branch: overwrite the original product's fields in place and
    /// replace its images with the request's staged set.
    UpdateProduct {
        product_id: ProductId,
        fields: ListingFields,
    },
}

/// A pending or resolved submission to list or modify a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRequest {
    pub id: RequestId,
    pub fields: ListingFields,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_comment: Option<String>,
    pub requested_by: UserId,
    pub reviewed_by: Option<UserId>,
    /// `Some` ⇒ edit request against an existing product; `None` ⇒ new listing.
    pub original_product_id: Option<ProductId>,
}

impl ProductRequest {
    /// Submit a new-listing request.
    pub fn new_listing(
        id: RequestId,
        requested_by: UserId,
        fields: ListingFields,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        fields.validate()?;
        Ok(Self {
            id,
            fields,
            status: RequestStatus::Pending,
            created_at: now,
            reviewed_at: None,
            review_comment: None,
            requested_by,
            reviewed_by: None,
            original_product_id: None,
        })
    }

    /// Submit an edit request against an existing product.
    pub fn edit_of(
        id: RequestId,
        requested_by: UserId,
        fields: ListingFields,
        original_product_id: ProductId,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let mut request = Self::new_listing(id, requested_by, fields, now)?;
        request.original_product_id = Some(original_product_id);
        Ok(request)
    }

    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }

    pub fn is_edit(&self) -> bool {
        self.original_product_id.is_some()
    }

    /// Approve this request.
    ///
    /// On the new-listing branch the caller preallocates `new_product_id`
    /// (ids are passed in for determinism); on the edit branch it is unused.
    /// Resolved requests are untouched and report `AlreadyProcessed`.
    pub fn approve(
        &mut self,
        reviewed_by: UserId,
        new_product_id: ProductId,
        now: DateTime<Utc>,
    ) -> ReviewOutcome<ApprovalEffect> {
        if self.status.is_terminal() {
            return ReviewOutcome::AlreadyProcessed;
        }

        self.status = RequestStatus::Approved;
        self.reviewed_at = Some(now);
        self.reviewed_by = Some(reviewed_by);

        let effect = match self.original_product_id {
            None => ApprovalEffect::CreateProduct {
                product: Product::from_fields(new_product_id, &self.fields, now),
            },
            Some(product_id) => ApprovalEffect::UpdateProduct {
                product_id,
                fields: self.fields.clone(),
            },
        };
        ReviewOutcome::Applied(effect)
    }

    /// Reject this request.
    ///
    /// The comment is persisted verbatim (including absence). No catalog or
    /// image mutation happens on rejection.
    pub fn reject(
        &mut self,
        reviewed_by: UserId,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> ReviewOutcome<()> {
        if self.status.is_terminal() {
            return ReviewOutcome::AlreadyProcessed;
        }

        self.status = RequestStatus::Rejected;
        self.reviewed_at = Some(now);
        self.reviewed_by = Some(reviewed_by);
        self.review_comment = comment;
        ReviewOutcome::Applied(())
    }
}
