//! The request lifecycle manager.
//!
//! `ModerationService` drives a request from submission to a terminal state
//! and applies its effects to the catalog. The pipeline for every mutation is
//! the same: capability check, validation, pure domain decision, one atomic
//! store commit. The service composes the [`MarketStore`] and [`FileStore`]
//! traits and performs no IO of its own, so it runs unchanged against the
//! in-memory and Postgres backends.

use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};

use campusmarket_auth::{authorize, AuthzError, Permission, Principal};
use campusmarket_catalog::{ListingFields, Product};
use campusmarket_core::{DomainError, ImageId, ProductId, RequestId};
use campusmarket_media::{validate_upload, FileStore, ImageUpload, MediaError};
use campusmarket_moderation::{
    copy_for_request, ApprovalEffect, ProductImage, ProductRequest, ReviewOutcome,
    MAX_IMAGES_PER_LISTING,
};

use crate::store::{
    ApprovedResolution, CommitOutcome, MarketStore, RejectedResolution, RequestDetail,
    RequestFilter, StoreError, UserRecord,
};

/// Failure taxonomy of the lifecycle operations.
///
/// `AlreadyProcessed` is deliberately absent: a repeat review is a reported
/// [`ReviewOutcome`], not an error.
#[derive(Debug, Error)]
pub enum ModerationError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("not found")]
    NotFound,

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("store: {0}")]
    Store(StoreError),
}

impl From<DomainError> for ModerationError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => ModerationError::Validation(msg),
            DomainError::InvalidId(msg) => ModerationError::Validation(msg),
            DomainError::InvariantViolation(msg) => ModerationError::InvariantViolation(msg),
            DomainError::NotFound => ModerationError::NotFound,
            DomainError::Unauthorized => ModerationError::Unauthorized,
        }
    }
}

impl From<StoreError> for ModerationError {
    fn from(value: StoreError) -> Self {
        match value {
            // A vanished edit target surfaces exactly like any other missing
            // resource; the commit was aborted with no partial state.
            StoreError::ProductMissing => ModerationError::NotFound,
            StoreError::Invariant(msg) => ModerationError::InvariantViolation(msg),
            other => ModerationError::Store(other),
        }
    }
}

impl From<AuthzError> for ModerationError {
    fn from(_: AuthzError) -> Self {
        ModerationError::Unauthorized
    }
}

/// Confirmation returned by a successful approval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalReceipt {
    pub product_id: ProductId,
    pub message: String,
}

/// Extra submission input when the request edits an existing product.
#[derive(Debug, Clone)]
pub struct EditSubmission {
    pub original_product_id: ProductId,
    /// Images of the original product the seller wants dropped.
    pub removed_image_ids: Vec<ImageId>,
}

fn review_permission() -> Permission {
    Permission::new("requests.review")
}

fn submit_permission() -> Permission {
    Permission::new("requests.submit")
}

fn manage_catalog_permission() -> Permission {
    Permission::new("catalog.manage")
}

/// Drives the `Pending → {Approved, Rejected}` lifecycle and the catalog
/// effects of approvals.
pub struct ModerationService<S, F> {
    store: S,
    files: F,
}

impl<S, F> ModerationService<S, F>
where
    S: MarketStore,
    F: FileStore,
{
    pub fn new(store: S, files: F) -> Self {
        Self { store, files }
    }

    /// Submit a listing or edit request.
    ///
    /// Everything is validated before the first write: field bounds, image
    /// count, and each upload's type and size. File saves happen before the
    /// single atomic insert; if one fails, the already-saved files are
    /// removed again and no request row exists.
    pub async fn submit(
        &self,
        principal: &Principal,
        fields: ListingFields,
        uploads: Vec<ImageUpload>,
        edit: Option<EditSubmission>,
    ) -> Result<ProductRequest, ModerationError> {
        authorize(principal, &submit_permission())?;
        fields.validate()?;
        for upload in &uploads {
            validate_upload(upload)?;
        }

        let now = Utc::now();
        let id = RequestId::new();

        let (request, copies) = match edit {
            None => {
                if uploads.is_empty() {
                    return Err(ModerationError::Validation(
                        "a new listing needs at least one image".to_string(),
                    ));
                }
                if uploads.len() > MAX_IMAGES_PER_LISTING {
                    return Err(ModerationError::Validation(format!(
                        "a listing can carry at most {MAX_IMAGES_PER_LISTING} images"
                    )));
                }
                let request =
                    ProductRequest::new_listing(id, principal.user_id, fields, now)?;
                (request, Vec::new())
            }
            Some(edit) => {
                let original = self
                    .store
                    .get_product(edit.original_product_id)
                    .await?
                    .ok_or(ModerationError::NotFound)?;
                let existing = self.store.product_images(original.id).await?;
                let kept: Vec<ProductImage> = existing
                    .into_iter()
                    .filter(|img| !edit.removed_image_ids.contains(&img.id))
                    .collect();

                let request =
                    ProductRequest::edit_of(id, principal.user_id, fields, original.id, now)?;

                if uploads.is_empty() {
                    // No new uploads: stage copies of the kept images so the
                    // live product is untouched until approval.
                    (request, copy_for_request(&kept, id, now))
                } else {
                    if kept.len() + uploads.len() > MAX_IMAGES_PER_LISTING {
                        return Err(ModerationError::Validation(format!(
                            "a listing can carry at most {MAX_IMAGES_PER_LISTING} images"
                        )));
                    }
                    (request, Vec::new())
                }
            }
        };

        let mut staged = copies;
        let mut saved_urls: Vec<String> = Vec::new();
        for (index, upload) in uploads.iter().enumerate() {
            match self.files.save(upload, id) {
                Ok(url) => {
                    saved_urls.push(url.clone());
                    staged.push(ProductImage::staged(
                        ImageId::new(),
                        id,
                        url,
                        index as u32,
                        now,
                    ));
                }
                Err(e) => {
                    // No partial submissions: roll the saved files back.
                    for url in &saved_urls {
                        self.files.delete(url);
                    }
                    return Err(e.into());
                }
            }
        }

        if let Err(e) = self.store.insert_request(&request, &staged).await {
            for url in &saved_urls {
                self.files.delete(url);
            }
            return Err(e.into());
        }

        info!(
            request_id = %request.id,
            requested_by = %request.requested_by,
            edit = request.is_edit(),
            images = staged.len(),
            "product request submitted"
        );
        Ok(request)
    }

    /// Approve a pending request and apply its effect to the catalog.
    pub async fn approve(
        &self,
        principal: &Principal,
        id: RequestId,
    ) -> Result<ReviewOutcome<ApprovalReceipt>, ModerationError> {
        authorize(principal, &review_permission())?;

        let detail = self
            .store
            .get_request(id)
            .await?
            .ok_or(ModerationError::NotFound)?;

        let mut request = detail.request;
        let now = Utc::now();
        let ReviewOutcome::Applied(effect) = request.approve(principal.user_id, ProductId::new(), now)
        else {
            warn!(request_id = %id, "approve on an already-processed request");
            return Ok(ReviewOutcome::AlreadyProcessed);
        };

        let (product_id, message) = match &effect {
            ApprovalEffect::CreateProduct { product } => (
                product.id,
                format!("Approved the listing request for \"{}\".", request.fields.name),
            ),
            ApprovalEffect::UpdateProduct { product_id, .. } => (
                *product_id,
                format!("Approved the edit request for \"{}\".", request.fields.name),
            ),
        };

        let resolution = ApprovedResolution {
            request_id: id,
            reviewed_by: principal.user_id,
            reviewed_at: now,
            effect,
        };

        match self.store.commit_approval(&resolution).await? {
            CommitOutcome::AlreadyProcessed => {
                // Lost the race to a concurrent reviewer.
                warn!(request_id = %id, "approval lost the commit race");
                Ok(ReviewOutcome::AlreadyProcessed)
            }
            CommitOutcome::Applied => {
                info!(
                    request_id = %id,
                    product_id = %product_id,
                    reviewed_by = %principal.user_id,
                    "product request approved"
                );
                Ok(ReviewOutcome::Applied(ApprovalReceipt {
                    product_id,
                    message,
                }))
            }
        }
    }

    /// Reject a pending request. The catalog is untouched; staged images stay
    /// with the request until it is deleted.
    pub async fn reject(
        &self,
        principal: &Principal,
        id: RequestId,
        comment: Option<String>,
    ) -> Result<ReviewOutcome<()>, ModerationError> {
        authorize(principal, &review_permission())?;

        let detail = self
            .store
            .get_request(id)
            .await?
            .ok_or(ModerationError::NotFound)?;

        let mut request = detail.request;
        let now = Utc::now();
        if !request
            .reject(principal.user_id, comment.clone(), now)
            .is_applied()
        {
            warn!(request_id = %id, "reject on an already-processed request");
            return Ok(ReviewOutcome::AlreadyProcessed);
        }

        let resolution = RejectedResolution {
            request_id: id,
            reviewed_by: principal.user_id,
            reviewed_at: now,
            review_comment: comment,
        };

        match self.store.commit_rejection(&resolution).await? {
            CommitOutcome::AlreadyProcessed => Ok(ReviewOutcome::AlreadyProcessed),
            CommitOutcome::Applied => {
                info!(request_id = %id, reviewed_by = %principal.user_id, "product request rejected");
                Ok(ReviewOutcome::Applied(()))
            }
        }
    }

    /// Delete a request in any state (administrative cleanup). Images still
    /// staged under it are removed; images re-parented to a product survive.
    pub async fn delete(
        &self,
        principal: &Principal,
        id: RequestId,
    ) -> Result<(), ModerationError> {
        authorize(principal, &review_permission())?;

        if self.store.delete_request(id).await? {
            info!(request_id = %id, "product request deleted");
            Ok(())
        } else {
            Err(ModerationError::NotFound)
        }
    }

    pub async fn get_request(
        &self,
        id: RequestId,
    ) -> Result<Option<RequestDetail>, ModerationError> {
        Ok(self.store.get_request(id).await?)
    }

    pub async fn list_requests(
        &self,
        filter: RequestFilter,
    ) -> Result<Vec<RequestDetail>, ModerationError> {
        Ok(self.store.list_requests(filter).await?)
    }

    pub async fn get_product(&self, id: ProductId) -> Result<Option<Product>, ModerationError> {
        Ok(self.store.get_product(id).await?)
    }

    pub async fn list_products(&self) -> Result<Vec<Product>, ModerationError> {
        Ok(self.store.list_products().await?)
    }

    pub async fn product_images(
        &self,
        id: ProductId,
    ) -> Result<Vec<ProductImage>, ModerationError> {
        Ok(self.store.product_images(id).await?)
    }

    /// Remove a product from the catalog (administrative).
    pub async fn remove_product(
        &self,
        principal: &Principal,
        id: ProductId,
    ) -> Result<(), ModerationError> {
        authorize(principal, &manage_catalog_permission())?;

        if self.store.delete_product(id).await? {
            info!(product_id = %id, "product removed from catalog");
            Ok(())
        } else {
            Err(ModerationError::NotFound)
        }
    }

    /// Record (or refresh) an identity for display joins.
    pub async fn record_user(&self, user: &UserRecord) -> Result<(), ModerationError> {
        Ok(self.store.upsert_user(user).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use campusmarket_auth::Role;
    use campusmarket_catalog::ShippingMethod;
    use campusmarket_core::UserId;
    use campusmarket_media::LocalFileStore;
    use campusmarket_moderation::RequestStatus;

    use crate::store::InMemoryMarketStore;

    type TestService = ModerationService<InMemoryMarketStore, LocalFileStore>;

    fn service() -> TestService {
        let root = std::env::temp_dir().join(format!(
            "campusmarket-service-{}",
            uuid::Uuid::now_v7().simple()
        ));
        ModerationService::new(
            InMemoryMarketStore::new(),
            LocalFileStore::new(root, "/media/products"),
        )
    }

    fn admin() -> Principal {
        Principal::new(UserId::new(), vec![Role::admin()])
    }

    fn member() -> Principal {
        Principal::new(UserId::new(), vec![Role::member()])
    }

    fn upload(name: &str) -> ImageUpload {
        ImageUpload::new(name, vec![0xAB; 64])
    }

    fn fields(name: &str, price_cents: u64) -> ListingFields {
        ListingFields {
            name: name.to_string(),
            price_cents,
            description: None,
            shipping_time_hours: 24,
            shipping_method: ShippingMethod::Express,
            shipping_fee_cents: 0,
        }
    }

    async fn listed_product(
        service: &TestService,
        seller: &Principal,
        reviewer: &Principal,
        image_count: usize,
    ) -> ProductId {
        let uploads = (0..image_count).map(|i| upload(&format!("{i}.jpg"))).collect();
        let request = service
            .submit(seller, fields("Desk Lamp", 2990), uploads, None)
            .await
            .unwrap();
        let ReviewOutcome::Applied(receipt) = service.approve(reviewer, request.id).await.unwrap()
        else {
            panic!("expected applied approval");
        };
        receipt.product_id
    }

    #[tokio::test]
    async fn desk_lamp_round_trip() {
        let service = service();
        let seller = member();
        let reviewer = admin();

        let request = service
            .submit(
                &seller,
                fields("Desk Lamp", 2990),
                vec![upload("a.jpg"), upload("b.png")],
                None,
            )
            .await
            .unwrap();

        assert_eq!(request.status, RequestStatus::Pending);
        let detail = service.get_request(request.id).await.unwrap().unwrap();
        assert_eq!(detail.images.len(), 2);
        assert_eq!(
            detail.images.iter().map(|i| i.is_main).collect::<Vec<_>>(),
            vec![true, false]
        );

        let ReviewOutcome::Applied(receipt) =
            service.approve(&reviewer, request.id).await.unwrap()
        else {
            panic!("expected applied approval");
        };
        assert!(receipt.message.contains("Desk Lamp"));

        let product = service
            .get_product(receipt.product_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(product.name, "Desk Lamp");
        assert_eq!(product.price_cents, 2990);

        let images = service.product_images(product.id).await.unwrap();
        assert_eq!(images.len(), 2);
        assert!(images.iter().all(|i| i.owning_product() == Some(product.id)));
        assert_eq!(
            images.iter().map(|i| i.sort_order).collect::<Vec<_>>(),
            vec![0, 1]
        );

        // No image still references the resolved request.
        let detail = service.get_request(request.id).await.unwrap().unwrap();
        assert_eq!(detail.request.status, RequestStatus::Approved);
        assert!(detail.images.is_empty());
    }

    #[tokio::test]
    async fn six_images_are_rejected_with_no_request_row() {
        let service = service();
        let uploads = (0..6).map(|i| upload(&format!("{i}.jpg"))).collect();

        let err = service
            .submit(&member(), fields("Desk Lamp", 2990), uploads, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ModerationError::Validation(_)));
        assert!(service
            .list_requests(RequestFilter::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn new_listing_requires_an_image() {
        let service = service();
        let err = service
            .submit(&member(), fields("Desk Lamp", 2990), vec![], None)
            .await
            .unwrap_err();
        assert!(matches!(err, ModerationError::Validation(_)));
    }

    #[tokio::test]
    async fn disallowed_file_type_aborts_the_submission() {
        let service = service();
        let err = service
            .submit(
                &member(),
                fields("Desk Lamp", 2990),
                vec![upload("a.jpg"), upload("b.exe")],
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ModerationError::Media(_)));
        assert!(service
            .list_requests(RequestFilter::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn invalid_fields_abort_the_submission() {
        let service = service();
        let err = service
            .submit(&member(), fields("", 2990), vec![upload("a.jpg")], None)
            .await
            .unwrap_err();
        assert!(matches!(err, ModerationError::Validation(_)));
    }

    #[tokio::test]
    async fn members_cannot_review() {
        let service = service();
        let seller = member();
        let request = service
            .submit(&seller, fields("Desk Lamp", 2990), vec![upload("a.jpg")], None)
            .await
            .unwrap();

        for result in [
            service.approve(&seller, request.id).await.err(),
            service
                .reject(&seller, request.id, None)
                .await
                .err(),
        ] {
            assert!(matches!(result, Some(ModerationError::Unauthorized)));
        }
        assert!(matches!(
            service.delete(&seller, request.id).await,
            Err(ModerationError::Unauthorized)
        ));

        let detail = service.get_request(request.id).await.unwrap().unwrap();
        assert_eq!(detail.request.status, RequestStatus::Pending);
    }

    #[tokio::test]
    async fn reviews_are_effective_exactly_once() {
        let service = service();
        let reviewer = admin();
        let request = service
            .submit(&member(), fields("Desk Lamp", 2990), vec![upload("a.jpg")], None)
            .await
            .unwrap();

        assert!(service
            .approve(&reviewer, request.id)
            .await
            .unwrap()
            .is_applied());

        assert_eq!(
            service.approve(&reviewer, request.id).await.unwrap(),
            ReviewOutcome::AlreadyProcessed
        );
        assert_eq!(
            service
                .reject(&reviewer, request.id, Some("too late".to_string()))
                .await
                .unwrap(),
            ReviewOutcome::AlreadyProcessed
        );

        // Only one product was ever materialized, and the late reject left
        // no comment behind.
        assert_eq!(service.list_products().await.unwrap().len(), 1);
        let detail = service.get_request(request.id).await.unwrap().unwrap();
        assert_eq!(detail.request.review_comment, None);
    }

    #[tokio::test]
    async fn rejection_leaves_the_catalog_untouched() {
        let service = service();
        let reviewer = admin();
        let request = service
            .submit(&member(), fields("Desk Lamp", 2990), vec![upload("a.jpg")], None)
            .await
            .unwrap();

        let outcome = service
            .reject(&reviewer, request.id, Some("blurry photos".to_string()))
            .await
            .unwrap();
        assert!(outcome.is_applied());

        assert!(service.list_products().await.unwrap().is_empty());
        let detail = service.get_request(request.id).await.unwrap().unwrap();
        assert_eq!(detail.request.status, RequestStatus::Rejected);
        assert_eq!(detail.request.review_comment.as_deref(), Some("blurry photos"));
        assert_eq!(detail.request.reviewed_by, Some(reviewer.user_id));
        // Staged images stay with the rejected request until it is deleted.
        assert_eq!(detail.images.len(), 1);

        let outcome = service.reject(&reviewer, request.id, None).await.unwrap();
        assert_eq!(outcome, ReviewOutcome::AlreadyProcessed);
    }

    #[tokio::test]
    async fn edit_approval_updates_the_product_in_place() {
        let service = service();
        let seller = member();
        let reviewer = admin();
        let product_id = listed_product(&service, &seller, &reviewer, 2).await;
        let before = service.product_images(product_id).await.unwrap();

        // No new uploads: the kept images are copied onto the request.
        let edit = service
            .submit(
                &seller,
                fields("Desk Lamp (black)", 2490),
                vec![],
                Some(EditSubmission {
                    original_product_id: product_id,
                    removed_image_ids: vec![],
                }),
            )
            .await
            .unwrap();

        let detail = service.get_request(edit.id).await.unwrap().unwrap();
        assert_eq!(detail.images.len(), 2);
        // Copies, not moves: the live product still has its originals.
        assert_eq!(
            service.product_images(product_id).await.unwrap(),
            before
        );

        let ReviewOutcome::Applied(receipt) = service.approve(&reviewer, edit.id).await.unwrap()
        else {
            panic!("expected applied approval");
        };
        assert_eq!(receipt.product_id, product_id);
        assert!(receipt.message.contains("edit"));

        // Same product, new fields, replaced image set.
        assert_eq!(service.list_products().await.unwrap().len(), 1);
        let product = service.get_product(product_id).await.unwrap().unwrap();
        assert_eq!(product.name, "Desk Lamp (black)");
        assert_eq!(product.price_cents, 2490);

        let after = service.product_images(product_id).await.unwrap();
        assert_eq!(after.len(), 2);
        let before_ids: Vec<_> = before.iter().map(|i| i.id).collect();
        assert!(after.iter().all(|img| !before_ids.contains(&img.id)));
    }

    #[tokio::test]
    async fn edit_with_uploads_respects_the_image_cap() {
        let service = service();
        let seller = member();
        let reviewer = admin();
        let product_id = listed_product(&service, &seller, &reviewer, 4).await;

        let err = service
            .submit(
                &seller,
                fields("Desk Lamp", 2990),
                vec![upload("x.jpg"), upload("y.jpg")],
                Some(EditSubmission {
                    original_product_id: product_id,
                    removed_image_ids: vec![],
                }),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ModerationError::Validation(_)));

        // Dropping enough originals makes room.
        let existing = service.product_images(product_id).await.unwrap();
        let request = service
            .submit(
                &seller,
                fields("Desk Lamp", 2990),
                vec![upload("x.jpg"), upload("y.jpg")],
                Some(EditSubmission {
                    original_product_id: product_id,
                    removed_image_ids: existing.iter().take(1).map(|i| i.id).collect(),
                }),
            )
            .await
            .unwrap();

        // Only the new uploads are staged on the upload path.
        let detail = service.get_request(request.id).await.unwrap().unwrap();
        assert_eq!(detail.images.len(), 2);
    }

    #[tokio::test]
    async fn edit_of_a_missing_product_is_not_found() {
        let service = service();
        let err = service
            .submit(
                &member(),
                fields("Ghost", 100),
                vec![],
                Some(EditSubmission {
                    original_product_id: ProductId::new(),
                    removed_image_ids: vec![],
                }),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ModerationError::NotFound));
    }

    #[tokio::test]
    async fn approving_an_edit_whose_target_vanished_aborts_with_not_found() {
        let service = service();
        let seller = member();
        let reviewer = admin();
        let product_id = listed_product(&service, &seller, &reviewer, 1).await;

        let edit = service
            .submit(
                &seller,
                fields("Desk Lamp v2", 1990),
                vec![],
                Some(EditSubmission {
                    original_product_id: product_id,
                    removed_image_ids: vec![],
                }),
            )
            .await
            .unwrap();

        service.remove_product(&reviewer, product_id).await.unwrap();

        let err = service.approve(&reviewer, edit.id).await.unwrap_err();
        assert!(matches!(err, ModerationError::NotFound));

        // No partial mutation: the edit request is still pending.
        let detail = service.get_request(edit.id).await.unwrap().unwrap();
        assert_eq!(detail.request.status, RequestStatus::Pending);
        assert_eq!(detail.request.reviewed_at, None);
    }

    #[tokio::test]
    async fn deleting_requests_cascades_only_staged_images() {
        let service = service();
        let seller = member();
        let reviewer = admin();

        let pending = service
            .submit(&seller, fields("Pending", 100), vec![upload("a.jpg")], None)
            .await
            .unwrap();
        let product_id = listed_product(&service, &seller, &reviewer, 2).await;
        let approved_id = service
            .list_requests(RequestFilter {
                status: Some(RequestStatus::Approved),
                requested_by: None,
            })
            .await
            .unwrap()[0]
            .request
            .id;

        service.delete(&reviewer, pending.id).await.unwrap();
        service.delete(&reviewer, approved_id).await.unwrap();

        assert!(service.get_request(pending.id).await.unwrap().is_none());
        // Images re-parented to the product survived its request's deletion.
        assert_eq!(service.product_images(product_id).await.unwrap().len(), 2);

        assert!(matches!(
            service.delete(&reviewer, pending.id).await,
            Err(ModerationError::NotFound)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_approvals_materialize_exactly_one_product() {
        let service = Arc::new(service());
        let request = service
            .submit(&member(), fields("Desk Lamp", 2990), vec![upload("a.jpg")], None)
            .await
            .unwrap();

        let first = {
            let service = Arc::clone(&service);
            let id = request.id;
            tokio::spawn(async move { service.approve(&admin(), id).await.unwrap() })
        };
        let second = {
            let service = Arc::clone(&service);
            let id = request.id;
            tokio::spawn(async move { service.approve(&admin(), id).await.unwrap() })
        };

        let (a, b) = (first.await.unwrap(), second.await.unwrap());
        let applied = [&a, &b].iter().filter(|o| o.is_applied()).count();
        assert_eq!(applied, 1, "exactly one approval must win");
        assert_eq!(service.list_products().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn request_listings_join_recorded_users() {
        let service = service();
        let seller = member();
        service
            .record_user(&UserRecord {
                id: seller.user_id,
                display_name: "Sam".to_string(),
                role: "member".to_string(),
            })
            .await
            .unwrap();

        service
            .submit(&seller, fields("Desk Lamp", 2990), vec![upload("a.jpg")], None)
            .await
            .unwrap();

        let listed = service
            .list_requests(RequestFilter {
                status: None,
                requested_by: Some(seller.user_id),
            })
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].requester.as_ref().unwrap().display_name, "Sam");
    }
}
