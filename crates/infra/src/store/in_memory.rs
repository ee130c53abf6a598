//! In-memory store (dev/test).
//!
//! A single mutex over the whole state makes every trait method one critical
//! section, which is exactly the atomic-commit contract the trait demands.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use campusmarket_catalog::Product;
use campusmarket_core::{ImageId, ProductId, RequestId, UserId};
use campusmarket_moderation::{
    reparent, ApprovalEffect, ProductImage, ProductRequest, RequestStatus,
};

use super::{
    ApprovedResolution, CommitOutcome, MarketStore, RejectedResolution, RequestDetail,
    RequestFilter, StoreError, UserRecord,
};

#[derive(Default)]
struct State {
    requests: HashMap<RequestId, ProductRequest>,
    products: HashMap<ProductId, Product>,
    images: HashMap<ImageId, ProductImage>,
    users: HashMap<UserId, UserRecord>,
}

impl State {
    fn staged_images(&self, request: RequestId) -> Vec<ProductImage> {
        let mut images: Vec<ProductImage> = self
            .images
            .values()
            .filter(|img| img.owning_request() == Some(request))
            .cloned()
            .collect();
        images.sort_by(|a, b| {
            (a.sort_order, a.created_at, a.id.as_uuid())
                .cmp(&(b.sort_order, b.created_at, b.id.as_uuid()))
        });
        images
    }

    fn attached_images(&self, product: ProductId) -> Vec<ProductImage> {
        let mut images: Vec<ProductImage> = self
            .images
            .values()
            .filter(|img| img.owning_product() == Some(product))
            .cloned()
            .collect();
        images.sort_by(|a, b| {
            (a.sort_order, a.created_at, a.id.as_uuid())
                .cmp(&(b.sort_order, b.created_at, b.id.as_uuid()))
        });
        images
    }

    fn detail(&self, request: &ProductRequest) -> RequestDetail {
        RequestDetail {
            images: self.staged_images(request.id),
            requester: self.users.get(&request.requested_by).cloned(),
            reviewer: request
                .reviewed_by
                .and_then(|id| self.users.get(&id).cloned()),
            original_product: request
                .original_product_id
                .and_then(|id| self.products.get(&id).cloned()),
            request: request.clone(),
        }
    }
}

/// Mutex-guarded in-memory [`MarketStore`].
#[derive(Default)]
pub struct InMemoryMarketStore {
    state: Mutex<State>,
}

impl InMemoryMarketStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MarketStore for InMemoryMarketStore {
    async fn insert_request(
        &self,
        request: &ProductRequest,
        staged: &[ProductImage],
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state.requests.insert(request.id, request.clone());
        for image in staged {
            state.images.insert(image.id, image.clone());
        }
        Ok(())
    }

    async fn get_request(&self, id: RequestId) -> Result<Option<RequestDetail>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state.requests.get(&id).map(|r| state.detail(r)))
    }

    async fn list_requests(&self, filter: RequestFilter) -> Result<Vec<RequestDetail>, StoreError> {
        let state = self.state.lock().unwrap();
        let mut details: Vec<RequestDetail> = state
            .requests
            .values()
            .filter(|r| filter.status.is_none_or(|s| r.status == s))
            .filter(|r| filter.requested_by.is_none_or(|u| r.requested_by == u))
            .map(|r| state.detail(r))
            .collect();
        details.sort_by(|a, b| {
            (b.request.created_at, b.request.id.as_uuid())
                .cmp(&(a.request.created_at, a.request.id.as_uuid()))
        });
        Ok(details)
    }

    async fn commit_approval(
        &self,
        resolution: &ApprovedResolution,
    ) -> Result<CommitOutcome, StoreError> {
        let mut state = self.state.lock().unwrap();

        // CAS: only a still-pending request can be resolved.
        match state.requests.get(&resolution.request_id) {
            Some(request) if request.is_pending() => {}
            _ => return Ok(CommitOutcome::AlreadyProcessed),
        }

        // Verify the edit target before touching anything, so a missing
        // product aborts with zero mutations.
        if let ApprovalEffect::UpdateProduct { product_id, .. } = &resolution.effect {
            if !state.products.contains_key(product_id) {
                return Err(StoreError::ProductMissing);
            }
        }

        let target = match &resolution.effect {
            ApprovalEffect::CreateProduct { product } => {
                state.products.insert(product.id, product.clone());
                product.id
            }
            ApprovalEffect::UpdateProduct { product_id, fields } => {
                if let Some(product) = state.products.get_mut(product_id) {
                    product.apply_fields(fields);
                }
                // The edit replaces the product's image set wholesale.
                let prior: Vec<ImageId> = state
                    .attached_images(*product_id)
                    .iter()
                    .map(|img| img.id)
                    .collect();
                for id in prior {
                    state.images.remove(&id);
                }
                *product_id
            }
        };

        let mut staged = state.staged_images(resolution.request_id);
        reparent(&mut staged, resolution.request_id, target)
            .map_err(|e| StoreError::Invariant(e.to_string()))?;
        for image in staged {
            state.images.insert(image.id, image);
        }

        if let Some(request) = state.requests.get_mut(&resolution.request_id) {
            request.status = RequestStatus::Approved;
            request.reviewed_at = Some(resolution.reviewed_at);
            request.reviewed_by = Some(resolution.reviewed_by);
        }

        Ok(CommitOutcome::Applied)
    }

    async fn commit_rejection(
        &self,
        resolution: &RejectedResolution,
    ) -> Result<CommitOutcome, StoreError> {
        let mut state = self.state.lock().unwrap();

        match state.requests.get_mut(&resolution.request_id) {
            Some(request) if request.is_pending() => {
                request.status = RequestStatus::Rejected;
                request.reviewed_at = Some(resolution.reviewed_at);
                request.reviewed_by = Some(resolution.reviewed_by);
                request.review_comment = resolution.review_comment.clone();
                Ok(CommitOutcome::Applied)
            }
            _ => Ok(CommitOutcome::AlreadyProcessed),
        }
    }

    async fn delete_request(&self, id: RequestId) -> Result<bool, StoreError> {
        let mut state = self.state.lock().unwrap();
        if state.requests.remove(&id).is_none() {
            return Ok(false);
        }
        // Cascade only images the request still owns; re-parented images
        // belong to a product now.
        state
            .images
            .retain(|_, img| img.owning_request() != Some(id));
        Ok(true)
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state.products.get(&id).cloned())
    }

    async fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        let state = self.state.lock().unwrap();
        let mut products: Vec<Product> = state.products.values().cloned().collect();
        products.sort_by(|a, b| {
            (b.created_at, b.id.as_uuid()).cmp(&(a.created_at, a.id.as_uuid()))
        });
        Ok(products)
    }

    async fn product_images(&self, id: ProductId) -> Result<Vec<ProductImage>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state.attached_images(id))
    }

    async fn delete_product(&self, id: ProductId) -> Result<bool, StoreError> {
        let mut state = self.state.lock().unwrap();
        if state.products.remove(&id).is_none() {
            return Ok(false);
        }
        state
            .images
            .retain(|_, img| img.owning_product() != Some(id));
        Ok(true)
    }

    async fn upsert_user(&self, user: &UserRecord) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state.users.insert(user.id, user.clone());
        Ok(())
    }
}
