//! Image ownership and re-parenting.
//!
//! A `ProductImage` is owned by exactly one entity at a time: the request it
//! was staged under, or the product it was attached to on approval. The owner
//! is a sum type, so the dual-null/dual-set states a nullable foreign-key
//! pair would permit are unrepresentable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use campusmarket_core::{DomainError, DomainResult, ImageId, ProductId, RequestId};

/// Most images a single listing (or listing request) may carry.
pub const MAX_IMAGES_PER_LISTING: usize = 5;

/// The single owner of an image row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum ImageOwner {
    /// Staged under a request, not yet visible on any product.
    Request(RequestId),
    /// Attached to a live product.
    Product(ProductId),
}

/// An uploaded listing image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductImage {
    pub id: ImageId,
    pub owner: ImageOwner,
    pub url: String,
    /// Exactly one image per owner should be main: the first one staged.
    pub is_main: bool,
    /// Display order; ties broken by creation order.
    pub sort_order: u32,
    pub created_at: DateTime<Utc>,
}

impl ProductImage {
    /// Stage an uploaded image under a request.
    ///
    /// `index` is the upload position: it fixes both the sort order and the
    /// first-is-main convention.
    pub fn staged(
        id: ImageId,
        request: RequestId,
        url: impl Into<String>,
        index: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            owner: ImageOwner::Request(request),
            url: url.into(),
            is_main: index == 0,
            sort_order: index,
            created_at: now,
        }
    }

    pub fn owning_request(&self) -> Option<RequestId> {
        match self.owner {
            ImageOwner::Request(id) => Some(id),
            ImageOwner::Product(_) => None,
        }
    }

    pub fn owning_product(&self) -> Option<ProductId> {
        match self.owner {
            ImageOwner::Product(id) => Some(id),
            ImageOwner::Request(_) => None,
        }
    }
}

/// Transfer ownership of every image from a request to a product.
///
/// Each image must currently be owned by `from`; anything else means the
/// caller passed images it did not fetch through the request's own join and
/// is a bug, reported as `InvariantViolation`.
pub fn reparent(
    images: &mut [ProductImage],
    from: RequestId,
    to: ProductId,
) -> DomainResult<()> {
    for image in images.iter() {
        if image.owner != ImageOwner::Request(from) {
            return Err(DomainError::invariant(format!(
                "image {} is not staged under request {from}",
                image.id
            )));
        }
    }
    for image in images.iter_mut() {
        image.owner = ImageOwner::Product(to);
    }
    Ok(())
}

/// Copy a product's images onto a new edit request.
///
/// The "no new uploads, keep existing" edit path stages *copies* (fresh
/// identifiers, same url/is_main/sort_order) so the live product keeps its
/// images untouched unless the edit is approved.
pub fn copy_for_request(
    sources: &[ProductImage],
    request: RequestId,
    now: DateTime<Utc>,
) -> Vec<ProductImage> {
    sources
        .iter()
        .map(|src| ProductImage {
            id: ImageId::new(),
            owner: ImageOwner::Request(request),
            url: src.url.clone(),
            is_main: src.is_main,
            sort_order: src.sort_order,
            created_at: now,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staged_set(request: RequestId, n: u32) -> Vec<ProductImage> {
        (0..n)
            .map(|i| {
                ProductImage::staged(
                    ImageId::new(),
                    request,
                    format!("/media/products/{i}.jpg"),
                    i,
                    Utc::now(),
                )
            })
            .collect()
    }

    #[test]
    fn first_staged_image_is_main() {
        let request = RequestId::new();
        let images = staged_set(request, 3);
        assert!(images[0].is_main);
        assert!(!images[1].is_main);
        assert!(!images[2].is_main);
        assert_eq!(
            images.iter().map(|i| i.sort_order).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn reparent_swaps_every_owner() {
        let request = RequestId::new();
        let product = ProductId::new();
        let mut images = staged_set(request, 2);

        reparent(&mut images, request, product).unwrap();

        for image in &images {
            assert_eq!(image.owner, ImageOwner::Product(product));
            assert_eq!(image.owning_request(), None);
            assert_eq!(image.owning_product(), Some(product));
        }
    }

    #[test]
    fn reparent_rejects_foreign_images() {
        let request = RequestId::new();
        let other = RequestId::new();
        let product = ProductId::new();
        let mut images = staged_set(request, 2);
        images.push(ProductImage::staged(
            ImageId::new(),
            other,
            "/media/products/stray.png",
            0,
            Utc::now(),
        ));

        let err = reparent(&mut images, request, product).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
        // Nothing was re-parented.
        assert_eq!(images[0].owner, ImageOwner::Request(request));
    }

    #[test]
    fn reparent_rejects_already_attached_images() {
        let request = RequestId::new();
        let product = ProductId::new();
        let mut images = staged_set(request, 1);
        images[0].owner = ImageOwner::Product(ProductId::new());

        assert!(reparent(&mut images, request, product).is_err());
    }

    #[test]
    fn copies_get_fresh_ids_and_leave_sources_alone() {
        let request = RequestId::new();
        let product = ProductId::new();
        let mut sources = staged_set(request, 3);
        reparent(&mut sources, request, product).unwrap();

        let edit = RequestId::new();
        let copies = copy_for_request(&sources, edit, Utc::now());

        assert_eq!(copies.len(), 3);
        for (src, copy) in sources.iter().zip(&copies) {
            assert_ne!(src.id, copy.id);
            assert_eq!(copy.owner, ImageOwner::Request(edit));
            assert_eq!(copy.url, src.url);
            assert_eq!(copy.is_main, src.is_main);
            assert_eq!(copy.sort_order, src.sort_order);
            // Source still belongs to the live product.
            assert_eq!(src.owner, ImageOwner::Product(product));
        }
    }
}
