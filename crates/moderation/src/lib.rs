//! `campusmarket-moderation` — the product request lifecycle.
//!
//! Pure decision logic only: the state machine driving a request from
//! `Pending` to a terminal state, the catalog effect of an approval, and the
//! image-ownership resolver. Persistence and IO live in `campusmarket-infra`.

pub mod image;
pub mod request;

pub use image::{copy_for_request, reparent, ImageOwner, ProductImage, MAX_IMAGES_PER_LISTING};
pub use request::{ApprovalEffect, ProductRequest, RequestStatus, ReviewOutcome};
