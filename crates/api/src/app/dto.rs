use serde::Deserialize;
use serde_json::{json, Value};

use campusmarket_catalog::Product;
use campusmarket_infra::{RequestDetail, UserRecord};
use campusmarket_moderation::ProductImage;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Default, Deserialize)]
pub struct RejectRequestBody {
    pub review_comment: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListRequestsQuery {
    pub status: Option<String>,
}

// -------------------------
// JSON mapping helpers
// -------------------------

pub fn image_to_json(image: &ProductImage) -> Value {
    json!({
        "id": image.id.to_string(),
        "url": image.url,
        "is_main": image.is_main,
        "sort_order": image.sort_order,
    })
}

pub fn user_to_json(user: &UserRecord) -> Value {
    json!({
        "id": user.id.to_string(),
        "display_name": user.display_name,
        "role": user.role,
    })
}

pub fn product_to_json(product: &Product) -> Value {
    json!({
        "id": product.id.to_string(),
        "name": product.name,
        "price_cents": product.price_cents,
        "description": product.description,
        "shipping_time_hours": product.shipping_time_hours,
        "shipping_method": product.shipping_method.as_str(),
        "shipping_fee_cents": product.shipping_fee_cents,
        "created_at": product.created_at.to_rfc3339(),
    })
}

pub fn product_with_images_to_json(product: &Product, images: &[ProductImage]) -> Value {
    let mut value = product_to_json(product);
    value["images"] = Value::Array(images.iter().map(image_to_json).collect());
    value
}

pub fn request_detail_to_json(detail: &RequestDetail) -> Value {
    let request = &detail.request;
    json!({
        "id": request.id.to_string(),
        "name": request.fields.name,
        "price_cents": request.fields.price_cents,
        "description": request.fields.description,
        "shipping_time_hours": request.fields.shipping_time_hours,
        "shipping_method": request.fields.shipping_method.as_str(),
        "shipping_fee_cents": request.fields.shipping_fee_cents,
        "status": request.status.as_str(),
        "created_at": request.created_at.to_rfc3339(),
        "reviewed_at": request.reviewed_at.map(|t| t.to_rfc3339()),
        "review_comment": request.review_comment,
        "requested_by": request.requested_by.to_string(),
        "requester": detail.requester.as_ref().map(user_to_json),
        "reviewed_by": request.reviewed_by.map(|u| u.to_string()),
        "reviewer": detail.reviewer.as_ref().map(user_to_json),
        "original_product_id": request.original_product_id.map(|p| p.to_string()),
        "original_product": detail.original_product.as_ref().map(product_to_json),
        "images": detail.images.iter().map(image_to_json).collect::<Vec<_>>(),
    })
}
