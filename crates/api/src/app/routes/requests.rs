use std::sync::Arc;

use axum::{
    extract::{Extension, Multipart, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use campusmarket_auth::{authorize, Permission};
use campusmarket_catalog::{ListingFields, ShippingMethod};
use campusmarket_core::{ImageId, ProductId, RequestId};
use campusmarket_infra::{EditSubmission, RequestFilter};
use campusmarket_media::ImageUpload;
use campusmarket_moderation::{RequestStatus, ReviewOutcome};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(submit_request).get(list_requests))
        .route("/:id", get(get_request))
        .route("/:id/approve", post(approve_request))
        .route("/:id/reject", post(reject_request))
        .route("/:id/delete", post(delete_request))
}

/// Parsed multipart submission: listing fields, image parts, optional edit
/// context.
struct Submission {
    fields: ListingFields,
    uploads: Vec<ImageUpload>,
    edit: Option<EditSubmission>,
}

async fn parse_submission(
    mut multipart: Multipart,
) -> Result<Submission, axum::response::Response> {
    let invalid = |msg: String| errors::json_error(StatusCode::BAD_REQUEST, "invalid_form", msg);

    let mut name: Option<String> = None;
    let mut price_cents: Option<u64> = None;
    let mut description: Option<String> = None;
    let mut shipping_time_hours: u16 = 24;
    let mut shipping_method = ShippingMethod::Express;
    let mut shipping_fee_cents: u64 = 0;
    let mut original_product_id: Option<ProductId> = None;
    let mut removed_image_ids: Vec<ImageId> = Vec::new();
    let mut uploads: Vec<ImageUpload> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| invalid(format!("malformed multipart body: {e}")))?
    {
        let Some(field_name) = field.name().map(str::to_string) else {
            continue;
        };

        if field_name == "images" {
            let file_name = field.file_name().unwrap_or("upload").to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| invalid(format!("failed to read image part: {e}")))?;
            uploads.push(ImageUpload::new(file_name, bytes.to_vec()));
            continue;
        }

        let text = field
            .text()
            .await
            .map_err(|e| invalid(format!("failed to read field '{field_name}': {e}")))?;

        match field_name.as_str() {
            "name" => name = Some(text),
            "price_cents" => {
                price_cents =
                    Some(text.parse::<u64>().map_err(|_| {
                        invalid("price_cents must be a non-negative integer".to_string())
                    })?)
            }
            "description" => {
                if !text.is_empty() {
                    description = Some(text);
                }
            }
            "shipping_time_hours" => {
                shipping_time_hours = text.parse::<u16>().map_err(|_| {
                    invalid("shipping_time_hours must be an integer in [0, 999]".to_string())
                })?
            }
            "shipping_method" => {
                shipping_method = text
                    .parse::<ShippingMethod>()
                    .map_err(|e| invalid(e.to_string()))?
            }
            "shipping_fee_cents" => {
                shipping_fee_cents = text.parse::<u64>().map_err(|_| {
                    invalid("shipping_fee_cents must be a non-negative integer".to_string())
                })?
            }
            "original_product_id" => {
                original_product_id =
                    Some(text.parse::<ProductId>().map_err(|e| invalid(e.to_string()))?)
            }
            "removed_image_ids" => {
                for part in text.split(',').filter(|s| !s.trim().is_empty()) {
                    removed_image_ids
                        .push(part.trim().parse::<ImageId>().map_err(|e| invalid(e.to_string()))?);
                }
            }
            _ => {}
        }
    }

    let name = name.ok_or_else(|| invalid("name is required".to_string()))?;
    let price_cents = price_cents.ok_or_else(|| invalid("price_cents is required".to_string()))?;

    Ok(Submission {
        fields: ListingFields {
            name,
            price_cents,
            description,
            shipping_time_hours,
            shipping_method,
            shipping_fee_cents,
        },
        uploads,
        edit: original_product_id.map(|original_product_id| EditSubmission {
            original_product_id,
            removed_image_ids,
        }),
    })
}

pub async fn submit_request(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    multipart: Multipart,
) -> axum::response::Response {
    let submission = match parse_submission(multipart).await {
        Ok(s) => s,
        Err(response) => return response,
    };

    if let Err(e) = services.record_user(&principal.user_record()).await {
        tracing::warn!("failed to record requester identity: {e}");
    }

    let request = match services
        .submit(
            principal.principal(),
            submission.fields,
            submission.uploads,
            submission.edit,
        )
        .await
    {
        Ok(r) => r,
        Err(e) => return errors::moderation_error_to_response(e),
    };

    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "id": request.id.to_string(),
            "status": request.status.as_str(),
        })),
    )
        .into_response()
}

pub async fn list_requests(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::ListRequestsQuery>,
) -> axum::response::Response {
    let status = match query.status.as_deref() {
        None => None,
        Some(raw) => match raw.parse::<RequestStatus>() {
            Ok(s) => Some(s),
            Err(e) => {
                return errors::json_error(StatusCode::BAD_REQUEST, "invalid_filter", e.to_string())
            }
        },
    };

    // Reviewers see the whole queue; members only their own submissions.
    let is_reviewer =
        authorize(principal.principal(), &Permission::new("requests.review")).is_ok();
    let filter = RequestFilter {
        status,
        requested_by: (!is_reviewer).then(|| principal.user_id()),
    };

    let details = match services.list_requests(filter).await {
        Ok(d) => d,
        Err(e) => return errors::moderation_error_to_response(e),
    };

    let items: Vec<_> = details.iter().map(dto::request_detail_to_json).collect();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}

pub async fn get_request(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: RequestId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid request id"),
    };

    let detail = match services.get_request(id).await {
        Ok(Some(d)) => d,
        Ok(None) => return errors::json_error(StatusCode::NOT_FOUND, "not_found", "request not found"),
        Err(e) => return errors::moderation_error_to_response(e),
    };

    let is_reviewer =
        authorize(principal.principal(), &Permission::new("requests.review")).is_ok();
    if !is_reviewer && detail.request.requested_by != principal.user_id() {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", "forbidden");
    }

    (StatusCode::OK, Json(dto::request_detail_to_json(&detail))).into_response()
}

pub async fn approve_request(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: RequestId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid request id"),
    };

    if let Err(e) = services.record_user(&principal.user_record()).await {
        tracing::warn!("failed to record reviewer identity: {e}");
    }

    match services.approve(principal.principal(), id).await {
        Ok(ReviewOutcome::Applied(receipt)) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "outcome": "approved",
                "product_id": receipt.product_id.to_string(),
                "message": receipt.message,
            })),
        )
            .into_response(),
        Ok(ReviewOutcome::AlreadyProcessed) => already_processed_response(),
        Err(e) => errors::moderation_error_to_response(e),
    }
}

pub async fn reject_request(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::RejectRequestBody>,
) -> axum::response::Response {
    let id: RequestId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid request id"),
    };

    if let Err(e) = services.record_user(&principal.user_record()).await {
        tracing::warn!("failed to record reviewer identity: {e}");
    }

    match services
        .reject(principal.principal(), id, body.review_comment)
        .await
    {
        Ok(ReviewOutcome::Applied(())) => (
            StatusCode::OK,
            Json(serde_json::json!({ "outcome": "rejected" })),
        )
            .into_response(),
        Ok(ReviewOutcome::AlreadyProcessed) => already_processed_response(),
        Err(e) => errors::moderation_error_to_response(e),
    }
}

pub async fn delete_request(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: RequestId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid request id"),
    };

    match services.delete(principal.principal(), id).await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({ "outcome": "deleted" })),
        )
            .into_response(),
        Err(e) => errors::moderation_error_to_response(e),
    }
}

fn already_processed_response() -> axum::response::Response {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "outcome": "already_processed",
            "message": "This request has already been processed.",
        })),
    )
        .into_response()
}
