use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use campusmarket_core::ProductId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_products))
        .route("/:id", get(get_product))
        .route("/:id/delete", post(delete_product))
}

pub async fn list_products(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    let products = match services.list_products().await {
        Ok(p) => p,
        Err(e) => return errors::moderation_error_to_response(e),
    };
    let items: Vec<_> = products.iter().map(dto::product_to_json).collect();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}

pub async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: ProductId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid product id"),
    };

    let product = match services.get_product(id).await {
        Ok(Some(p)) => p,
        Ok(None) => return errors::json_error(StatusCode::NOT_FOUND, "not_found", "product not found"),
        Err(e) => return errors::moderation_error_to_response(e),
    };
    let images = match services.product_images(id).await {
        Ok(i) => i,
        Err(e) => return errors::moderation_error_to_response(e),
    };

    (
        StatusCode::OK,
        Json(dto::product_with_images_to_json(&product, &images)),
    )
        .into_response()
}

pub async fn delete_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: ProductId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid product id"),
    };

    match services.remove_product(principal.principal(), id).await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({ "outcome": "deleted" })),
        )
            .into_response(),
        Err(e) => errors::moderation_error_to_response(e),
    }
}
