use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};

use crate::context::PrincipalContext;

pub async fn health() -> axum::response::Response {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" }))).into_response()
}

pub async fn whoami(Extension(principal): Extension<PrincipalContext>) -> axum::response::Response {
    let roles: Vec<&str> = principal
        .principal()
        .roles
        .iter()
        .map(|r| r.as_str())
        .collect();
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "user_id": principal.user_id().to_string(),
            "roles": roles,
            "display_name": principal.user_record().display_name,
        })),
    )
        .into_response()
}
