use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use campusmarket_infra::ModerationError;

pub fn moderation_error_to_response(err: ModerationError) -> axum::response::Response {
    match err {
        ModerationError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        ModerationError::Media(e) => json_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string()),
        ModerationError::Unauthorized => json_error(StatusCode::FORBIDDEN, "forbidden", "forbidden"),
        ModerationError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        ModerationError::InvariantViolation(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", msg)
        }
        ModerationError::Store(e) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "store_error",
            e.to_string(),
        ),
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
