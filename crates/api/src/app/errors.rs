use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use tracing::error;

use carlot_infra::ServiceError;

pub fn service_error_to_response(err: ServiceError) -> axum::response::Response {
    match err {
        ServiceError::NotFound(resource) => {
            json_error(StatusCode::NOT_FOUND, "not_found", format!("{resource} not found"))
        }
        ServiceError::AlreadySold(vehicle_id) => json_error(
            StatusCode::CONFLICT,
            "already_sold",
            format!("vehicle {vehicle_id} is already sold"),
        ),
        ServiceError::InvalidStatus(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_status", msg),
        ServiceError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        ServiceError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        ServiceError::Gateway(e) => {
            error!(error = %e, "payment provider call failed");
            json_error(StatusCode::BAD_GATEWAY, "payment_gateway_error", e.to_string())
        }
        ServiceError::Store(e) => {
            error!(error = %e, "store operation failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string())
        }
    }
}

pub fn json_rejection(rejection: JsonRejection) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "invalid_body", rejection.body_text())
}

pub fn query_rejection(rejection: QueryRejection) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "invalid_query", rejection.body_text())
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
