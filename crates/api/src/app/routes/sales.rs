use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Extension, Query,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use carlot_core::PaymentId;
use carlot_infra::ServiceError;
use carlot_sales::SaleStatus;

use crate::app::{dto, errors};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_sales))
        .route("/webhook", post(payment_webhook))
}

pub async fn list_sales(
    Extension(services): Extension<Arc<AppServices>>,
    query: Result<Query<dto::ListSalesQuery>, QueryRejection>,
) -> axum::response::Response {
    let Query(query) = match query {
        Ok(q) => q,
        Err(rej) => return errors::query_rejection(rej),
    };

    let status = match query.status.as_deref().map(str::parse::<SaleStatus>).transpose() {
        Ok(s) => s,
        Err(e) => return errors::service_error_to_response(e.into()),
    };

    match services.sales.list(status).await {
        Ok(sales) => Json(sales.into_iter().map(dto::sale_to_json).collect::<Vec<_>>()).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// Payment provider callback. Terminal sales are left untouched; a redelivery
/// still answers 204.
pub async fn payment_webhook(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::PaymentWebhookRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rej) => return errors::json_rejection(rej),
    };

    let parsed = body
        .status
        .parse::<SaleStatus>()
        .and_then(|status| Ok((PaymentId::new(body.payment_id)?, status)))
        .map_err(ServiceError::from);
    let (payment_id, status) = match parsed {
        Ok(p) => p,
        Err(e) => return errors::service_error_to_response(e),
    };

    match services.reconciliation.reconcile(&payment_id, status).await {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
