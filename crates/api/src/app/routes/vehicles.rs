use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Extension, Path, Query,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use carlot_core::VehicleId;

use crate::app::{dto, errors};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_vehicle).get(list_vehicles))
        .route("/:vehicle_id", get(get_vehicle).patch(update_vehicle))
        .route("/:vehicle_id/buy", post(buy_vehicle))
}

fn parse_vehicle_id(raw: &str) -> Result<VehicleId, axum::response::Response> {
    raw.parse()
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid vehicle id"))
}

pub async fn create_vehicle(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::CreateVehicleRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rej) => return errors::json_rejection(rej),
    };

    let new_vehicle = match body.into_new_vehicle() {
        Ok(v) => v,
        Err(e) => return errors::service_error_to_response(e),
    };

    match services.catalog.create(new_vehicle).await {
        Ok(vehicle) => (StatusCode::CREATED, Json(dto::vehicle_to_json(vehicle))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn list_vehicles(
    Extension(services): Extension<Arc<AppServices>>,
    query: Result<Query<dto::ListVehiclesQuery>, QueryRejection>,
) -> axum::response::Response {
    let Query(query) = match query {
        Ok(q) => q,
        Err(rej) => return errors::query_rejection(rej),
    };

    match services.catalog.search(query.is_sold).await {
        Ok(vehicles) => Json(
            vehicles
                .into_iter()
                .map(dto::vehicle_to_json)
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_vehicle(
    Extension(services): Extension<Arc<AppServices>>,
    Path(vehicle_id): Path<String>,
) -> axum::response::Response {
    let id = match parse_vehicle_id(&vehicle_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.catalog.get(id).await {
        Ok(vehicle) => Json(dto::vehicle_to_json(vehicle)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn update_vehicle(
    Extension(services): Extension<Arc<AppServices>>,
    Path(vehicle_id): Path<String>,
    body: Result<Json<dto::UpdateVehicleRequest>, JsonRejection>,
) -> axum::response::Response {
    let id = match parse_vehicle_id(&vehicle_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let Json(body) = match body {
        Ok(b) => b,
        Err(rej) => return errors::json_rejection(rej),
    };

    let patch = match body.into_update() {
        Ok(p) => p,
        Err(e) => return errors::service_error_to_response(e),
    };

    match services.catalog.update(id, patch).await {
        Ok(vehicle) => Json(dto::vehicle_to_json(vehicle)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// Start a purchase. The sale stays `PENDING` until the provider reports back.
pub async fn buy_vehicle(
    Extension(services): Extension<Arc<AppServices>>,
    Path(vehicle_id): Path<String>,
    body: Result<Json<dto::BuyVehicleRequest>, JsonRejection>,
) -> axum::response::Response {
    let id = match parse_vehicle_id(&vehicle_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let Json(body) = match body {
        Ok(b) => b,
        Err(rej) => return errors::json_rejection(rej),
    };

    match services
        .purchases
        .purchase(id, &body.buyer_document_number)
        .await
    {
        Ok(vehicle) => Json(dto::vehicle_to_json(vehicle)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
