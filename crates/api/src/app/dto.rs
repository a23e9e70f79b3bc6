use rust_decimal::Decimal;
use serde::Deserialize;

use carlot_core::{Price, VehicleId};
use carlot_sales::Sale;
use carlot_vehicles::{NewVehicle, Vehicle, VehicleUpdate};

use carlot_infra::ServiceError;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateVehicleRequest {
    pub vehicle_id: Option<String>,
    pub brand: String,
    pub model: String,
    pub year: i32,
    pub color: String,
    pub price: Decimal,
}

impl CreateVehicleRequest {
    pub fn into_new_vehicle(self) -> Result<NewVehicle, ServiceError> {
        let id = self
            .vehicle_id
            .as_deref()
            .map(str::parse::<VehicleId>)
            .transpose()?;
        Ok(NewVehicle::new(
            id,
            &self.brand,
            &self.model,
            self.year,
            &self.color,
            Price::new(self.price)?,
        )?)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateVehicleRequest {
    pub brand: Option<String>,
    pub model: Option<String>,
    pub year: Option<i32>,
    pub color: Option<String>,
    pub price: Option<Decimal>,
}

impl UpdateVehicleRequest {
    pub fn into_update(self) -> Result<VehicleUpdate, ServiceError> {
        Ok(VehicleUpdate::new(
            self.brand.as_deref(),
            self.model.as_deref(),
            self.year,
            self.color.as_deref(),
            self.price.map(Price::new).transpose()?,
        )?)
    }
}

#[derive(Debug, Deserialize)]
pub struct BuyVehicleRequest {
    pub buyer_document_number: String,
}

#[derive(Debug, Deserialize)]
pub struct PaymentWebhookRequest {
    pub payment_id: String,
    pub status: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListVehiclesQuery {
    pub is_sold: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListSalesQuery {
    pub status: Option<String>,
}

// -------------------------
// Response mapping
// -------------------------

pub fn vehicle_to_json(v: Vehicle) -> serde_json::Value {
    serde_json::json!({
        "vehicle_id": v.id.to_string(),
        "brand": v.brand,
        "model": v.model,
        "year": v.year,
        "color": v.color,
        "price": v.price,
        "created_at": v.created_at.to_rfc3339(),
        "updated_at": v.updated_at.to_rfc3339(),
    })
}

pub fn sale_to_json(s: Sale) -> serde_json::Value {
    serde_json::json!({
        "sale_id": s.id().to_string(),
        "vehicle_id": s.vehicle_id().to_string(),
        "payment_id": s.payment_id().as_str(),
        "buyer_document_number": s.buyer_document_number(),
        "price": s.price(),
        "status": s.status().as_str(),
        "sold_at": s.sold_at().map(|t| t.to_rfc3339()),
        "created_at": s.created_at().to_rfc3339(),
        "updated_at": s.updated_at().to_rfc3339(),
    })
}
