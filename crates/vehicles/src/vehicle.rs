use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use carlot_core::{DomainError, DomainResult, Price, VehicleId};

/// Earliest model year accepted by the catalog.
pub const MIN_YEAR: i32 = 1886;
/// Latest model year accepted by the catalog.
pub const MAX_YEAR: i32 = 9999;

/// A sellable catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: VehicleId,
    pub brand: String,
    pub model: String,
    pub year: i32,
    pub color: String,
    pub price: Price,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Vehicle {
    /// Materialize a validated creation request into a stored vehicle.
    ///
    /// A caller-supplied id is kept, otherwise a new one is assigned.
    pub fn from_new(new: NewVehicle, now: DateTime<Utc>) -> Self {
        Self {
            id: new.id.unwrap_or_default(),
            brand: new.brand,
            model: new.model,
            year: new.year,
            color: new.color,
            price: new.price,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Validated creation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewVehicle {
    pub id: Option<VehicleId>,
    pub brand: String,
    pub model: String,
    pub year: i32,
    pub color: String,
    pub price: Price,
}

impl NewVehicle {
    pub fn new(
        id: Option<VehicleId>,
        brand: &str,
        model: &str,
        year: i32,
        color: &str,
        price: Price,
    ) -> DomainResult<Self> {
        Ok(Self {
            id,
            brand: required_text("brand", brand)?,
            model: required_text("model", model)?,
            year: valid_year(year)?,
            color: required_text("color", color)?,
            price,
        })
    }
}

/// Partial update: only `Some` fields are changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VehicleUpdate {
    pub brand: Option<String>,
    pub model: Option<String>,
    pub year: Option<i32>,
    pub color: Option<String>,
    pub price: Option<Price>,
}

impl VehicleUpdate {
    /// Validate and normalize every supplied field.
    pub fn new(
        brand: Option<&str>,
        model: Option<&str>,
        year: Option<i32>,
        color: Option<&str>,
        price: Option<Price>,
    ) -> DomainResult<Self> {
        Ok(Self {
            brand: brand.map(|v| required_text("brand", v)).transpose()?,
            model: model.map(|v| required_text("model", v)).transpose()?,
            year: year.map(valid_year).transpose()?,
            color: color.map(|v| required_text("color", v)).transpose()?,
            price,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.brand.is_none()
            && self.model.is_none()
            && self.year.is_none()
            && self.color.is_none()
            && self.price.is_none()
    }

    /// Apply the patch to `vehicle`. Returns whether anything was written.
    ///
    /// `updated_at` only moves when the patch carries at least one field.
    pub fn apply_to(&self, vehicle: &mut Vehicle, now: DateTime<Utc>) -> bool {
        if self.is_empty() {
            return false;
        }
        if let Some(brand) = &self.brand {
            vehicle.brand = brand.clone();
        }
        if let Some(model) = &self.model {
            vehicle.model = model.clone();
        }
        if let Some(year) = self.year {
            vehicle.year = year;
        }
        if let Some(color) = &self.color {
            vehicle.color = color.clone();
        }
        if let Some(price) = self.price {
            vehicle.price = price;
        }
        vehicle.updated_at = now;
        true
    }
}

fn required_text(field: &str, value: &str) -> DomainResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

fn valid_year(year: i32) -> DomainResult<i32> {
    if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
        return Err(DomainError::validation(format!(
            "year must be between {MIN_YEAR} and {MAX_YEAR}"
        )));
    }
    Ok(year)
}
