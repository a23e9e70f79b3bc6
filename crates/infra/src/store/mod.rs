//! Durable storage boundary for vehicles and sales.
//!
//! Two collaborator traits, kept separate because they have different owners in
//! the workflow: the catalog owns vehicles, the sale ledger owns sales. A single
//! backend (in-memory or Postgres) usually implements both.
//!
//! ## No double sale
//!
//! [`SaleLedger::create`] must reject a second active (non-canceled) sale for the
//! same vehicle **atomically**, returning [`StoreError::ActiveSaleExists`]. A
//! read-then-write by the caller is not enough under concurrent purchases.
//!
//! ## Exactly-once transitions
//!
//! [`SaleLedger::update_status`] must apply the sale state machine atomically:
//! a terminal sale is never overwritten, even by concurrent deliveries.

pub mod in_memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use carlot_core::{PaymentId, VehicleId};
use carlot_sales::{NewSale, Sale, SaleStatus};
use carlot_vehicles::{NewVehicle, Vehicle, VehicleUpdate};

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;

/// Storage operation error.
///
/// These are **infrastructure errors** as opposed to domain errors, except for
/// `ActiveSaleExists`, which is how the ledger reports the no-double-sale constraint.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("an active sale already exists for vehicle {0}")]
    ActiveSaleExists(VehicleId),

    #[error("duplicate record: {0}")]
    Duplicate(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Vehicle persistence.
#[async_trait]
pub trait VehicleStore: Send + Sync {
    /// Insert a new vehicle. A taken id is reported as [`StoreError::Duplicate`].
    async fn create(&self, vehicle: NewVehicle, now: DateTime<Utc>) -> Result<Vehicle, StoreError>;

    async fn get(&self, id: VehicleId) -> Result<Option<Vehicle>, StoreError>;

    /// List vehicles ordered by price ascending.
    ///
    /// `sold = Some(true)` keeps vehicles with an `APPROVED` sale,
    /// `Some(false)` keeps the others, `None` keeps everything.
    async fn search(&self, sold: Option<bool>) -> Result<Vec<Vehicle>, StoreError>;

    /// Apply a partial update. Returns `None` when the vehicle does not exist.
    async fn update(
        &self,
        id: VehicleId,
        patch: VehicleUpdate,
        now: DateTime<Utc>,
    ) -> Result<Option<Vehicle>, StoreError>;
}

/// Sale persistence.
#[async_trait]
pub trait SaleLedger: Send + Sync {
    /// Insert a new `PENDING` sale, assigning its id.
    ///
    /// Fails with [`StoreError::ActiveSaleExists`] if the vehicle already has an
    /// active sale, and with [`StoreError::Duplicate`] on a reused payment id.
    async fn create(&self, sale: NewSale, now: DateTime<Utc>) -> Result<Sale, StoreError>;

    /// The vehicle's `PENDING` or `APPROVED` sale, if any.
    async fn find_active_by_vehicle(&self, vehicle_id: VehicleId) -> Result<Option<Sale>, StoreError>;

    async fn find_by_payment_id(&self, payment_id: &PaymentId) -> Result<Option<Sale>, StoreError>;

    /// List sales, newest first, optionally restricted to one status.
    async fn search(&self, status: Option<SaleStatus>) -> Result<Vec<Sale>, StoreError>;

    /// Apply a reported status to the sale identified by `payment_id`.
    ///
    /// `sold_at` is the approval timestamp and is only used when `status` is
    /// `APPROVED`. Returns the sale as stored after the call (unchanged if it was
    /// already terminal), or `None` if no sale carries this payment id.
    async fn update_status(
        &self,
        payment_id: &PaymentId,
        status: SaleStatus,
        sold_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Sale>, StoreError>;
}

#[async_trait]
impl<S> VehicleStore for Arc<S>
where
    S: VehicleStore + ?Sized,
{
    async fn create(&self, vehicle: NewVehicle, now: DateTime<Utc>) -> Result<Vehicle, StoreError> {
        (**self).create(vehicle, now).await
    }

    async fn get(&self, id: VehicleId) -> Result<Option<Vehicle>, StoreError> {
        (**self).get(id).await
    }

    async fn search(&self, sold: Option<bool>) -> Result<Vec<Vehicle>, StoreError> {
        (**self).search(sold).await
    }

    async fn update(
        &self,
        id: VehicleId,
        patch: VehicleUpdate,
        now: DateTime<Utc>,
    ) -> Result<Option<Vehicle>, StoreError> {
        (**self).update(id, patch, now).await
    }
}

#[async_trait]
impl<S> SaleLedger for Arc<S>
where
    S: SaleLedger + ?Sized,
{
    async fn create(&self, sale: NewSale, now: DateTime<Utc>) -> Result<Sale, StoreError> {
        (**self).create(sale, now).await
    }

    async fn find_active_by_vehicle(&self, vehicle_id: VehicleId) -> Result<Option<Sale>, StoreError> {
        (**self).find_active_by_vehicle(vehicle_id).await
    }

    async fn find_by_payment_id(&self, payment_id: &PaymentId) -> Result<Option<Sale>, StoreError> {
        (**self).find_by_payment_id(payment_id).await
    }

    async fn search(&self, status: Option<SaleStatus>) -> Result<Vec<Sale>, StoreError> {
        (**self).search(status).await
    }

    async fn update_status(
        &self,
        payment_id: &PaymentId,
        status: SaleStatus,
        sold_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Sale>, StoreError> {
        (**self).update_status(payment_id, status, sold_at).await
    }
}
