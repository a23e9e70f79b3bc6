use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use carlot_core::{Clock, PaymentId, SaleId, VehicleId};
use carlot_sales::{NewSale, Sale, SaleStatus};
use carlot_vehicles::{NewVehicle, Vehicle, VehicleUpdate};

use super::{SaleLedger, StoreError, VehicleStore};

#[derive(Debug, Default)]
struct State {
    vehicles: HashMap<VehicleId, Vehicle>,
    sales: Vec<Sale>,
    by_payment: HashMap<PaymentId, usize>,
}

/// In-memory vehicle store and sale ledger.
///
/// Intended for tests/dev. Every check-and-write happens under a single write
/// lock, which is what makes the active-sale check atomic with the insert.
pub struct InMemoryStore {
    clock: Arc<dyn Clock>,
    state: RwLock<State>,
}

impl InMemoryStore {
    /// `clock` stamps `updated_at` on status writes that carry no `sold_at`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: RwLock::new(State::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Storage("in-memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Storage("in-memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl VehicleStore for InMemoryStore {
    async fn create(&self, vehicle: NewVehicle, now: DateTime<Utc>) -> Result<Vehicle, StoreError> {
        let vehicle = Vehicle::from_new(vehicle, now);
        let mut state = self.write()?;
        if state.vehicles.contains_key(&vehicle.id) {
            return Err(StoreError::Duplicate(format!("vehicle {} already exists", vehicle.id)));
        }
        state.vehicles.insert(vehicle.id, vehicle.clone());
        Ok(vehicle)
    }

    async fn get(&self, id: VehicleId) -> Result<Option<Vehicle>, StoreError> {
        Ok(self.read()?.vehicles.get(&id).cloned())
    }

    async fn search(&self, sold: Option<bool>) -> Result<Vec<Vehicle>, StoreError> {
        let state = self.read()?;
        let approved: HashSet<VehicleId> = state
            .sales
            .iter()
            .filter(|s| s.status() == SaleStatus::Approved)
            .map(|s| s.vehicle_id())
            .collect();

        let mut vehicles: Vec<Vehicle> = state
            .vehicles
            .values()
            .filter(|v| sold.is_none_or(|flag| approved.contains(&v.id) == flag))
            .cloned()
            .collect();
        vehicles.sort_by(|a, b| a.price.cmp(&b.price).then_with(|| a.id.cmp(&b.id)));
        Ok(vehicles)
    }

    async fn update(
        &self,
        id: VehicleId,
        patch: VehicleUpdate,
        now: DateTime<Utc>,
    ) -> Result<Option<Vehicle>, StoreError> {
        let mut state = self.write()?;
        Ok(state.vehicles.get_mut(&id).map(|vehicle| {
            patch.apply_to(vehicle, now);
            vehicle.clone()
        }))
    }
}

#[async_trait]
impl SaleLedger for InMemoryStore {
    async fn create(&self, sale: NewSale, now: DateTime<Utc>) -> Result<Sale, StoreError> {
        let mut state = self.write()?;

        if state
            .sales
            .iter()
            .any(|s| s.vehicle_id() == sale.vehicle_id && s.is_active())
        {
            return Err(StoreError::ActiveSaleExists(sale.vehicle_id));
        }
        if state.by_payment.contains_key(&sale.payment_id) {
            return Err(StoreError::Duplicate(format!(
                "payment {} already has a sale",
                sale.payment_id
            )));
        }

        let sale = Sale::open(SaleId::new(), sale, now);
        let idx = state.sales.len();
        state.by_payment.insert(sale.payment_id().clone(), idx);
        state.sales.push(sale.clone());
        Ok(sale)
    }

    async fn find_active_by_vehicle(&self, vehicle_id: VehicleId) -> Result<Option<Sale>, StoreError> {
        Ok(self
            .read()?
            .sales
            .iter()
            .find(|s| s.vehicle_id() == vehicle_id && s.is_active())
            .cloned())
    }

    async fn find_by_payment_id(&self, payment_id: &PaymentId) -> Result<Option<Sale>, StoreError> {
        let state = self.read()?;
        Ok(state
            .by_payment
            .get(payment_id)
            .and_then(|&idx| state.sales.get(idx))
            .cloned())
    }

    async fn search(&self, status: Option<SaleStatus>) -> Result<Vec<Sale>, StoreError> {
        let state = self.read()?;
        let mut sales: Vec<Sale> = state
            .sales
            .iter()
            .filter(|s| status.is_none_or(|wanted| s.status() == wanted))
            .cloned()
            .collect();
        sales.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| b.id().cmp(&a.id()))
        });
        Ok(sales)
    }

    async fn update_status(
        &self,
        payment_id: &PaymentId,
        status: SaleStatus,
        sold_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Sale>, StoreError> {
        let at = sold_at.unwrap_or_else(|| self.clock.now());
        let mut state = self.write()?;
        let Some(&idx) = state.by_payment.get(payment_id) else {
            return Ok(None);
        };
        let Some(sale) = state.sales.get_mut(idx) else {
            return Err(StoreError::Corrupt(format!(
                "payment index points past the ledger for {payment_id}"
            )));
        };
        sale.apply(status, at);
        Ok(Some(sale.clone()))
    }
}
