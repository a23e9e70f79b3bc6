use std::sync::Arc;

use tracing::info;

use carlot_core::{Clock, VehicleId};
use carlot_vehicles::{NewVehicle, Vehicle, VehicleUpdate};

use crate::error::{Resource, ServiceError, ServiceResult};
use crate::store::VehicleStore;

/// Vehicle catalog operations (create, read, search, partial update).
pub struct VehicleCatalog<V> {
    vehicles: V,
    clock: Arc<dyn Clock>,
}

impl<V> VehicleCatalog<V>
where
    V: VehicleStore,
{
    pub fn new(vehicles: V, clock: Arc<dyn Clock>) -> Self {
        Self { vehicles, clock }
    }

    pub async fn create(&self, vehicle: NewVehicle) -> ServiceResult<Vehicle> {
        let created = self.vehicles.create(vehicle, self.clock.now()).await?;
        info!(vehicle_id = %created.id, price = %created.price, "vehicle registered");
        Ok(created)
    }

    pub async fn get(&self, id: VehicleId) -> ServiceResult<Vehicle> {
        self.vehicles
            .get(id)
            .await?
            .ok_or(ServiceError::NotFound(Resource::Vehicle))
    }

    pub async fn search(&self, sold: Option<bool>) -> ServiceResult<Vec<Vehicle>> {
        Ok(self.vehicles.search(sold).await?)
    }

    /// An empty patch returns the current vehicle without writing.
    pub async fn update(&self, id: VehicleId, patch: VehicleUpdate) -> ServiceResult<Vehicle> {
        if patch.is_empty() {
            return self.get(id).await;
        }
        self.vehicles
            .update(id, patch, self.clock.now())
            .await?
            .ok_or(ServiceError::NotFound(Resource::Vehicle))
    }
}
