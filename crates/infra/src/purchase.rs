//! Purchase orchestration: vehicle lookup, eligibility, payment, sale record.
//!
//! The eligibility check here is only a fast path. Two concurrent purchases can
//! both pass it; the ledger's atomic `create` decides the winner and the loser
//! surfaces as `AlreadySold`, with its already-issued payment left orphaned.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use carlot_core::{Clock, VehicleId};
use carlot_sales::{buyer_document, NewSale, SaleStatus};
use carlot_vehicles::Vehicle;

use crate::error::{Resource, ServiceError, ServiceResult};
use crate::payments::PaymentGateway;
use crate::store::{SaleLedger, VehicleStore};

/// Status forwarded to the provider when requesting a payment.
const PAYMENT_INTENT: SaleStatus = SaleStatus::Approved;

pub struct PurchaseOrchestrator<V, L, G> {
    vehicles: V,
    ledger: L,
    gateway: G,
    clock: Arc<dyn Clock>,
}

impl<V, L, G> PurchaseOrchestrator<V, L, G>
where
    V: VehicleStore,
    L: SaleLedger,
    G: PaymentGateway,
{
    pub fn new(vehicles: V, ledger: L, gateway: G, clock: Arc<dyn Clock>) -> Self {
        Self {
            vehicles,
            ledger,
            gateway,
            clock,
        }
    }

    /// Buy `vehicle_id` on behalf of the buyer identified by `buyer_document_number`.
    ///
    /// On success a `PENDING` sale exists for the vehicle and the vehicle is returned
    /// as it was read. Nothing is written when the vehicle is missing, already has an
    /// active sale, or the payment provider fails.
    #[instrument(skip(self, buyer_document_number), fields(vehicle_id = %vehicle_id), err)]
    pub async fn purchase(
        &self,
        vehicle_id: VehicleId,
        buyer_document_number: &str,
    ) -> ServiceResult<Vehicle> {
        let buyer = buyer_document(buyer_document_number)?;

        let vehicle = self
            .vehicles
            .get(vehicle_id)
            .await?
            .ok_or(ServiceError::NotFound(Resource::Vehicle))?;

        if self.ledger.find_active_by_vehicle(vehicle_id).await?.is_some() {
            return Err(ServiceError::AlreadySold(vehicle_id));
        }

        let payment_id = self
            .gateway
            .generate_payment(vehicle.price, PAYMENT_INTENT)
            .await?;

        let sale = NewSale::new(vehicle.id, payment_id.clone(), &buyer, vehicle.price)?;
        let sale = match self.ledger.create(sale, self.clock.now()).await {
            Ok(sale) => sale,
            Err(err) => {
                warn!(
                    vehicle_id = %vehicle_id,
                    payment_id = %payment_id,
                    error = %err,
                    "payment issued but sale not recorded; payment is orphaned"
                );
                return Err(err.into());
            }
        };

        info!(
            vehicle_id = %vehicle_id,
            sale_id = %sale.id(),
            payment_id = %sale.payment_id(),
            price = %sale.price(),
            "sale opened"
        );
        Ok(vehicle)
    }
}
