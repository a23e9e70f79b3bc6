//! Applies payment outcomes reported by the provider to the matching sale.

use std::sync::Arc;

use tracing::{debug, info, instrument};

use carlot_core::{Clock, PaymentId};
use carlot_sales::{Sale, SaleStatus};

use crate::error::{Resource, ServiceError, ServiceResult};
use crate::store::SaleLedger;

pub struct ReconciliationHandler<L> {
    ledger: L,
    clock: Arc<dyn Clock>,
}

impl<L> ReconciliationHandler<L>
where
    L: SaleLedger,
{
    pub fn new(ledger: L, clock: Arc<dyn Clock>) -> Self {
        Self { ledger, clock }
    }

    /// Apply `status` to the sale identified by `payment_id`.
    ///
    /// Redelivered or late outcomes for a terminal sale return it unchanged. No
    /// plausibility checks are made on the reported outcome.
    #[instrument(skip(self), fields(payment_id = %payment_id, status = %status), err)]
    pub async fn reconcile(&self, payment_id: &PaymentId, status: SaleStatus) -> ServiceResult<Sale> {
        let before = self
            .ledger
            .find_by_payment_id(payment_id)
            .await?
            .ok_or(ServiceError::NotFound(Resource::Sale))?;

        let sold_at = (status == SaleStatus::Approved).then(|| self.clock.now());
        let after = self
            .ledger
            .update_status(payment_id, status, sold_at)
            .await?
            .ok_or(ServiceError::NotFound(Resource::Sale))?;

        if after.status() != before.status() {
            info!(
                sale_id = %after.id(),
                vehicle_id = %after.vehicle_id(),
                from = %before.status(),
                to = %after.status(),
                "sale status changed"
            );
        } else if before.status().is_terminal() && status != before.status() {
            info!(
                sale_id = %after.id(),
                current = %after.status(),
                reported = %status,
                "outcome ignored for terminal sale"
            );
        } else {
            debug!(sale_id = %after.id(), "outcome already applied");
        }

        Ok(after)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use carlot_core::{FixedClock, Price, VehicleId};
    use carlot_sales::NewSale;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use rust_decimal::Decimal;

    fn test_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 9, 2, 9, 30, 0).unwrap()
    }

    struct Fixture {
        clock: Arc<FixedClock>,
        store: Arc<InMemoryStore>,
        handler: ReconciliationHandler<Arc<InMemoryStore>>,
        pending: Sale,
    }

    async fn fixture() -> Fixture {
        let clock = Arc::new(FixedClock::new(test_time()));
        let store = Arc::new(InMemoryStore::new(clock.clone()));
        let new = NewSale::new(
            VehicleId::new(),
            PaymentId::new("pay_A").unwrap(),
            "B1",
            Price::new(Decimal::from(20_000)).unwrap(),
        )
        .unwrap();
        let pending = SaleLedger::create(&store, new, test_time()).await.unwrap();
        clock.advance(Duration::minutes(10));

        Fixture {
            handler: ReconciliationHandler::new(store.clone(), clock.clone()),
            clock,
            store,
            pending,
        }
    }

    #[tokio::test]
    async fn approval_sets_sold_at_from_clock() {
        let fx = fixture().await;
        let sale = fx
            .handler
            .reconcile(fx.pending.payment_id(), SaleStatus::Approved)
            .await
            .unwrap();

        assert_eq!(sale.status(), SaleStatus::Approved);
        assert_eq!(sale.sold_at(), Some(test_time() + Duration::minutes(10)));
        assert!(sale.sold_at().unwrap() >= sale.created_at());
    }

    #[tokio::test]
    async fn cancel_after_approval_leaves_sale_unchanged() {
        let fx = fixture().await;
        let approved = fx
            .handler
            .reconcile(fx.pending.payment_id(), SaleStatus::Approved)
            .await
            .unwrap();
        fx.clock.advance(Duration::hours(1));

        let after = fx
            .handler
            .reconcile(fx.pending.payment_id(), SaleStatus::Canceled)
            .await
            .unwrap();
        assert_eq!(after, approved);
    }

    #[tokio::test]
    async fn repeated_approval_keeps_original_sold_at() {
        let fx = fixture().await;
        let first = fx
            .handler
            .reconcile(fx.pending.payment_id(), SaleStatus::Approved)
            .await
            .unwrap();
        fx.clock.advance(Duration::hours(2));

        let second = fx
            .handler
            .reconcile(fx.pending.payment_id(), SaleStatus::Approved)
            .await
            .unwrap();
        assert_eq!(second.sold_at(), first.sold_at());
        assert_eq!(second, first);
    }

    #[tokio::test]
    async fn cancel_frees_vehicle_without_sold_at() {
        let fx = fixture().await;
        let sale = fx
            .handler
            .reconcile(fx.pending.payment_id(), SaleStatus::Canceled)
            .await
            .unwrap();

        assert_eq!(sale.status(), SaleStatus::Canceled);
        assert_eq!(sale.sold_at(), None);
        assert!(fx
            .store
            .find_active_by_vehicle(fx.pending.vehicle_id())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn pending_report_is_a_no_op() {
        let fx = fixture().await;
        let sale = fx
            .handler
            .reconcile(fx.pending.payment_id(), SaleStatus::Pending)
            .await
            .unwrap();
        assert_eq!(sale, fx.pending);
    }

    #[tokio::test]
    async fn unknown_payment_is_not_found() {
        let fx = fixture().await;
        let err = fx
            .handler
            .reconcile(&PaymentId::new("pay_unknown").unwrap(), SaleStatus::Approved)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(Resource::Sale)));
    }
}
