use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use carlot_core::{Clock, SystemClock};
use carlot_infra::{
    payments::{HttpPaymentGateway, InMemoryPaymentGateway, PaymentGateway},
    store::{InMemoryStore, PostgresStore, SaleLedger, VehicleStore},
    AppConfig, PurchaseOrchestrator, ReconciliationHandler, SalesQuery, VehicleCatalog,
};

pub type DynVehicleStore = Arc<dyn VehicleStore>;
pub type DynSaleLedger = Arc<dyn SaleLedger>;
pub type DynPaymentGateway = Arc<dyn PaymentGateway>;

/// Everything the handlers need, already wired to concrete backends.
pub struct AppServices {
    pub catalog: VehicleCatalog<DynVehicleStore>,
    pub purchases: PurchaseOrchestrator<DynVehicleStore, DynSaleLedger, DynPaymentGateway>,
    pub reconciliation: ReconciliationHandler<DynSaleLedger>,
    pub sales: SalesQuery<DynSaleLedger>,
}

impl AppServices {
    pub fn new(
        vehicles: DynVehicleStore,
        ledger: DynSaleLedger,
        gateway: DynPaymentGateway,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            catalog: VehicleCatalog::new(vehicles.clone(), clock.clone()),
            purchases: PurchaseOrchestrator::new(vehicles, ledger.clone(), gateway, clock.clone()),
            reconciliation: ReconciliationHandler::new(ledger.clone(), clock),
            sales: SalesQuery::new(ledger),
        }
    }
}

/// Build services based on `USE_PERSISTENT_STORES` and the payment provider settings.
pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let (vehicles, ledger): (DynVehicleStore, DynSaleLedger) = if config.use_persistent_stores {
        let database_url = config
            .database_url
            .as_deref()
            .context("DATABASE_URL must be set when USE_PERSISTENT_STORES=true")?;
        let store = Arc::new(
            PostgresStore::connect(database_url, clock.clone())
                .await
                .context("failed to connect to Postgres")?,
        );
        store.ensure_schema().await.context("failed to prepare schema")?;
        info!("using Postgres stores");
        let vehicles: DynVehicleStore = store.clone();
        let ledger: DynSaleLedger = store;
        (vehicles, ledger)
    } else {
        let store = Arc::new(InMemoryStore::new(clock.clone()));
        info!("using in-memory stores");
        let vehicles: DynVehicleStore = store.clone();
        let ledger: DynSaleLedger = store;
        (vehicles, ledger)
    };

    let gateway: DynPaymentGateway = match config.payments_host.as_deref() {
        Some(host) => {
            let gateway = HttpPaymentGateway::new(host, &config.public_host, config.payments_timeout)
                .context("failed to build payment client")?;
            info!(
                payments_url = gateway.payments_url(),
                webhook_url = gateway.webhook_url(),
                "using HTTP payment gateway"
            );
            Arc::new(gateway)
        }
        None => {
            warn!("VEHICLE_PLATFORM_PAYMENTS_HOST not set; using in-memory payment gateway");
            Arc::new(InMemoryPaymentGateway::new())
        }
    };

    Ok(AppServices::new(vehicles, ledger, gateway, clock))
}
