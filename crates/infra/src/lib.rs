//! Infrastructure layer: storage, payment provider client, config and the
//! services that tie them to the domain.

pub mod catalog;
pub mod config;
pub mod error;
pub mod payments;
pub mod purchase;
pub mod reconciliation;
pub mod sales_query;
pub mod store;

pub use catalog::VehicleCatalog;
pub use config::{AppConfig, ConfigError};
pub use error::{Resource, ServiceError, ServiceResult};
pub use purchase::PurchaseOrchestrator;
pub use reconciliation::ReconciliationHandler;
pub use sales_query::SalesQuery;
