//! Service-level error taxonomy shared by the catalog, purchase and reconciliation flows.

use thiserror::Error;

use carlot_core::{DomainError, VehicleId};

use crate::payments::PaymentGatewayError;
use crate::store::StoreError;

/// What a `NotFound` refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Vehicle,
    Sale,
}

impl core::fmt::Display for Resource {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Resource::Vehicle => "vehicle",
            Resource::Sale => "sale",
        })
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0} not found")]
    NotFound(Resource),

    /// The vehicle already has a pending or approved sale.
    #[error("vehicle {0} is already sold")]
    AlreadySold(VehicleId),

    #[error("invalid status: {0}")]
    InvalidStatus(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// The payment provider failed; nothing was written.
    #[error(transparent)]
    Gateway(#[from] PaymentGatewayError),

    #[error(transparent)]
    Store(StoreError),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    /// Expected business outcomes, as opposed to upstream failures.
    pub fn is_business_outcome(&self) -> bool {
        !matches!(self, ServiceError::Gateway(_) | ServiceError::Store(_))
    }
}

impl From<DomainError> for ServiceError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => ServiceError::Validation(msg),
            DomainError::InvalidId(msg) => ServiceError::Validation(msg),
            DomainError::InvalidStatus(msg) => ServiceError::InvalidStatus(msg),
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::ActiveSaleExists(vehicle_id) => ServiceError::AlreadySold(vehicle_id),
            StoreError::Duplicate(msg) => ServiceError::Conflict(msg),
            other => ServiceError::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_sale_conflict_becomes_already_sold() {
        let id = VehicleId::new();
        let err: ServiceError = StoreError::ActiveSaleExists(id).into();
        assert!(matches!(err, ServiceError::AlreadySold(v) if v == id));
        assert!(err.is_business_outcome());
    }

    #[test]
    fn storage_failures_stay_upstream() {
        let err: ServiceError = StoreError::Storage("boom".into()).into();
        assert!(matches!(err, ServiceError::Store(_)));
        assert!(!err.is_business_outcome());
    }

    #[test]
    fn domain_status_error_maps_to_invalid_status() {
        let err: ServiceError = DomainError::invalid_status("'PAID'").into();
        assert!(matches!(err, ServiceError::InvalidStatus(_)));
    }
}
