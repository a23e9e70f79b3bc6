//! Payment provider boundary.
//!
//! The purchase flow only needs one call: ask the provider for a payment and get
//! back the correlation id that later webhook deliveries will carry.

pub mod http;
pub mod in_memory;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use carlot_core::{PaymentId, Price};
use carlot_sales::SaleStatus;

pub use http::HttpPaymentGateway;
pub use in_memory::InMemoryPaymentGateway;

#[derive(Debug, Error)]
pub enum PaymentGatewayError {
    #[error("payment provider unreachable: {0}")]
    Transport(String),

    #[error("payment provider answered {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("payment provider response could not be read: {0}")]
    InvalidResponse(String),
}

/// Issues payments with the external provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Request a payment of `amount`. `status` is the intent forwarded to the
    /// provider; the final outcome arrives later through the webhook.
    async fn generate_payment(
        &self,
        amount: Price,
        status: SaleStatus,
    ) -> Result<PaymentId, PaymentGatewayError>;
}

#[async_trait]
impl<G> PaymentGateway for Arc<G>
where
    G: PaymentGateway + ?Sized,
{
    async fn generate_payment(
        &self,
        amount: Price,
        status: SaleStatus,
    ) -> Result<PaymentId, PaymentGatewayError> {
        (**self).generate_payment(amount, status).await
    }
}
