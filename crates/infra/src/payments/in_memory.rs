use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use carlot_core::{PaymentId, Price};
use carlot_sales::SaleStatus;

use super::{PaymentGateway, PaymentGatewayError};

/// A payment request as seen by [`InMemoryPaymentGateway`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedPayment {
    pub payment_id: PaymentId,
    pub amount: Price,
    pub status: SaleStatus,
}

/// Local stand-in for the payment provider (tests/dev).
///
/// Issues `pay_<uuid>` ids and remembers every request. Can be switched into a
/// failing mode to exercise the upstream-failure path.
#[derive(Debug, Default)]
pub struct InMemoryPaymentGateway {
    issued: Mutex<Vec<IssuedPayment>>,
    failing: AtomicBool,
}

impl InMemoryPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn issued(&self) -> Vec<IssuedPayment> {
        self.issued
            .lock()
            .map(|issued| issued.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn generate_payment(
        &self,
        amount: Price,
        status: SaleStatus,
    ) -> Result<PaymentId, PaymentGatewayError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PaymentGatewayError::Rejected {
                status: 503,
                body: "payment provider unavailable".to_string(),
            });
        }

        let payment_id = PaymentId::new(format!("pay_{}", Uuid::now_v7().simple()))
            .map_err(|e| PaymentGatewayError::InvalidResponse(e.to_string()))?;

        let mut issued = self
            .issued
            .lock()
            .map_err(|_| PaymentGatewayError::Transport("gateway lock poisoned".to_string()))?;
        issued.push(IssuedPayment {
            payment_id: payment_id.clone(),
            amount,
            status,
        });
        Ok(payment_id)
    }
}
