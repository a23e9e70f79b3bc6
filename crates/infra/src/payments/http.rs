use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use carlot_core::{PaymentId, Price};
use carlot_sales::SaleStatus;

use super::{PaymentGateway, PaymentGatewayError};

#[derive(Debug, Serialize)]
struct CreatePaymentRequest<'a> {
    webhook_url: &'a str,
    amount: Price,
    status: SaleStatus,
}

/// Only `payment_id` is consumed; the echoed fields are ignored.
#[derive(Debug, Deserialize)]
struct CreatePaymentResponse {
    payment_id: String,
}

/// Payment provider client over HTTP/JSON.
///
/// `POST {payments_host}/payments`; anything but `200 OK` is a rejection.
#[derive(Debug, Clone)]
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    payments_url: String,
    webhook_url: String,
}

impl HttpPaymentGateway {
    /// `public_host` is our own externally reachable base URL; the provider calls
    /// back on `{public_host}/sales/webhook`.
    pub fn new(
        payments_host: &str,
        public_host: &str,
        timeout: Duration,
    ) -> Result<Self, PaymentGatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PaymentGatewayError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            payments_url: format!("{}/payments", payments_host.trim_end_matches('/')),
            webhook_url: format!("{}/sales/webhook", public_host.trim_end_matches('/')),
        })
    }

    pub fn payments_url(&self) -> &str {
        &self.payments_url
    }

    pub fn webhook_url(&self) -> &str {
        &self.webhook_url
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    #[instrument(skip(self), err)]
    async fn generate_payment(
        &self,
        amount: Price,
        status: SaleStatus,
    ) -> Result<PaymentId, PaymentGatewayError> {
        let body = CreatePaymentRequest {
            webhook_url: &self.webhook_url,
            amount,
            status,
        };

        let resp = self
            .client
            .post(&self.payments_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| PaymentGatewayError::Transport(e.to_string()))?;

        if resp.status() != StatusCode::OK {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(PaymentGatewayError::Rejected { status, body });
        }

        let created: CreatePaymentResponse = resp
            .json()
            .await
            .map_err(|e| PaymentGatewayError::InvalidResponse(e.to_string()))?;
        let payment_id = PaymentId::new(created.payment_id)
            .map_err(|e| PaymentGatewayError::InvalidResponse(e.to_string()))?;

        debug!(payment_id = %payment_id, url = %self.payments_url, "payment issued");
        Ok(payment_id)
    }
}
