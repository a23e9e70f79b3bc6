use carlot_sales::{Sale, SaleStatus};

use crate::error::ServiceResult;
use crate::store::SaleLedger;

/// Read side over the sale ledger.
pub struct SalesQuery<L> {
    ledger: L,
}

impl<L> SalesQuery<L>
where
    L: SaleLedger,
{
    pub fn new(ledger: L) -> Self {
        Self { ledger }
    }

    /// Sales newest first, optionally restricted to one status.
    pub async fn list(&self, status: Option<SaleStatus>) -> ServiceResult<Vec<Sale>> {
        Ok(self.ledger.search(status).await?)
    }
}
