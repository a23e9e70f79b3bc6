use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use carlot_core::{DomainError, DomainResult, PaymentId, Price, SaleId, VehicleId};

/// Sale status lifecycle.
///
/// `PENDING` is the only non-terminal state. The wire/storage encoding is the
/// uppercase variant name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SaleStatus {
    Pending,
    Approved,
    Canceled,
}

impl SaleStatus {
    pub const ALL: [SaleStatus; 3] = [SaleStatus::Pending, SaleStatus::Approved, SaleStatus::Canceled];

    pub fn as_str(self) -> &'static str {
        match self {
            SaleStatus::Pending => "PENDING",
            SaleStatus::Approved => "APPROVED",
            SaleStatus::Canceled => "CANCELED",
        }
    }

    /// No transition is defined out of a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(self, SaleStatus::Approved | SaleStatus::Canceled)
    }

    /// Active sales block further purchases of the same vehicle.
    pub fn is_active(self) -> bool {
        !matches!(self, SaleStatus::Canceled)
    }
}

impl core::fmt::Display for SaleStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SaleStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SaleStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| {
                DomainError::invalid_status(format!(
                    "'{s}' (expected one of: PENDING, APPROVED, CANCELED)"
                ))
            })
    }
}

/// Outcome of applying a status to a sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The sale moved to a new status.
    Applied { from: SaleStatus, to: SaleStatus },
    /// The sale was left untouched (terminal already, or same status).
    Unchanged,
}

impl Transition {
    pub fn is_applied(self) -> bool {
        matches!(self, Transition::Applied { .. })
    }
}

/// Validated request to open a sale for a vehicle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSale {
    pub vehicle_id: VehicleId,
    pub payment_id: PaymentId,
    pub buyer_document_number: String,
    /// Snapshot of the vehicle price at purchase time.
    pub price: Price,
}

impl NewSale {
    pub fn new(
        vehicle_id: VehicleId,
        payment_id: PaymentId,
        buyer_document_number: &str,
        price: Price,
    ) -> DomainResult<Self> {
        Ok(Self {
            vehicle_id,
            payment_id,
            buyer_document_number: buyer_document(buyer_document_number)?,
            price,
        })
    }
}

/// Validate a buyer document number (non-empty, trimmed).
pub fn buyer_document(value: &str) -> DomainResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation("buyer_document_number must not be empty"));
    }
    Ok(trimmed.to_string())
}

/// A sale record.
///
/// Fields are private so that `status` and `sold_at` only ever change through
/// [`Sale::apply`], which keeps `sold_at.is_some() == (status == APPROVED)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sale {
    id: SaleId,
    vehicle_id: VehicleId,
    payment_id: PaymentId,
    buyer_document_number: String,
    price: Price,
    status: SaleStatus,
    sold_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Sale {
    /// Open a new sale in `PENDING`.
    pub fn open(id: SaleId, new: NewSale, now: DateTime<Utc>) -> Self {
        Self {
            id,
            vehicle_id: new.vehicle_id,
            payment_id: new.payment_id,
            buyer_document_number: new.buyer_document_number,
            price: new.price,
            status: SaleStatus::Pending,
            sold_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Rehydrate a sale from storage, checking the `sold_at` invariant.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: SaleId,
        vehicle_id: VehicleId,
        payment_id: PaymentId,
        buyer_document_number: String,
        price: Price,
        status: SaleStatus,
        sold_at: Option<DateTime<Utc>>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if sold_at.is_some() != (status == SaleStatus::Approved) {
            return Err(DomainError::validation(format!(
                "sale {id}: sold_at must be present iff status is APPROVED (status: {status})"
            )));
        }
        Ok(Self {
            id,
            vehicle_id,
            payment_id,
            buyer_document_number,
            price,
            status,
            sold_at,
            created_at,
            updated_at,
        })
    }

    pub fn id(&self) -> SaleId {
        self.id
    }

    pub fn vehicle_id(&self) -> VehicleId {
        self.vehicle_id
    }

    pub fn payment_id(&self) -> &PaymentId {
        &self.payment_id
    }

    pub fn buyer_document_number(&self) -> &str {
        &self.buyer_document_number
    }

    pub fn price(&self) -> Price {
        self.price
    }

    pub fn status(&self) -> SaleStatus {
        self.status
    }

    pub fn sold_at(&self) -> Option<DateTime<Utc>> {
        self.sold_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Apply a reported payment outcome.
    ///
    /// Terminal sales are returned untouched whatever `next` is, so redelivered
    /// notifications are no-ops. Entering `APPROVED` stamps `sold_at = now`.
    pub fn apply(&mut self, next: SaleStatus, now: DateTime<Utc>) -> Transition {
        if self.status.is_terminal() || self.status == next {
            return Transition::Unchanged;
        }

        let from = self.status;
        self.status = next;
        if next == SaleStatus::Approved {
            self.sold_at = Some(now);
        }
        self.updated_at = now;

        Transition::Applied { from, to: next }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;
    use rust_decimal::Decimal;

    fn test_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap()
    }

    fn pending_sale() -> Sale {
        let new = NewSale::new(
            VehicleId::new(),
            PaymentId::new("pay_1").unwrap(),
            "12345678900",
            Price::new(Decimal::from(20000)).unwrap(),
        )
        .unwrap();
        Sale::open(SaleId::new(), new, test_time())
    }

    fn any_status() -> impl Strategy<Value = SaleStatus> {
        prop_oneof![
            Just(SaleStatus::Pending),
            Just(SaleStatus::Approved),
            Just(SaleStatus::Canceled),
        ]
    }

    #[test]
    fn opened_sale_is_pending_without_sold_at() {
        let sale = pending_sale();
        assert_eq!(sale.status(), SaleStatus::Pending);
        assert_eq!(sale.sold_at(), None);
        assert!(sale.is_active());
        assert_eq!(sale.price().amount(), Decimal::from(20000));
    }

    #[test]
    fn approving_sets_sold_at() {
        let mut sale = pending_sale();
        let later = test_time() + Duration::minutes(3);

        let t = sale.apply(SaleStatus::Approved, later);
        assert_eq!(
            t,
            Transition::Applied {
                from: SaleStatus::Pending,
                to: SaleStatus::Approved
            }
        );
        assert_eq!(sale.status(), SaleStatus::Approved);
        assert_eq!(sale.sold_at(), Some(later));
        assert!(sale.sold_at().unwrap() >= sale.created_at());
    }

    #[test]
    fn canceling_leaves_sold_at_unset_and_frees_vehicle() {
        let mut sale = pending_sale();
        assert!(sale.apply(SaleStatus::Canceled, test_time()).is_applied());
        assert_eq!(sale.sold_at(), None);
        assert!(!sale.is_active());
    }

    #[test]
    fn terminal_sale_ignores_later_outcomes() {
        let mut sale = pending_sale();
        let approved_at = test_time() + Duration::minutes(1);
        sale.apply(SaleStatus::Approved, approved_at);
        let snapshot = sale.clone();

        let t = sale.apply(SaleStatus::Canceled, approved_at + Duration::hours(1));
        assert_eq!(t, Transition::Unchanged);
        assert_eq!(sale, snapshot);

        let t = sale.apply(SaleStatus::Approved, approved_at + Duration::hours(2));
        assert_eq!(t, Transition::Unchanged);
        assert_eq!(sale.sold_at(), Some(approved_at));
    }

    #[test]
    fn pending_to_pending_is_a_no_op() {
        let mut sale = pending_sale();
        let before = sale.clone();
        assert_eq!(
            sale.apply(SaleStatus::Pending, test_time() + Duration::minutes(1)),
            Transition::Unchanged
        );
        assert_eq!(sale, before);
    }

    #[test]
    fn status_parsing_is_closed() {
        assert_eq!("PENDING".parse::<SaleStatus>().unwrap(), SaleStatus::Pending);
        assert_eq!("APPROVED".parse::<SaleStatus>().unwrap(), SaleStatus::Approved);
        assert_eq!("CANCELED".parse::<SaleStatus>().unwrap(), SaleStatus::Canceled);

        for raw in ["", "approved", "REFUNDED", "CANCELLED"] {
            match raw.parse::<SaleStatus>() {
                Err(DomainError::InvalidStatus(_)) => {}
                other => panic!("expected InvalidStatus for {raw:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn status_serializes_uppercase() {
        assert_eq!(
            serde_json::to_value(SaleStatus::Canceled).unwrap(),
            serde_json::json!("CANCELED")
        );
    }

    #[test]
    fn restore_rejects_inconsistent_sold_at() {
        let sale = pending_sale();
        let err = Sale::restore(
            sale.id(),
            sale.vehicle_id(),
            sale.payment_id().clone(),
            sale.buyer_document_number().to_string(),
            sale.price(),
            SaleStatus::Approved,
            None,
            sale.created_at(),
            sale.updated_at(),
        );
        assert!(err.is_err());

        let err = Sale::restore(
            sale.id(),
            sale.vehicle_id(),
            sale.payment_id().clone(),
            sale.buyer_document_number().to_string(),
            sale.price(),
            SaleStatus::Canceled,
            Some(test_time()),
            sale.created_at(),
            sale.updated_at(),
        );
        assert!(err.is_err());
    }

    #[test]
    fn blank_buyer_document_is_rejected() {
        let err = NewSale::new(
            VehicleId::new(),
            PaymentId::new("pay_1").unwrap(),
            "  ",
            Price::new(Decimal::from(1)).unwrap(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 512,
            ..ProptestConfig::default()
        })]

        /// Property: for any delivery sequence, sold_at is present iff APPROVED,
        /// and once a terminal state is reached nothing changes again.
        #[test]
        fn delivery_sequences_respect_state_machine(
            deliveries in prop::collection::vec(any_status(), 1..12)
        ) {
            let mut sale = pending_sale();
            let mut terminal: Option<Sale> = None;

            for (i, status) in deliveries.into_iter().enumerate() {
                let now = test_time() + Duration::seconds(i as i64 + 1);
                let t = sale.apply(status, now);

                prop_assert_eq!(sale.sold_at().is_some(), sale.status() == SaleStatus::Approved);

                if let Some(frozen) = &terminal {
                    prop_assert_eq!(t, Transition::Unchanged);
                    prop_assert_eq!(&sale, frozen);
                } else if sale.status().is_terminal() {
                    terminal = Some(sale.clone());
                }
            }
        }

        /// Property: applying the same outcome twice equals applying it once.
        #[test]
        fn reapplying_an_outcome_is_idempotent(status in any_status()) {
            let mut once = pending_sale();
            once.apply(status, test_time() + Duration::seconds(1));

            let mut twice = once.clone();
            let t = twice.apply(status, test_time() + Duration::seconds(2));

            prop_assert_eq!(t, Transition::Unchanged);
            prop_assert_eq!(once, twice);
        }
    }
}
