//! Postgres-backed vehicle store and sale ledger.
//!
//! ## Constraints doing the heavy lifting
//!
//! - `sales_one_active_per_vehicle`: partial unique index on `vehicle_id` for every
//!   non-canceled sale. Two concurrent purchases of one vehicle race on this index
//!   and the loser gets `StoreError::ActiveSaleExists`.
//! - `sales_payment_id_key`: unique payment id, mapped to `StoreError::Duplicate`.
//! - `sales_sold_at_iff_approved`: CHECK keeping `sold_at` in step with the status.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation on the active-sale index) | `23505` | `ActiveSaleExists` |
//! | Database (other unique violation) | `23505` | `Duplicate` |
//! | Database (check constraint violation) | `23514` | `Corrupt` |
//! | Database (other) | Any other | `Storage` |
//! | PoolClosed / other | N/A | `Storage` |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Row};
use tracing::{instrument, Span};

use carlot_core::{Clock, PaymentId, Price, SaleId, VehicleId};
use carlot_sales::{NewSale, Sale, SaleStatus};
use carlot_vehicles::{NewVehicle, Vehicle, VehicleUpdate};

use super::{SaleLedger, StoreError, VehicleStore};

const ACTIVE_SALE_INDEX: &str = "sales_one_active_per_vehicle";

/// Idempotent DDL, executed statement by statement at startup.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS vehicles (
        id          UUID PRIMARY KEY,
        brand       TEXT NOT NULL,
        model       TEXT NOT NULL,
        year        INTEGER NOT NULL CHECK (year BETWEEN 1886 AND 9999),
        color       TEXT NOT NULL,
        price       NUMERIC(14, 2) NOT NULL CHECK (price > 0),
        created_at  TIMESTAMPTZ NOT NULL,
        updated_at  TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS sales (
        id                     UUID PRIMARY KEY,
        vehicle_id             UUID NOT NULL REFERENCES vehicles (id),
        payment_id             TEXT NOT NULL,
        buyer_document_number  TEXT NOT NULL,
        price                  NUMERIC(14, 2) NOT NULL,
        status                 TEXT NOT NULL CHECK (status IN ('PENDING', 'APPROVED', 'CANCELED')),
        sold_at                TIMESTAMPTZ NULL,
        created_at             TIMESTAMPTZ NOT NULL,
        updated_at             TIMESTAMPTZ NOT NULL,
        CONSTRAINT sales_sold_at_iff_approved
            CHECK ((status = 'APPROVED') = (sold_at IS NOT NULL))
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS sales_payment_id_key ON sales (payment_id)",
    "CREATE UNIQUE INDEX IF NOT EXISTS sales_one_active_per_vehicle ON sales (vehicle_id) WHERE status <> 'CANCELED'",
    "CREATE INDEX IF NOT EXISTS sales_created_at_idx ON sales (created_at DESC)",
];

const VEHICLE_COLUMNS: &str = "id, brand, model, year, color, price, created_at, updated_at";
const SALE_COLUMNS: &str =
    "id, vehicle_id, payment_id, buyer_document_number, price, status, sold_at, created_at, updated_at";

/// Postgres implementation of [`VehicleStore`] and [`SaleLedger`].
///
/// Uses the SQLx connection pool, which is `Send + Sync` and cheap to clone.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl PostgresStore {
    pub fn new(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    /// Open a pool against `database_url`.
    pub async fn connect(database_url: &str, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool, clock))
    }

    /// Create tables and indexes if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        }
        Ok(())
    }

    async fn fetch_sale_by_payment(&self, payment_id: &PaymentId) -> Result<Option<Sale>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {SALE_COLUMNS} FROM sales WHERE payment_id = $1"
        ))
        .bind(payment_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_by_payment_id", e))?;

        row.map(|r| sale_from_row(&r)).transpose()
    }
}

#[async_trait]
impl VehicleStore for PostgresStore {
    #[instrument(
        skip(self, vehicle),
        fields(operation = "create_vehicle", vehicle_id = tracing::field::Empty),
        err
    )]
    async fn create(&self, vehicle: NewVehicle, now: DateTime<Utc>) -> Result<Vehicle, StoreError> {
        let vehicle = Vehicle::from_new(vehicle, now);
        Span::current().record("vehicle_id", tracing::field::display(vehicle.id));

        sqlx::query(
            r#"
            INSERT INTO vehicles (id, brand, model, year, color, price, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(vehicle.id.as_uuid())
        .bind(&vehicle.brand)
        .bind(&vehicle.model)
        .bind(vehicle.year)
        .bind(&vehicle.color)
        .bind(vehicle.price.amount())
        .bind(vehicle.created_at)
        .bind(vehicle.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Duplicate(format!("vehicle {} already exists", vehicle.id))
            } else {
                map_sqlx_error("create_vehicle", e)
            }
        })?;

        Ok(vehicle)
    }

    #[instrument(skip(self), fields(operation = "get_vehicle", vehicle_id = %id), err)]
    async fn get(&self, id: VehicleId) -> Result<Option<Vehicle>, StoreError> {
        let row = sqlx::query(&format!("SELECT {VEHICLE_COLUMNS} FROM vehicles WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_vehicle", e))?;

        row.map(|r| vehicle_from_row(&r)).transpose()
    }

    #[instrument(skip(self), fields(operation = "search_vehicles", result_count = tracing::field::Empty), err)]
    async fn search(&self, sold: Option<bool>) -> Result<Vec<Vehicle>, StoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {VEHICLE_COLUMNS}
            FROM vehicles v
            WHERE $1::BOOLEAN IS NULL
               OR EXISTS (
                    SELECT 1 FROM sales s
                    WHERE s.vehicle_id = v.id AND s.status = 'APPROVED'
                  ) = $1::BOOLEAN
            ORDER BY v.price ASC, v.id ASC
            "#
        ))
        .bind(sold)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("search_vehicles", e))?;

        Span::current().record("result_count", rows.len());
        rows.iter().map(vehicle_from_row).collect()
    }

    /// Read-modify-write under `SELECT ... FOR UPDATE` so the patch semantics live in
    /// [`VehicleUpdate::apply_to`] only.
    #[instrument(skip(self, patch), fields(operation = "update_vehicle", vehicle_id = %id), err)]
    async fn update(
        &self,
        id: VehicleId,
        patch: VehicleUpdate,
        now: DateTime<Utc>,
    ) -> Result<Option<Vehicle>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let row = sqlx::query(&format!(
            "SELECT {VEHICLE_COLUMNS} FROM vehicles WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_vehicle", e))?;

        let Some(row) = row else {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Ok(None);
        };
        let mut vehicle = vehicle_from_row(&row)?;

        if patch.apply_to(&mut vehicle, now) {
            sqlx::query(
                r#"
                UPDATE vehicles
                SET brand = $2, model = $3, year = $4, color = $5, price = $6, updated_at = $7
                WHERE id = $1
                "#,
            )
            .bind(vehicle.id.as_uuid())
            .bind(&vehicle.brand)
            .bind(&vehicle.model)
            .bind(vehicle.year)
            .bind(&vehicle.color)
            .bind(vehicle.price.amount())
            .bind(vehicle.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_vehicle", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(Some(vehicle))
    }
}

#[async_trait]
impl SaleLedger for PostgresStore {
    #[instrument(
        skip(self, sale),
        fields(operation = "create_sale", vehicle_id = %sale.vehicle_id, payment_id = %sale.payment_id),
        err
    )]
    async fn create(&self, sale: NewSale, now: DateTime<Utc>) -> Result<Sale, StoreError> {
        let vehicle_id = sale.vehicle_id;
        let sale = Sale::open(SaleId::new(), sale, now);

        sqlx::query(
            r#"
            INSERT INTO sales (
                id, vehicle_id, payment_id, buyer_document_number, price,
                status, sold_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(sale.id().as_uuid())
        .bind(sale.vehicle_id().as_uuid())
        .bind(sale.payment_id().as_str())
        .bind(sale.buyer_document_number())
        .bind(sale.price().amount())
        .bind(sale.status().as_str())
        .bind(sale.sold_at())
        .bind(sale.created_at())
        .bind(sale.updated_at())
        .execute(&self.pool)
        .await
        .map_err(|e| match violated_unique_index(&e) {
            Some(ACTIVE_SALE_INDEX) => StoreError::ActiveSaleExists(vehicle_id),
            Some(_) => StoreError::Duplicate(format!("payment {} already has a sale", sale.payment_id())),
            None => map_sqlx_error("create_sale", e),
        })?;

        Ok(sale)
    }

    #[instrument(skip(self), fields(operation = "find_active_sale", vehicle_id = %vehicle_id), err)]
    async fn find_active_by_vehicle(&self, vehicle_id: VehicleId) -> Result<Option<Sale>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {SALE_COLUMNS} FROM sales WHERE vehicle_id = $1 AND status <> 'CANCELED'"
        ))
        .bind(vehicle_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_active_sale", e))?;

        row.map(|r| sale_from_row(&r)).transpose()
    }

    #[instrument(skip(self), fields(operation = "find_by_payment_id", payment_id = %payment_id), err)]
    async fn find_by_payment_id(&self, payment_id: &PaymentId) -> Result<Option<Sale>, StoreError> {
        self.fetch_sale_by_payment(payment_id).await
    }

    #[instrument(skip(self), fields(operation = "search_sales", result_count = tracing::field::Empty), err)]
    async fn search(&self, status: Option<SaleStatus>) -> Result<Vec<Sale>, StoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {SALE_COLUMNS}
            FROM sales
            WHERE $1::TEXT IS NULL OR status = $1::TEXT
            ORDER BY created_at DESC, id DESC
            "#
        ))
        .bind(status.map(SaleStatus::as_str))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("search_sales", e))?;

        Span::current().record("result_count", rows.len());
        rows.iter().map(sale_from_row).collect()
    }

    /// Compare-and-set on `PENDING`: a row already in a terminal state is never
    /// matched, so it cannot be overwritten. When nothing matched, the current row is
    /// returned as-is.
    #[instrument(
        skip(self),
        fields(operation = "update_sale_status", payment_id = %payment_id, status = %status, applied = tracing::field::Empty),
        err
    )]
    async fn update_status(
        &self,
        payment_id: &PaymentId,
        status: SaleStatus,
        sold_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Sale>, StoreError> {
        let at = sold_at.unwrap_or_else(|| self.clock.now());

        let row = sqlx::query(&format!(
            r#"
            UPDATE sales
            SET status = $2::TEXT,
                sold_at = CASE WHEN $2::TEXT = 'APPROVED' THEN $3 ELSE NULL END,
                updated_at = $3
            WHERE payment_id = $1
              AND status = 'PENDING'
              AND $2::TEXT <> 'PENDING'
            RETURNING {SALE_COLUMNS}
            "#
        ))
        .bind(payment_id.as_str())
        .bind(status.as_str())
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_sale_status", e))?;

        let span = Span::current();
        match row {
            Some(row) => {
                span.record("applied", true);
                sale_from_row(&row).map(Some)
            }
            None => {
                span.record("applied", false);
                self.fetch_sale_by_payment(payment_id).await
            }
        }
    }
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Duplicate(msg),
                Some("23514") => StoreError::Corrupt(msg),
                _ => StoreError::Storage(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Storage(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Storage(format!("sqlx error in {}: {}", operation, err)),
    }
}

/// Check if an error is a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    violated_unique_index(err).is_some()
}

/// Name of the unique index/constraint a `23505` error points at (empty if unnamed).
fn violated_unique_index(err: &sqlx::Error) -> Option<&str> {
    if let sqlx::Error::Database(db_err) = err {
        if db_err.code().as_deref() == Some("23505") {
            return Some(db_err.constraint().unwrap_or_default());
        }
    }
    None
}

// SQLx row types

#[derive(Debug)]
struct VehicleRow {
    id: uuid::Uuid,
    brand: String,
    model: String,
    year: i32,
    color: String,
    price: Decimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for VehicleRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(VehicleRow {
            id: row.try_get("id")?,
            brand: row.try_get("brand")?,
            model: row.try_get("model")?,
            year: row.try_get("year")?,
            color: row.try_get("color")?,
            price: row.try_get("price")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl TryFrom<VehicleRow> for Vehicle {
    type Error = StoreError;

    fn try_from(row: VehicleRow) -> Result<Self, Self::Error> {
        Ok(Vehicle {
            id: VehicleId::from_uuid(row.id),
            brand: row.brand,
            model: row.model,
            year: row.year,
            color: row.color,
            price: Price::new(row.price)
                .map_err(|e| StoreError::Corrupt(format!("vehicle {}: {e}", row.id)))?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug)]
struct SaleRow {
    id: uuid::Uuid,
    vehicle_id: uuid::Uuid,
    payment_id: String,
    buyer_document_number: String,
    price: Decimal,
    status: String,
    sold_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for SaleRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(SaleRow {
            id: row.try_get("id")?,
            vehicle_id: row.try_get("vehicle_id")?,
            payment_id: row.try_get("payment_id")?,
            buyer_document_number: row.try_get("buyer_document_number")?,
            price: row.try_get("price")?,
            status: row.try_get("status")?,
            sold_at: row.try_get("sold_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl TryFrom<SaleRow> for Sale {
    type Error = StoreError;

    fn try_from(row: SaleRow) -> Result<Self, Self::Error> {
        let corrupt = |e: carlot_core::DomainError| StoreError::Corrupt(format!("sale {}: {e}", row.id));
        Sale::restore(
            SaleId::from_uuid(row.id),
            VehicleId::from_uuid(row.vehicle_id),
            PaymentId::new(row.payment_id.clone()).map_err(corrupt)?,
            row.buyer_document_number.clone(),
            Price::new(row.price).map_err(corrupt)?,
            row.status.parse().map_err(corrupt)?,
            row.sold_at,
            row.created_at,
            row.updated_at,
        )
        .map_err(corrupt)
    }
}

fn vehicle_from_row(row: &PgRow) -> Result<Vehicle, StoreError> {
    VehicleRow::from_row(row)
        .map_err(|e| StoreError::Corrupt(format!("failed to deserialize vehicle row: {}", e)))?
        .try_into()
}

fn sale_from_row(row: &PgRow) -> Result<Sale, StoreError> {
    SaleRow::from_row(row)
        .map_err(|e| StoreError::Corrupt(format!("failed to deserialize sale row: {}", e)))?
        .try_into()
}
