//! Postgres-backed stock store.
//!
//! One database transaction per [`PostgresUnit`]. The unit sets a local
//! `lock_timeout` and takes `SELECT ... FOR UPDATE` row locks on batches, so a
//! busy batch surfaces as [`StoreError::Contention`] instead of a stalled
//! request.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database | `55P03` | `Contention` | `lock_timeout` expired waiting for a batch row |
//! | Database | `40001` / `40P01` | `Contention` | Serialization failure / deadlock |
//! | Database | `23505` | `Constraint` | Duplicate batch number for the medicine |
//! | Database | `23503` / `23514` | `Constraint` | Dangling reference / negative quantity check |
//! | Database (other) | Any other | `Backend` | Other database errors |
//! | PoolClosed / PoolTimedOut / Io / other | N/A | `Backend` | Connectivity |

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SubsecRound, Utc};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::{instrument, warn};
use uuid::Uuid;

use pharmastock_core::{BatchId, LedgerEntryId, MedicineId, SupplierId, UserId};
use pharmastock_inventory::{Batch, LedgerEntry, Medicine, MedicineStockSummary, NewLedgerEntry};
use pharmastock_notifications::AlertKind;

use super::r#trait::{StockStore, StockUnit, StoreError};

const BATCH_COLUMNS: &str = r#"
    id,
    medicine_id,
    supplier_id,
    batch_number,
    quantity_received,
    current_quantity,
    manufacture_date,
    expiry_date,
    created_at
"#;

const LEDGER_COLUMNS: &str = r#"
    id,
    medicine_id,
    batch_id,
    transaction_type,
    quantity_change,
    quantity_after_transaction,
    transaction_date,
    user_id,
    notes,
    related_transaction_id
"#;

/// Postgres-backed stock store.
///
/// Cheap to clone; the pool is shared.
#[derive(Debug, Clone)]
pub struct PostgresStockStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PostgresStockStore {
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// A live database transaction. Dropping it without commit rolls back.
pub struct PostgresUnit {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StockUnit for PostgresUnit {
    async fn medicine(&mut self, id: MedicineId) -> Result<Option<Medicine>, StoreError> {
        let row = sqlx::query("SELECT id, name, low_stock_threshold FROM medicines WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("unit_medicine", e))?;
        row.map(|r| decode_medicine(&r)).transpose()
    }

    async fn supplier_exists(&mut self, id: SupplierId) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT EXISTS (SELECT 1 FROM suppliers WHERE id = $1) AS found")
            .bind(id.as_uuid())
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("supplier_exists", e))?;
        row.try_get("found").map_err(decode_error)
    }

    async fn ledger_entry_exists(&mut self, id: LedgerEntryId) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT EXISTS (SELECT 1 FROM stock_ledger WHERE id = $1) AS found")
            .bind(id.value())
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("ledger_entry_exists", e))?;
        row.try_get("found").map_err(decode_error)
    }

    #[instrument(skip(self), fields(batch_id = %id), err)]
    async fn lock_batch(&mut self, id: BatchId) -> Result<Option<Batch>, StoreError> {
        let sql = format!(
            "SELECT {BATCH_COLUMNS} FROM batches WHERE id = $1 AND deleted_at IS NULL FOR UPDATE"
        );
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("lock_batch", e))?;
        row.map(|r| decode_batch(&r)).transpose()
    }

    async fn latest_entry_date(&mut self, id: BatchId) -> Result<Option<DateTime<Utc>>, StoreError> {
        let row = sqlx::query("SELECT MAX(transaction_date) AS latest FROM stock_ledger WHERE batch_id = $1")
            .bind(id.as_uuid())
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("latest_entry_date", e))?;
        row.try_get("latest").map_err(decode_error)
    }

    async fn batch_number_taken(
        &mut self,
        medicine_id: MedicineId,
        batch_number: &str,
    ) -> Result<bool, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM batches
                WHERE medicine_id = $1 AND batch_number = $2 AND deleted_at IS NULL
            ) AS found
            "#,
        )
        .bind(medicine_id.as_uuid())
        .bind(batch_number)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("batch_number_taken", e))?;
        row.try_get("found").map_err(decode_error)
    }

    #[instrument(skip(self, batch), fields(batch_id = %batch.id_typed(), medicine_id = %batch.medicine_id()), err)]
    async fn insert_batch(&mut self, batch: &Batch) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO batches (
                id,
                medicine_id,
                supplier_id,
                batch_number,
                quantity_received,
                current_quantity,
                manufacture_date,
                expiry_date,
                created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(batch.id_typed().as_uuid())
        .bind(batch.medicine_id().as_uuid())
        .bind(batch.supplier_id().map(|s| *s.as_uuid()))
        .bind(batch.batch_number())
        .bind(batch.quantity_received())
        .bind(batch.current_quantity())
        .bind(batch.manufacture_date())
        .bind(batch.expiry_date())
        .bind(batch.created_at())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_batch", e))?;
        Ok(())
    }

    async fn write_batch_quantity(&mut self, id: BatchId, current_quantity: i64) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE batches SET current_quantity = $2, updated_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id.as_uuid())
        .bind(current_quantity)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("write_batch_quantity", e))?;
        if result.rows_affected() != 1 {
            return Err(StoreError::Backend(format!(
                "batch {id} vanished while locked"
            )));
        }
        Ok(())
    }

    #[instrument(
        skip(self, entry),
        fields(medicine_id = %entry.medicine_id, transaction_type = %entry.transaction_type),
        err
    )]
    async fn append_entry(&mut self, mut entry: NewLedgerEntry) -> Result<LedgerEntry, StoreError> {
        // Return exactly what a later read will see.
        entry.transaction_date = db_timestamp(entry.transaction_date);
        let row = sqlx::query(
            r#"
            INSERT INTO stock_ledger (
                medicine_id,
                batch_id,
                transaction_type,
                quantity_change,
                quantity_after_transaction,
                transaction_date,
                user_id,
                notes,
                related_transaction_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id
            "#,
        )
        .bind(entry.medicine_id.as_uuid())
        .bind(entry.batch_id.map(|b| *b.as_uuid()))
        .bind(entry.transaction_type.code())
        .bind(entry.quantity_change)
        .bind(entry.quantity_after_transaction)
        .bind(entry.transaction_date)
        .bind(entry.user_id.map(|u| *u.as_uuid()))
        .bind(entry.notes.as_deref())
        .bind(entry.related_transaction_id.map(|r| r.value()))
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("append_entry", e))?;

        let id: i64 = row.try_get("id").map_err(decode_error)?;
        Ok(entry.into_entry(LedgerEntryId::new(id)))
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))
    }
}

#[async_trait]
impl StockStore for PostgresStockStore {
    type Unit = PostgresUnit;

    async fn begin(&self) -> Result<Self::Unit, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        // Local to this transaction; released on commit/rollback.
        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(lock_timeout_setting(self.lock_timeout))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_lock_timeout", e))?;

        Ok(PostgresUnit { tx })
    }

    async fn medicine(&self, id: MedicineId) -> Result<Option<Medicine>, StoreError> {
        let row = sqlx::query("SELECT id, name, low_stock_threshold FROM medicines WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("medicine", e))?;
        row.map(|r| decode_medicine(&r)).transpose()
    }

    /// Rows that fail to decode are logged and skipped so one bad record
    /// does not take down a whole scan.
    #[instrument(skip(self), err)]
    async fn medicines(&self) -> Result<Vec<Medicine>, StoreError> {
        let rows = sqlx::query("SELECT id, name, low_stock_threshold FROM medicines ORDER BY name, id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("medicines", e))?;

        let mut medicines = Vec::with_capacity(rows.len());
        for row in rows {
            match decode_medicine(&row) {
                Ok(m) => medicines.push(m),
                Err(e) => warn!(error = %e, "skipping undecodable medicine row"),
            }
        }
        Ok(medicines)
    }

    async fn batch(&self, id: BatchId) -> Result<Option<Batch>, StoreError> {
        let sql = format!("SELECT {BATCH_COLUMNS} FROM batches WHERE id = $1 AND deleted_at IS NULL");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("batch", e))?;
        row.map(|r| decode_batch(&r)).transpose()
    }

    async fn batches_for_medicine(&self, id: MedicineId) -> Result<Vec<Batch>, StoreError> {
        let sql = format!(
            "SELECT {BATCH_COLUMNS} FROM batches \
             WHERE medicine_id = $1 AND deleted_at IS NULL \
             ORDER BY expiry_date, batch_number"
        );
        let rows = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("batches_for_medicine", e))?;
        rows.iter().map(decode_batch).collect()
    }

    #[instrument(skip(self), fields(medicine_id = %id), err)]
    async fn stock_on_hand(&self, id: MedicineId, today: NaiveDate) -> Result<i64, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(current_quantity), 0)::BIGINT AS total
            FROM batches
            WHERE medicine_id = $1 AND deleted_at IS NULL AND expiry_date >= $2
            "#,
        )
        .bind(id.as_uuid())
        .bind(today)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("stock_on_hand", e))?;
        row.try_get("total").map_err(decode_error)
    }

    async fn stocked_batches_expiring_between(
        &self,
        from: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<Batch>, StoreError> {
        let sql = format!(
            "SELECT {BATCH_COLUMNS} FROM batches \
             WHERE deleted_at IS NULL AND current_quantity > 0 \
               AND expiry_date BETWEEN $1 AND $2 \
             ORDER BY expiry_date, batch_number"
        );
        let rows = sqlx::query(&sql)
            .bind(from)
            .bind(until)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("stocked_batches_expiring_between", e))?;

        let mut batches = Vec::with_capacity(rows.len());
        for row in rows {
            match decode_batch(&row) {
                Ok(b) => batches.push(b),
                Err(e) => warn!(error = %e, "skipping undecodable batch row"),
            }
        }
        Ok(batches)
    }

    async fn ledger_entry(&self, id: LedgerEntryId) -> Result<Option<LedgerEntry>, StoreError> {
        let sql = format!("SELECT {LEDGER_COLUMNS} FROM stock_ledger WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.value())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("ledger_entry", e))?;
        row.map(|r| decode_entry(&r)).transpose()
    }

    #[instrument(skip(self), fields(batch_id = %id), err)]
    async fn batch_history(&self, id: BatchId) -> Result<Vec<LedgerEntry>, StoreError> {
        let sql = format!(
            "SELECT {LEDGER_COLUMNS} FROM stock_ledger WHERE batch_id = $1 ORDER BY transaction_date, id"
        );
        let rows = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("batch_history", e))?;
        rows.iter().map(decode_entry).collect()
    }

    #[instrument(skip(self), fields(medicine_id = %id), err)]
    async fn medicine_history(&self, id: MedicineId) -> Result<Vec<LedgerEntry>, StoreError> {
        let sql = format!(
            "SELECT {LEDGER_COLUMNS} FROM stock_ledger WHERE medicine_id = $1 ORDER BY transaction_date, id"
        );
        let rows = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("medicine_history", e))?;
        rows.iter().map(decode_entry).collect()
    }

    async fn summary(&self, id: MedicineId) -> Result<Option<MedicineStockSummary>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT medicine_id, total_quantity_in_stock, refreshed_at
            FROM medicine_stock_summaries
            WHERE medicine_id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("summary", e))?;

        row.map(|r| {
            SummaryRow::from_row(&r)
                .map(MedicineStockSummary::from)
                .map_err(decode_error)
        })
        .transpose()
    }

    #[instrument(skip(self, summary), fields(medicine_id = %summary.medicine_id), err)]
    async fn upsert_summary(&self, summary: &MedicineStockSummary) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO medicine_stock_summaries (medicine_id, total_quantity_in_stock, refreshed_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (medicine_id)
            DO UPDATE SET
                total_quantity_in_stock = EXCLUDED.total_quantity_in_stock,
                refreshed_at = EXCLUDED.refreshed_at
            "#,
        )
        .bind(summary.medicine_id.as_uuid())
        .bind(summary.total_quantity_in_stock)
        .bind(summary.refreshed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("upsert_summary", e))?;
        Ok(())
    }

    async fn medicines_without_summary(&self) -> Result<Vec<MedicineId>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT m.id
            FROM medicines m
            LEFT JOIN medicine_stock_summaries s ON s.medicine_id = m.id
            WHERE s.medicine_id IS NULL
            ORDER BY m.id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("medicines_without_summary", e))?;

        rows.iter()
            .map(|r| {
                r.try_get::<Uuid, _>("id")
                    .map(MedicineId::from_uuid)
                    .map_err(decode_error)
            })
            .collect()
    }

    async fn last_alert_emitted(
        &self,
        kind: AlertKind,
        subject_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let row = sqlx::query("SELECT emitted_at FROM alert_emissions WHERE kind = $1 AND subject_id = $2")
            .bind(kind.as_str())
            .bind(subject_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("last_alert_emitted", e))?;
        row.map(|r| r.try_get("emitted_at").map_err(decode_error)).transpose()
    }

    #[instrument(skip(self), err)]
    async fn record_alert_emitted(
        &self,
        kind: AlertKind,
        subject_id: Uuid,
        emitted_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO alert_emissions (kind, subject_id, emitted_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (kind, subject_id)
            DO UPDATE SET emitted_at = EXCLUDED.emitted_at
            "#,
        )
        .bind(kind.as_str())
        .bind(subject_id)
        .bind(db_timestamp(emitted_at))
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("record_alert_emitted", e))?;
        Ok(())
    }

    async fn prune_alert_emissions(&self, before: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM alert_emissions WHERE emitted_at < $1")
            .bind(before)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("prune_alert_emissions", e))?;
        Ok(result.rows_affected())
    }
}

/// TIMESTAMPTZ keeps microseconds.
fn db_timestamp(at: DateTime<Utc>) -> DateTime<Utc> {
    at.trunc_subsecs(6)
}

/// `lock_timeout` value for a wait bound; `0` would disable the timeout.
fn lock_timeout_setting(wait: Duration) -> String {
    format!("{}ms", wait.as_millis().max(1))
}

fn decode_error(err: sqlx::Error) -> StoreError {
    StoreError::Backend(format!("failed to decode row: {err}"))
}

fn decode_medicine(row: &PgRow) -> Result<Medicine, StoreError> {
    let id: Uuid = row.try_get("id").map_err(decode_error)?;
    let name: String = row.try_get("name").map_err(decode_error)?;
    let threshold: Option<i64> = row.try_get("low_stock_threshold").map_err(decode_error)?;
    Ok(Medicine {
        id: MedicineId::from_uuid(id),
        name,
        low_stock_threshold: threshold,
    })
}

fn decode_batch(row: &PgRow) -> Result<Batch, StoreError> {
    let r = BatchRow::from_row(row).map_err(decode_error)?;
    Batch::restore(
        BatchId::from_uuid(r.id),
        MedicineId::from_uuid(r.medicine_id),
        r.supplier_id.map(SupplierId::from_uuid),
        r.batch_number,
        r.quantity_received,
        r.current_quantity,
        r.manufacture_date,
        r.expiry_date,
        r.created_at,
    )
    .map_err(|e| StoreError::Backend(e.to_string()))
}

fn decode_entry(row: &PgRow) -> Result<LedgerEntry, StoreError> {
    let r = LedgerRow::from_row(row).map_err(decode_error)?;
    let transaction_type = r
        .transaction_type
        .parse()
        .map_err(|e: pharmastock_core::DomainError| StoreError::Backend(e.to_string()))?;
    Ok(LedgerEntry {
        id: LedgerEntryId::new(r.id),
        medicine_id: MedicineId::from_uuid(r.medicine_id),
        batch_id: r.batch_id.map(BatchId::from_uuid),
        transaction_type,
        quantity_change: r.quantity_change,
        quantity_after_transaction: r.quantity_after_transaction,
        transaction_date: r.transaction_date,
        user_id: r.user_id.map(UserId::from_uuid),
        notes: r.notes,
        related_transaction_id: r.related_transaction_id.map(LedgerEntryId::new),
    })
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                // lock_not_available, serialization_failure, deadlock_detected
                Some("55P03") | Some("40001") | Some("40P01") => StoreError::Contention(msg),
                // unique, foreign key, check
                Some("23505") | Some("23503") | Some("23514") => StoreError::Constraint(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Backend(format!("timed out acquiring a connection in {}", operation))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}

// SQLx row types

#[derive(Debug)]
struct BatchRow {
    id: Uuid,
    medicine_id: Uuid,
    supplier_id: Option<Uuid>,
    batch_number: String,
    quantity_received: i64,
    current_quantity: i64,
    manufacture_date: Option<NaiveDate>,
    expiry_date: NaiveDate,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for BatchRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(BatchRow {
            id: row.try_get("id")?,
            medicine_id: row.try_get("medicine_id")?,
            supplier_id: row.try_get("supplier_id")?,
            batch_number: row.try_get("batch_number")?,
            quantity_received: row.try_get("quantity_received")?,
            current_quantity: row.try_get("current_quantity")?,
            manufacture_date: row.try_get("manufacture_date")?,
            expiry_date: row.try_get("expiry_date")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[derive(Debug)]
struct LedgerRow {
    id: i64,
    medicine_id: Uuid,
    batch_id: Option<Uuid>,
    transaction_type: String,
    quantity_change: i64,
    quantity_after_transaction: i64,
    transaction_date: DateTime<Utc>,
    user_id: Option<Uuid>,
    notes: Option<String>,
    related_transaction_id: Option<i64>,
}

impl<'r> FromRow<'r, PgRow> for LedgerRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(LedgerRow {
            id: row.try_get("id")?,
            medicine_id: row.try_get("medicine_id")?,
            batch_id: row.try_get("batch_id")?,
            transaction_type: row.try_get("transaction_type")?,
            quantity_change: row.try_get("quantity_change")?,
            quantity_after_transaction: row.try_get("quantity_after_transaction")?,
            transaction_date: row.try_get("transaction_date")?,
            user_id: row.try_get("user_id")?,
            notes: row.try_get("notes")?,
            related_transaction_id: row.try_get("related_transaction_id")?,
        })
    }
}

#[derive(Debug)]
struct SummaryRow {
    medicine_id: Uuid,
    total_quantity_in_stock: i64,
    refreshed_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for SummaryRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(SummaryRow {
            medicine_id: row.try_get("medicine_id")?,
            total_quantity_in_stock: row.try_get("total_quantity_in_stock")?,
            refreshed_at: row.try_get("refreshed_at")?,
        })
    }
}

impl From<SummaryRow> for MedicineStockSummary {
    fn from(row: SummaryRow) -> Self {
        MedicineStockSummary {
            medicine_id: MedicineId::from_uuid(row.medicine_id),
            total_quantity_in_stock: row.total_quantity_in_stock,
            refreshed_at: row.refreshed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn ledger_dates_are_stored_at_microsecond_precision() {
        let at = Utc.with_ymd_and_hms(2026, 5, 4, 10, 30, 0).unwrap() + chrono::Duration::nanoseconds(123_456_789);
        let stored = db_timestamp(at);
        assert_eq!(stored.nanosecond(), 123_456_000);
        assert_eq!(db_timestamp(stored), stored);
    }

    #[test]
    fn lock_timeout_is_never_disabled() {
        assert_eq!(lock_timeout_setting(Duration::from_millis(3000)), "3000ms");
        assert_eq!(lock_timeout_setting(Duration::ZERO), "1ms");
        assert_eq!(lock_timeout_setting(Duration::from_micros(400)), "1ms");
    }
}
