use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use uuid::Uuid;

use pharmastock_core::{BatchId, LedgerEntryId, MedicineId, SupplierId};
use pharmastock_inventory::{Batch, LedgerEntry, Medicine, MedicineStockSummary, NewLedgerEntry};
use pharmastock_notifications::AlertKind;

/// Storage operation error.
///
/// These are **infrastructure errors** (locking, constraints, connectivity) as
/// opposed to domain errors (validation, stock rules). The transaction engine
/// translates them into its own taxonomy; they never reach callers raw.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A row lock could not be acquired within the configured bound. Retryable.
    #[error("lock contention: {0}")]
    Contention(String),

    /// A unique/foreign-key/check constraint rejected a write.
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// Connectivity, decoding, poisoned locks and anything else unexpected.
    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// One atomic unit of work against the stock tables.
///
/// Everything written through a unit becomes visible together on
/// [`StockUnit::commit`]. Dropping a unit without committing discards all of
/// its writes and releases its locks, which is also what happens when the
/// caller's future is cancelled mid-transaction.
///
/// This is the only place a batch's `current_quantity` can be written; the
/// transaction engine is the only code that drives a unit.
#[async_trait]
pub trait StockUnit: Send {
    async fn medicine(&mut self, id: MedicineId) -> Result<Option<Medicine>, StoreError>;

    async fn supplier_exists(&mut self, id: SupplierId) -> Result<bool, StoreError>;

    async fn ledger_entry_exists(&mut self, id: LedgerEntryId) -> Result<bool, StoreError>;

    /// Load a batch and hold an exclusive lock on it until commit/drop.
    ///
    /// Waits at most the store's lock bound, then fails with
    /// [`StoreError::Contention`]. Soft-deleted batches are reported as absent.
    async fn lock_batch(&mut self, id: BatchId) -> Result<Option<Batch>, StoreError>;

    /// Timestamp of the batch's most recent ledger entry.
    async fn latest_entry_date(&mut self, id: BatchId) -> Result<Option<DateTime<Utc>>, StoreError>;

    async fn batch_number_taken(
        &mut self,
        medicine_id: MedicineId,
        batch_number: &str,
    ) -> Result<bool, StoreError>;

    async fn insert_batch(&mut self, batch: &Batch) -> Result<(), StoreError>;

    /// Write the new balance of a batch locked (or inserted) by this unit.
    async fn write_batch_quantity(&mut self, id: BatchId, current_quantity: i64) -> Result<(), StoreError>;

    /// Append a ledger entry; the store assigns its id.
    async fn append_entry(&mut self, entry: NewLedgerEntry) -> Result<LedgerEntry, StoreError>;

    async fn commit(self) -> Result<(), StoreError>
    where
        Self: Sized;
}

/// Stock persistence boundary: read side + unit-of-work factory.
///
/// ## Implementation Requirements
///
/// Implementations must:
/// - never expose update/delete of ledger entries (append-only)
/// - return histories ordered by `(transaction_date, id)`
/// - exclude soft-deleted batches everywhere
/// - make writes of a unit visible atomically on commit, never partially
#[async_trait]
pub trait StockStore: Send + Sync {
    type Unit: StockUnit;

    async fn begin(&self) -> Result<Self::Unit, StoreError>;

    async fn medicine(&self, id: MedicineId) -> Result<Option<Medicine>, StoreError>;

    async fn medicines(&self) -> Result<Vec<Medicine>, StoreError>;

    async fn batch(&self, id: BatchId) -> Result<Option<Batch>, StoreError>;

    async fn batches_for_medicine(&self, id: MedicineId) -> Result<Vec<Batch>, StoreError>;

    /// Live on-hand total: sum of balances of batches not expired as of `today`.
    async fn stock_on_hand(&self, id: MedicineId, today: NaiveDate) -> Result<i64, StoreError>;

    /// Batches with stock left whose expiry falls in `[from, until]`.
    async fn stocked_batches_expiring_between(
        &self,
        from: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<Batch>, StoreError>;

    async fn ledger_entry(&self, id: LedgerEntryId) -> Result<Option<LedgerEntry>, StoreError>;

    async fn batch_history(&self, id: BatchId) -> Result<Vec<LedgerEntry>, StoreError>;

    async fn medicine_history(&self, id: MedicineId) -> Result<Vec<LedgerEntry>, StoreError>;

    async fn summary(&self, id: MedicineId) -> Result<Option<MedicineStockSummary>, StoreError>;

    async fn upsert_summary(&self, summary: &MedicineStockSummary) -> Result<(), StoreError>;

    async fn medicines_without_summary(&self) -> Result<Vec<MedicineId>, StoreError>;

    /// When an alert for `(kind, subject_id)` was last handed to the bus.
    async fn last_alert_emitted(
        &self,
        kind: AlertKind,
        subject_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>, StoreError>;

    async fn record_alert_emitted(
        &self,
        kind: AlertKind,
        subject_id: Uuid,
        emitted_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Drop emission records older than `before`; returns how many went.
    async fn prune_alert_emissions(&self, before: DateTime<Utc>) -> Result<u64, StoreError>;
}

#[async_trait]
impl<S> StockStore for Arc<S>
where
    S: StockStore,
{
    type Unit = S::Unit;

    async fn begin(&self) -> Result<Self::Unit, StoreError> {
        (**self).begin().await
    }

    async fn medicine(&self, id: MedicineId) -> Result<Option<Medicine>, StoreError> {
        (**self).medicine(id).await
    }

    async fn medicines(&self) -> Result<Vec<Medicine>, StoreError> {
        (**self).medicines().await
    }

    async fn batch(&self, id: BatchId) -> Result<Option<Batch>, StoreError> {
        (**self).batch(id).await
    }

    async fn batches_for_medicine(&self, id: MedicineId) -> Result<Vec<Batch>, StoreError> {
        (**self).batches_for_medicine(id).await
    }

    async fn stock_on_hand(&self, id: MedicineId, today: NaiveDate) -> Result<i64, StoreError> {
        (**self).stock_on_hand(id, today).await
    }

    async fn stocked_batches_expiring_between(
        &self,
        from: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<Batch>, StoreError> {
        (**self).stocked_batches_expiring_between(from, until).await
    }

    async fn ledger_entry(&self, id: LedgerEntryId) -> Result<Option<LedgerEntry>, StoreError> {
        (**self).ledger_entry(id).await
    }

    async fn batch_history(&self, id: BatchId) -> Result<Vec<LedgerEntry>, StoreError> {
        (**self).batch_history(id).await
    }

    async fn medicine_history(&self, id: MedicineId) -> Result<Vec<LedgerEntry>, StoreError> {
        (**self).medicine_history(id).await
    }

    async fn summary(&self, id: MedicineId) -> Result<Option<MedicineStockSummary>, StoreError> {
        (**self).summary(id).await
    }

    async fn upsert_summary(&self, summary: &MedicineStockSummary) -> Result<(), StoreError> {
        (**self).upsert_summary(summary).await
    }

    async fn medicines_without_summary(&self) -> Result<Vec<MedicineId>, StoreError> {
        (**self).medicines_without_summary().await
    }

    async fn last_alert_emitted(
        &self,
        kind: AlertKind,
        subject_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        (**self).last_alert_emitted(kind, subject_id).await
    }

    async fn record_alert_emitted(
        &self,
        kind: AlertKind,
        subject_id: Uuid,
        emitted_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        (**self).record_alert_emitted(kind, subject_id, emitted_at).await
    }

    async fn prune_alert_emissions(&self, before: DateTime<Utc>) -> Result<u64, StoreError> {
        (**self).prune_alert_emissions(before).await
    }
}
