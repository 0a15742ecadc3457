//! Stock transaction engine.
//!
//! The only writer of batch balances. Every call runs as one unit of work:
//! validate, lock the batch, plan the movement, write the balance, append the
//! ledger entry, commit. Any failure drops the unit, so nothing is written.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument, warn};

use pharmastock_core::{BatchId, DomainError, EntityKind, LedgerEntryId, MedicineId, UserId};
use pharmastock_inventory::{
    Batch, BatchTarget, LedgerEntry, Medicine, Movement, NewLedgerEntry, Reconciliation,
    StockTransactionRequest, replay_batch,
};

use crate::store::{StockStore, StockUnit, StoreError};
use crate::summary::StockSummaryAggregator;

/// Tolerance for explicit transaction dates ahead of this host's clock.
pub const MAX_CLOCK_SKEW_SECS: i64 = 60;

/// Coarse failure classification for callers that map errors to responses.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InsufficientStock,
    InvalidTransaction,
    NotFound,
    Contention,
    Storage,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::InsufficientStock => "insufficient_stock",
            FailureKind::InvalidTransaction => "invalid_transaction",
            FailureKind::NotFound => "not_found",
            FailureKind::Contention => "contention",
            FailureKind::Storage => "storage",
        }
    }
}

impl core::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a stock transaction. State is unchanged whenever one is returned.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StockTransactionError {
    #[error("insufficient stock in batch {batch_id}: attempted {attempted}, available {available}")]
    InsufficientStock {
        batch_id: BatchId,
        attempted: i64,
        available: i64,
    },

    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: EntityKind, id: String },

    /// The batch was busy for longer than the configured wait. Safe to retry.
    #[error("contention: {0}")]
    Contention(String),

    #[error("storage failure: {0}")]
    Storage(String),
}

impl StockTransactionError {
    pub fn kind(&self) -> FailureKind {
        match self {
            StockTransactionError::InsufficientStock { .. } => FailureKind::InsufficientStock,
            StockTransactionError::InvalidTransaction(_) => FailureKind::InvalidTransaction,
            StockTransactionError::NotFound { .. } => FailureKind::NotFound,
            StockTransactionError::Contention(_) => FailureKind::Contention,
            StockTransactionError::Storage(_) => FailureKind::Storage,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, StockTransactionError::Contention(_))
    }

    fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidTransaction(msg.into())
    }

    fn not_found(entity: EntityKind, id: impl core::fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<DomainError> for StockTransactionError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InsufficientStock {
                batch_id,
                attempted,
                available,
            } => Self::InsufficientStock {
                batch_id,
                attempted,
                available,
            },
            DomainError::NotFound { entity, id } => Self::NotFound { entity, id },
            DomainError::Validation(msg)
            | DomainError::InvariantViolation(msg)
            | DomainError::InvalidId(msg) => Self::InvalidTransaction(msg),
        }
    }
}

impl From<StoreError> for StockTransactionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Contention(msg) => Self::Contention(msg),
            StoreError::Constraint(msg) | StoreError::Backend(msg) => Self::Storage(msg),
        }
    }
}

/// Result of a committed stock transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionOutcome {
    pub batch_id: BatchId,
    pub new_balance: i64,
    pub ledger_entry_id: LedgerEntryId,
    pub entry: LedgerEntry,
}

/// Applies stock movements and answers ledger queries.
///
/// The store is shared with the summary aggregator it refreshes after each
/// committed transaction.
#[derive(Debug, Clone)]
pub struct StockTransactionEngine<S> {
    store: S,
    summaries: StockSummaryAggregator<S>,
}

impl<S> StockTransactionEngine<S>
where
    S: StockStore + Clone,
{
    pub fn new(store: S) -> Self {
        Self {
            summaries: StockSummaryAggregator::new(store.clone()),
            store,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn summaries(&self) -> &StockSummaryAggregator<S> {
        &self.summaries
    }

    /// Apply one stock movement atomically.
    ///
    /// The signed delta comes from the transaction type; `request.quantity` is
    /// only a magnitude. On success the medicine's cached summary is refreshed;
    /// a failed refresh is logged and does not undo the committed movement.
    #[instrument(
        skip(self, request),
        fields(
            medicine_id = %request.medicine_id,
            transaction_type = %request.transaction_type,
            quantity = request.quantity
        )
    )]
    pub async fn apply_transaction(
        &self,
        request: StockTransactionRequest,
    ) -> Result<TransactionOutcome, StockTransactionError> {
        let medicine_id = request.medicine_id;
        let transaction_type = request.transaction_type;

        match self.execute(request).await {
            Ok(outcome) => {
                info!(
                    batch_id = %outcome.batch_id,
                    ledger_entry_id = %outcome.ledger_entry_id,
                    quantity_change = outcome.entry.quantity_change,
                    new_balance = outcome.new_balance,
                    "stock transaction committed"
                );
                if let Err(err) = self.summaries.rebuild_summary(medicine_id).await {
                    warn!(%medicine_id, error = %err, "stock summary refresh failed after commit");
                }
                Ok(outcome)
            }
            Err(err) => {
                warn!(
                    %transaction_type,
                    kind = %err.kind(),
                    error = %err,
                    "stock transaction rejected"
                );
                Err(err)
            }
        }
    }

    async fn execute(
        &self,
        request: StockTransactionRequest,
    ) -> Result<TransactionOutcome, StockTransactionError> {
        request.validate()?;
        let StockTransactionRequest {
            transaction_type,
            medicine_id,
            target,
            quantity,
            actor,
            notes,
            related_transaction_id,
            transaction_date,
        } = request;
        let mut unit = self.store.begin().await?;

        let medicine = unit
            .medicine(medicine_id)
            .await?
            .ok_or_else(|| StockTransactionError::not_found(EntityKind::Medicine, medicine_id))?;

        if let Some(related) = related_transaction_id {
            if !unit.ledger_entry_exists(related).await? {
                return Err(StockTransactionError::not_found(EntityKind::LedgerEntry, related));
            }
        }

        let (batch_id, movement, transaction_date) = match target {
            BatchTarget::Existing(batch_id) => {
                let batch = unit
                    .lock_batch(batch_id)
                    .await?
                    .ok_or_else(|| StockTransactionError::not_found(EntityKind::Batch, batch_id))?;
                ensure_same_medicine(&batch, &medicine)?;

                // Stamped under the lock so history order matches commit order.
                let latest = unit.latest_entry_date(batch_id).await?;
                let transaction_date = effective_date(transaction_date, latest, Utc::now())?;

                let movement = batch.plan_movement(transaction_type, quantity)?;
                unit.write_batch_quantity(batch_id, movement.balance_after).await?;
                (batch_id, movement, transaction_date)
            }
            BatchTarget::New(details) => {
                if let Some(supplier_id) = details.supplier_id {
                    if !unit.supplier_exists(supplier_id).await? {
                        return Err(StockTransactionError::not_found(EntityKind::Supplier, supplier_id));
                    }
                }
                let batch_number = details.batch_number.trim();
                if unit.batch_number_taken(medicine.id, batch_number).await? {
                    return Err(StockTransactionError::invalid(format!(
                        "batch number '{batch_number}' already exists for medicine {}",
                        medicine.id
                    )));
                }

                let transaction_date = effective_date(transaction_date, None, Utc::now())?;
                let batch = Batch::receive(BatchId::new(), medicine.id, &details, quantity, transaction_date)?;
                unit.insert_batch(&batch).await?;
                let movement = Movement {
                    quantity_change: batch.quantity_received(),
                    balance_after: batch.current_quantity(),
                };
                (batch.id_typed(), movement, transaction_date)
            }
        };

        let entry = unit
            .append_entry(NewLedgerEntry {
                medicine_id: medicine.id,
                batch_id: Some(batch_id),
                transaction_type,
                quantity_change: movement.quantity_change,
                quantity_after_transaction: movement.balance_after,
                transaction_date,
                user_id: actor,
                notes,
                related_transaction_id,
            })
            .await?;

        unit.commit().await?;

        Ok(TransactionOutcome {
            batch_id,
            new_balance: movement.balance_after,
            ledger_entry_id: entry.id,
            entry,
        })
    }

    /// Post the counter-movement of an earlier entry, linked back to it.
    ///
    /// Reversing an increase fails with `InsufficientStock` when the stock has
    /// since been consumed.
    #[instrument(skip(self, notes))]
    pub async fn reverse_entry(
        &self,
        entry_id: LedgerEntryId,
        actor: Option<UserId>,
        notes: Option<String>,
    ) -> Result<TransactionOutcome, StockTransactionError> {
        let original = self
            .store
            .ledger_entry(entry_id)
            .await?
            .ok_or_else(|| StockTransactionError::not_found(EntityKind::LedgerEntry, entry_id))?;

        let Some(batch_id) = original.batch_id else {
            return Err(StockTransactionError::invalid(format!(
                "entry {entry_id} is not tied to a batch and cannot be reversed"
            )));
        };
        let magnitude = u32::try_from(original.magnitude()).map_err(|_| {
            StockTransactionError::invalid(format!(
                "entry {entry_id} moved {} units, more than a single transaction can carry",
                original.magnitude()
            ))
        })?;

        let mut request = StockTransactionRequest::on_batch(
            original.transaction_type.counter_type(),
            original.medicine_id,
            batch_id,
            magnitude,
        )
        .related_to(original.id)
        .with_notes(notes.unwrap_or_else(|| format!("Reversal of entry {}", original.id)));
        if let Some(actor) = actor {
            request = request.by(actor);
        }

        self.apply_transaction(request).await
    }

    /// Replay a batch's ledger and compare it with the stored balance.
    #[instrument(skip(self))]
    pub async fn reconcile_batch(&self, batch_id: BatchId) -> Result<Reconciliation, StockTransactionError> {
        let batch = self
            .store
            .batch(batch_id)
            .await?
            .ok_or_else(|| StockTransactionError::not_found(EntityKind::Batch, batch_id))?;
        let history = self.store.batch_history(batch_id).await?;

        let report = replay_batch(batch_id, batch.current_quantity(), &history);
        if !report.is_consistent() {
            warn!(
                replayed_balance = report.replayed_balance,
                current_quantity = report.current_quantity,
                mismatches = report.mismatches.len(),
                went_negative = report.went_negative,
                "batch ledger does not reconcile"
            );
        }
        Ok(report)
    }

    /// Ledger entries of a batch, ordered by transaction date then id.
    pub async fn batch_history(&self, batch_id: BatchId) -> Result<Vec<LedgerEntry>, StockTransactionError> {
        if self.store.batch(batch_id).await?.is_none() {
            return Err(StockTransactionError::not_found(EntityKind::Batch, batch_id));
        }
        Ok(self.store.batch_history(batch_id).await?)
    }

    /// Ledger entries of every batch of a medicine, in history order.
    pub async fn medicine_history(
        &self,
        medicine_id: MedicineId,
    ) -> Result<Vec<LedgerEntry>, StockTransactionError> {
        self.require_medicine(medicine_id).await?;
        Ok(self.store.medicine_history(medicine_id).await?)
    }

    /// Live on-hand total (non-expired batches), bypassing the cached summary.
    pub async fn medicine_total(&self, medicine_id: MedicineId) -> Result<i64, StockTransactionError> {
        self.medicine_total_as_of(medicine_id, Utc::now()).await
    }

    pub async fn medicine_total_as_of(
        &self,
        medicine_id: MedicineId,
        now: DateTime<Utc>,
    ) -> Result<i64, StockTransactionError> {
        self.require_medicine(medicine_id).await?;
        let today: NaiveDate = now.date_naive();
        Ok(self.store.stock_on_hand(medicine_id, today).await?)
    }

    async fn require_medicine(&self, medicine_id: MedicineId) -> Result<Medicine, StockTransactionError> {
        self.store
            .medicine(medicine_id)
            .await?
            .ok_or_else(|| StockTransactionError::not_found(EntityKind::Medicine, medicine_id))
    }
}

/// Resolve the date a movement is recorded under.
///
/// Explicit dates may not lie in the future (beyond [`MAX_CLOCK_SKEW_SECS`])
/// nor before the batch's latest entry. Without one, the movement is stamped
/// `max(now, latest)` so a peer with a faster clock cannot block the batch.
fn effective_date(
    requested: Option<DateTime<Utc>>,
    latest: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, StockTransactionError> {
    let Some(at) = requested else {
        return Ok(latest.map_or(now, |latest| latest.max(now)));
    };

    if at > now + Duration::seconds(MAX_CLOCK_SKEW_SECS) {
        return Err(StockTransactionError::invalid(format!(
            "transaction date {at} is in the future"
        )));
    }
    if let Some(latest) = latest {
        if at < latest {
            return Err(StockTransactionError::invalid(format!(
                "transaction date {at} precedes the batch's latest entry ({latest})"
            )));
        }
    }
    Ok(at)
}

fn ensure_same_medicine(batch: &Batch, medicine: &Medicine) -> Result<(), StockTransactionError> {
    if batch.medicine_id() != medicine.id {
        return Err(StockTransactionError::invalid(format!(
            "batch {} belongs to medicine {}, not {}",
            batch.id_typed(),
            batch.medicine_id(),
            medicine.id
        )));
    }
    Ok(())
}
