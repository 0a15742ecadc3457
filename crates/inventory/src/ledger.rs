//! Ledger entries and replay.
//!
//! A ledger entry is an immutable fact. For one batch, entries ordered by
//! `(transaction_date, id)` must replay from zero to every recorded
//! `quantity_after_transaction` and, at the end, to the batch's
//! `current_quantity`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pharmastock_core::{BatchId, LedgerEntryId, MedicineId, UserId};

use crate::transaction_type::TransactionType;

/// An entry ready to be appended (not yet assigned an id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLedgerEntry {
    pub medicine_id: MedicineId,
    pub batch_id: Option<BatchId>,
    pub transaction_type: TransactionType,
    pub quantity_change: i64,
    pub quantity_after_transaction: i64,
    pub transaction_date: DateTime<Utc>,
    pub user_id: Option<UserId>,
    pub notes: Option<String>,
    pub related_transaction_id: Option<LedgerEntryId>,
}

impl NewLedgerEntry {
    /// Attach the id assigned by the store.
    pub fn into_entry(self, id: LedgerEntryId) -> LedgerEntry {
        LedgerEntry {
            id,
            medicine_id: self.medicine_id,
            batch_id: self.batch_id,
            transaction_type: self.transaction_type,
            quantity_change: self.quantity_change,
            quantity_after_transaction: self.quantity_after_transaction,
            transaction_date: self.transaction_date,
            user_id: self.user_id,
            notes: self.notes,
            related_transaction_id: self.related_transaction_id,
        }
    }
}

/// A stored stock movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: LedgerEntryId,
    pub medicine_id: MedicineId,
    pub batch_id: Option<BatchId>,
    pub transaction_type: TransactionType,
    pub quantity_change: i64,
    /// Batch balance right after this entry. A snapshot, never recomputed.
    pub quantity_after_transaction: i64,
    pub transaction_date: DateTime<Utc>,
    pub user_id: Option<UserId>,
    pub notes: Option<String>,
    pub related_transaction_id: Option<LedgerEntryId>,
}

impl LedgerEntry {
    /// Magnitude of the movement (always non-negative).
    pub fn magnitude(&self) -> i64 {
        self.quantity_change.abs()
    }

    pub fn history_key(&self) -> (DateTime<Utc>, LedgerEntryId) {
        (self.transaction_date, self.id)
    }
}

/// Sort entries into history order: transaction date, then id.
pub fn sort_history(entries: &mut [LedgerEntry]) {
    entries.sort_by_key(LedgerEntry::history_key);
}

/// One entry whose recorded balance disagrees with the replayed trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayMismatch {
    pub entry_id: LedgerEntryId,
    pub expected: i64,
    pub recorded: i64,
}

/// Result of replaying a batch's ledger against its stored balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub batch_id: BatchId,
    pub entries_replayed: usize,
    pub replayed_balance: i64,
    pub current_quantity: i64,
    pub mismatches: Vec<ReplayMismatch>,
    /// Set when the running total dipped below zero at some point.
    pub went_negative: bool,
}

impl Reconciliation {
    pub fn is_consistent(&self) -> bool {
        self.mismatches.is_empty()
            && !self.went_negative
            && self.replayed_balance == self.current_quantity
    }
}

/// Replay a batch's entries from zero and compare with the stored balance.
///
/// `entries` may be in any order; they are sorted into history order first.
pub fn replay_batch(batch_id: BatchId, current_quantity: i64, entries: &[LedgerEntry]) -> Reconciliation {
    let mut ordered: Vec<&LedgerEntry> = entries
        .iter()
        .filter(|e| e.batch_id == Some(batch_id))
        .collect();
    ordered.sort_by_key(|e| e.history_key());

    let mut running = 0i64;
    let mut went_negative = false;
    let mut mismatches = Vec::new();
    for entry in &ordered {
        running += entry.quantity_change;
        if running < 0 {
            went_negative = true;
        }
        if running != entry.quantity_after_transaction {
            mismatches.push(ReplayMismatch {
                entry_id: entry.id,
                expected: running,
                recorded: entry.quantity_after_transaction,
            });
        }
    }

    Reconciliation {
        batch_id,
        entries_replayed: ordered.len(),
        replayed_balance: running,
        current_quantity,
        mismatches,
        went_negative,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry(
        id: i64,
        batch_id: BatchId,
        t: TransactionType,
        change: i64,
        after: i64,
        at: DateTime<Utc>,
    ) -> LedgerEntry {
        NewLedgerEntry {
            medicine_id: MedicineId::new(),
            batch_id: Some(batch_id),
            transaction_type: t,
            quantity_change: change,
            quantity_after_transaction: after,
            transaction_date: at,
            user_id: None,
            notes: None,
            related_transaction_id: None,
        }
        .into_entry(LedgerEntryId::new(id))
    }

    #[test]
    fn consistent_trace_reconciles() {
        let batch_id = BatchId::new();
        let t0 = Utc::now();
        let entries = vec![
            entry(1, batch_id, TransactionType::InNewBatch, 100, 100, t0),
            entry(2, batch_id, TransactionType::OutDispense, -30, 70, t0 + Duration::minutes(1)),
            entry(3, batch_id, TransactionType::AdjustAdd, 5, 75, t0 + Duration::minutes(2)),
        ];
        let report = replay_batch(batch_id, 75, &entries);
        assert!(report.is_consistent());
        assert_eq!(report.entries_replayed, 3);
        assert_eq!(report.replayed_balance, 75);
    }

    #[test]
    fn timestamp_ties_are_broken_by_id() {
        let batch_id = BatchId::new();
        let t0 = Utc::now();
        // same timestamp, supplied out of order
        let entries = vec![
            entry(2, batch_id, TransactionType::OutDispense, -10, 40, t0),
            entry(1, batch_id, TransactionType::InNewBatch, 50, 50, t0),
        ];
        let report = replay_batch(batch_id, 40, &entries);
        assert!(report.is_consistent(), "{report:?}");

        let mut sorted = entries.clone();
        sort_history(&mut sorted);
        assert_eq!(sorted[0].id, LedgerEntryId::new(1));
    }

    #[test]
    fn drift_is_reported_per_entry() {
        let batch_id = BatchId::new();
        let t0 = Utc::now();
        let entries = vec![
            entry(1, batch_id, TransactionType::InNewBatch, 20, 20, t0),
            entry(2, batch_id, TransactionType::OutDispense, -5, 14, t0 + Duration::seconds(1)),
        ];
        let report = replay_batch(batch_id, 14, &entries);
        assert!(!report.is_consistent());
        assert_eq!(
            report.mismatches,
            vec![ReplayMismatch {
                entry_id: LedgerEntryId::new(2),
                expected: 15,
                recorded: 14,
            }]
        );
    }

    #[test]
    fn entries_of_other_batches_are_ignored() {
        let batch_id = BatchId::new();
        let other = BatchId::new();
        let t0 = Utc::now();
        let entries = vec![
            entry(1, batch_id, TransactionType::InNewBatch, 8, 8, t0),
            entry(2, other, TransactionType::InNewBatch, 99, 99, t0),
        ];
        let report = replay_batch(batch_id, 8, &entries);
        assert!(report.is_consistent());
        assert_eq!(report.entries_replayed, 1);
    }
}
