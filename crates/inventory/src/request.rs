//! Stock transaction requests and their type-level validation.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use pharmastock_core::{BatchId, DomainError, LedgerEntryId, MedicineId, SupplierId, UserId};

use crate::transaction_type::{BatchRule, TransactionType};

/// Metadata for a batch being received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBatchDetails {
    pub batch_number: String,
    pub supplier_id: Option<SupplierId>,
    pub manufacture_date: Option<NaiveDate>,
    pub expiry_date: Option<NaiveDate>,
}

impl NewBatchDetails {
    pub fn new(batch_number: impl Into<String>, expiry_date: NaiveDate) -> Self {
        Self {
            batch_number: batch_number.into(),
            supplier_id: None,
            manufacture_date: None,
            expiry_date: Some(expiry_date),
        }
    }

    pub fn with_supplier(mut self, supplier_id: SupplierId) -> Self {
        self.supplier_id = Some(supplier_id);
        self
    }

    pub fn with_manufacture_date(mut self, date: NaiveDate) -> Self {
        self.manufacture_date = Some(date);
        self
    }
}

/// Batch a transaction applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchTarget {
    Existing(BatchId),
    New(NewBatchDetails),
}

/// A requested stock movement.
///
/// `quantity` is a magnitude; the signed delta is derived from
/// `transaction_type`. For a new batch it is the received quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockTransactionRequest {
    pub transaction_type: TransactionType,
    pub medicine_id: MedicineId,
    pub target: BatchTarget,
    pub quantity: u32,
    pub actor: Option<UserId>,
    pub notes: Option<String>,
    pub related_transaction_id: Option<LedgerEntryId>,
    pub transaction_date: Option<DateTime<Utc>>,
}

impl StockTransactionRequest {
    pub fn new(
        transaction_type: TransactionType,
        medicine_id: MedicineId,
        target: BatchTarget,
        quantity: u32,
    ) -> Self {
        Self {
            transaction_type,
            medicine_id,
            target,
            quantity,
            actor: None,
            notes: None,
            related_transaction_id: None,
            transaction_date: None,
        }
    }

    /// Movement on an existing batch.
    pub fn on_batch(
        transaction_type: TransactionType,
        medicine_id: MedicineId,
        batch_id: BatchId,
        quantity: u32,
    ) -> Self {
        Self::new(transaction_type, medicine_id, BatchTarget::Existing(batch_id), quantity)
    }

    pub fn dispense(medicine_id: MedicineId, batch_id: BatchId, quantity: u32) -> Self {
        Self::on_batch(TransactionType::OutDispense, medicine_id, batch_id, quantity)
    }

    pub fn receive_new_batch(medicine_id: MedicineId, details: NewBatchDetails, quantity: u32) -> Self {
        Self::new(
            TransactionType::InNewBatch,
            medicine_id,
            BatchTarget::New(details),
            quantity,
        )
    }

    pub fn by(mut self, actor: UserId) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn related_to(mut self, entry_id: LedgerEntryId) -> Self {
        self.related_transaction_id = Some(entry_id);
        self
    }

    pub fn at(mut self, transaction_date: DateTime<Utc>) -> Self {
        self.transaction_date = Some(transaction_date);
        self
    }

    /// Check the request's shape against its transaction type.
    ///
    /// Reference checks (does the medicine/batch/supplier exist) need the
    /// store and happen in the engine.
    pub fn validate(&self) -> Result<(), DomainError> {
        let rule = self.transaction_type.batch_rule();
        match (&self.target, rule) {
            (BatchTarget::Existing(_), BatchRule::NewOnly) => {
                return Err(DomainError::validation(format!(
                    "{} must describe a new batch, not reference an existing one",
                    self.transaction_type
                )));
            }
            (BatchTarget::New(_), BatchRule::ExistingOnly) => {
                return Err(DomainError::validation(format!(
                    "{} requires an existing batch",
                    self.transaction_type
                )));
            }
            (BatchTarget::New(details), _) => self.validate_new_batch(details)?,
            (BatchTarget::Existing(_), _) => {}
        }

        if let Some(notes) = &self.notes {
            if notes.len() > MAX_NOTES_LEN {
                return Err(DomainError::validation(format!(
                    "notes exceed {MAX_NOTES_LEN} characters"
                )));
            }
        }
        Ok(())
    }

    fn validate_new_batch(&self, details: &NewBatchDetails) -> Result<(), DomainError> {
        if details.batch_number.trim().is_empty() {
            return Err(DomainError::validation("batch number cannot be empty"));
        }
        if self.transaction_type == TransactionType::InNewBatch && details.supplier_id.is_none() {
            return Err(DomainError::validation("a received batch requires a supplier"));
        }
        let Some(expiry) = details.expiry_date else {
            return Err(DomainError::validation("a new batch requires an expiry date"));
        };
        if let Some(manufactured) = details.manufacture_date {
            if expiry < manufactured {
                return Err(DomainError::validation(format!(
                    "expiry date {expiry} is before manufacture date {manufactured}"
                )));
            }
        }
        Ok(())
    }
}

const MAX_NOTES_LEN: usize = 2000;
