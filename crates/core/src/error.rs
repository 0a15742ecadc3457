//! Domain error model.

use thiserror::Error;

use crate::id::BatchId;

/// Kind of record a lookup referred to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Medicine,
    Batch,
    Supplier,
    LedgerEntry,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Medicine => "medicine",
            EntityKind::Batch => "batch",
            EntityKind::Supplier => "supplier",
            EntityKind::LedgerEntry => "ledger entry",
        }
    }
}

impl core::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// stock rules, missing references). Infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input for a transaction type).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A decrease would drive a batch below zero.
    #[error("insufficient stock in batch {batch_id}: attempted {attempted}, available {available}")]
    InsufficientStock {
        batch_id: BatchId,
        attempted: i64,
        available: i64,
    },

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A referenced record does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: EntityKind, id: String },
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found(entity: EntityKind, id: impl core::fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn insufficient_stock(batch_id: BatchId, attempted: i64, available: i64) -> Self {
        Self::InsufficientStock {
            batch_id,
            attempted,
            available,
        }
    }
}
