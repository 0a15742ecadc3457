//! Closed registry of stock-movement kinds.
//!
//! Every property of a transaction type (sign, label, storage code, which batch
//! it may target, how it is countered) is an exhaustive `match`, so adding a
//! variant fails to compile until each of them is decided.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use pharmastock_core::DomainError;

/// Reason a batch quantity changed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    InNewBatch,
    OutDispense,
    AdjustAdd,
    AdjustSub,
    DisposalExpired,
    DisposalDamaged,
    ReturnSupplier,
    InitialStock,
}

/// Fixed sign classification of a transaction type.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Increase,
    Decrease,
}

/// Which batches a transaction type may be applied to.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BatchRule {
    /// Always creates a new batch.
    NewOnly,
    /// Creates a new batch or tops up an existing one.
    NewOrExisting,
    /// Moves stock on an existing batch.
    ExistingOnly,
}

impl TransactionType {
    pub const ALL: [TransactionType; 8] = [
        TransactionType::InNewBatch,
        TransactionType::OutDispense,
        TransactionType::AdjustAdd,
        TransactionType::AdjustSub,
        TransactionType::DisposalExpired,
        TransactionType::DisposalDamaged,
        TransactionType::ReturnSupplier,
        TransactionType::InitialStock,
    ];

    pub fn direction(self) -> Direction {
        match self {
            TransactionType::InNewBatch => Direction::Increase,
            TransactionType::AdjustAdd => Direction::Increase,
            TransactionType::InitialStock => Direction::Increase,
            TransactionType::OutDispense => Direction::Decrease,
            TransactionType::AdjustSub => Direction::Decrease,
            TransactionType::DisposalExpired => Direction::Decrease,
            TransactionType::DisposalDamaged => Direction::Decrease,
            TransactionType::ReturnSupplier => Direction::Decrease,
        }
    }

    pub fn is_increase(self) -> bool {
        self.direction() == Direction::Increase
    }

    pub fn is_decrease(self) -> bool {
        self.direction() == Direction::Decrease
    }

    /// Signed delta for a magnitude. The sign comes from the type alone.
    pub fn signed_delta(self, magnitude: u32) -> i64 {
        let magnitude = i64::from(magnitude);
        match self.direction() {
            Direction::Increase => magnitude,
            Direction::Decrease => -magnitude,
        }
    }

    pub fn batch_rule(self) -> BatchRule {
        match self {
            TransactionType::InNewBatch => BatchRule::NewOnly,
            TransactionType::InitialStock => BatchRule::NewOrExisting,
            TransactionType::OutDispense
            | TransactionType::AdjustAdd
            | TransactionType::AdjustSub
            | TransactionType::DisposalExpired
            | TransactionType::DisposalDamaged
            | TransactionType::ReturnSupplier => BatchRule::ExistingOnly,
        }
    }

    /// Type used to post a correcting entry against one of this type.
    pub fn counter_type(self) -> TransactionType {
        match self.direction() {
            Direction::Increase => TransactionType::AdjustSub,
            Direction::Decrease => TransactionType::AdjustAdd,
        }
    }

    /// Stable storage/wire code.
    pub fn code(self) -> &'static str {
        match self {
            TransactionType::InNewBatch => "IN_NEW_BATCH",
            TransactionType::OutDispense => "OUT_DISPENSE",
            TransactionType::AdjustAdd => "ADJUST_ADD",
            TransactionType::AdjustSub => "ADJUST_SUB",
            TransactionType::DisposalExpired => "DISPOSAL_EXPIRED",
            TransactionType::DisposalDamaged => "DISPOSAL_DAMAGED",
            TransactionType::ReturnSupplier => "RETURN_SUPPLIER",
            TransactionType::InitialStock => "INITIAL_STOCK",
        }
    }

    /// Human-readable label for screens and alert messages.
    pub fn label(self) -> &'static str {
        match self {
            TransactionType::InNewBatch => "New batch received",
            TransactionType::OutDispense => "Dispensed",
            TransactionType::AdjustAdd => "Adjustment (add)",
            TransactionType::AdjustSub => "Adjustment (subtract)",
            TransactionType::DisposalExpired => "Disposed (expired)",
            TransactionType::DisposalDamaged => "Disposed (damaged)",
            TransactionType::ReturnSupplier => "Returned to supplier",
            TransactionType::InitialStock => "Initial stock",
        }
    }
}

impl core::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for TransactionType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TransactionType::ALL
            .into_iter()
            .find(|t| t.code() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown transaction type '{s}'")))
    }
}
