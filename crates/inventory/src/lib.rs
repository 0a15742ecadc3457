//! Stock domain module.
//!
//! Business rules for batches, transaction types and the stock ledger,
//! implemented as deterministic domain logic (no IO, no storage).

pub mod batch;
pub mod ledger;
pub mod medicine;
pub mod request;
pub mod transaction_type;

pub use batch::{Batch, Movement};
pub use ledger::{LedgerEntry, NewLedgerEntry, Reconciliation, ReplayMismatch, replay_batch, sort_history};
pub use medicine::{Medicine, MedicineStockSummary, Supplier};
pub use request::{BatchTarget, NewBatchDetails, StockTransactionRequest};
pub use transaction_type::{BatchRule, Direction, TransactionType};
