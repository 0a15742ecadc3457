//! Stock persistence boundary.
//!
//! Batches, the append-only stock ledger and the derived per-medicine summary,
//! behind one trait pair so the transaction engine runs unchanged against the
//! in-memory store (tests/dev) and Postgres.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::{InMemoryStockStore, InMemoryUnit};
pub use postgres::{PostgresStockStore, PostgresUnit};
pub use r#trait::{StockStore, StockUnit, StoreError};
