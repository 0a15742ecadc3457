//! Infrastructure layer: stock persistence, the transaction engine, summaries,
//! alert scanning and runtime configuration.

pub mod alerts;
pub mod config;
pub mod engine;
pub mod store;
pub mod summary;

mod integration_tests;

pub use alerts::{
    AlertScannerConfig, ExpiringBatchFinding, InventoryAlertScanner, LowStockFinding, SweepReport,
};
pub use config::{ConfigError, StockConfig};
pub use engine::{FailureKind, StockTransactionEngine, StockTransactionError, TransactionOutcome};
pub use store::{
    InMemoryStockStore, InMemoryUnit, PostgresStockStore, PostgresUnit, StockStore, StockUnit, StoreError,
};
pub use summary::{RebuildReport, StockSummaryAggregator, SummaryError};
