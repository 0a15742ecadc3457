//! Tracing and logging setup shared by the stock binaries.

/// Initialize process-wide logging using `PHARMASTOCK_LOG_FORMAT` and `RUST_LOG`.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    tracing::init();
}

/// Subscriber configuration (filters, output format).
pub mod tracing;

pub use tracing::{LOG_FORMAT_VAR, LogFormat, UnknownLogFormat};
