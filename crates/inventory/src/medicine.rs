use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pharmastock_core::{MedicineId, SupplierId};

/// Medicine (product) as far as the stock ledger cares about it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Medicine {
    pub id: MedicineId,
    pub name: String,
    /// Per-medicine low-stock threshold; `None` falls back to the system default.
    pub low_stock_threshold: Option<i64>,
}

impl Medicine {
    pub fn new(id: MedicineId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            low_stock_threshold: None,
        }
    }

    pub fn with_low_stock_threshold(mut self, threshold: i64) -> Self {
        self.low_stock_threshold = Some(threshold);
        self
    }

    pub fn effective_threshold(&self, default_threshold: i64) -> i64 {
        self.low_stock_threshold.unwrap_or(default_threshold)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Supplier {
    pub id: SupplierId,
    pub name: String,
}

impl Supplier {
    pub fn new(id: SupplierId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Cached per-medicine total. Derived from batch balances; never authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicineStockSummary {
    pub medicine_id: MedicineId,
    pub total_quantity_in_stock: i64,
    pub refreshed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_falls_back_to_default() {
        let plain = Medicine::new(MedicineId::new(), "Amoxicillin 500mg");
        assert_eq!(plain.effective_threshold(10), 10);

        let tuned = plain.clone().with_low_stock_threshold(25);
        assert_eq!(tuned.effective_threshold(10), 25);
    }
}
