//! Per-medicine stock summary maintenance.
//!
//! The summary row is a cache over batch balances. Rebuilding recomputes it
//! from scratch, so running a rebuild any number of times is safe.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use pharmastock_core::MedicineId;
use pharmastock_inventory::MedicineStockSummary;

use crate::store::{StockStore, StoreError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SummaryError {
    #[error("medicine {0} not found")]
    NotFound(MedicineId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of a backfill run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RebuildReport {
    pub rebuilt: Vec<MedicineId>,
    pub failed: Vec<(MedicineId, String)>,
}

#[derive(Debug, Clone)]
pub struct StockSummaryAggregator<S> {
    store: S,
}

impl<S> StockSummaryAggregator<S>
where
    S: StockStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Recompute and upsert one medicine's on-hand total.
    pub async fn rebuild_summary(&self, medicine_id: MedicineId) -> Result<MedicineStockSummary, SummaryError> {
        self.rebuild_summary_as_of(medicine_id, Utc::now()).await
    }

    /// Same as [`Self::rebuild_summary`] with an explicit clock; batches
    /// expiring on `now`'s date still count.
    #[instrument(skip(self), fields(medicine_id = %medicine_id), err)]
    pub async fn rebuild_summary_as_of(
        &self,
        medicine_id: MedicineId,
        now: DateTime<Utc>,
    ) -> Result<MedicineStockSummary, SummaryError> {
        if self.store.medicine(medicine_id).await?.is_none() {
            return Err(SummaryError::NotFound(medicine_id));
        }

        let total = self.store.stock_on_hand(medicine_id, now.date_naive()).await?;
        let summary = MedicineStockSummary {
            medicine_id,
            total_quantity_in_stock: total,
            refreshed_at: now,
        };
        self.store.upsert_summary(&summary).await?;

        debug!(total_quantity_in_stock = total, "stock summary rebuilt");
        Ok(summary)
    }

    /// Build a summary for every medicine that has none.
    ///
    /// A medicine that fails is logged and reported; the rest still run.
    pub async fn rebuild_missing_summaries(&self) -> Result<RebuildReport, SummaryError> {
        let missing = self.store.medicines_without_summary().await?;
        let mut report = RebuildReport::default();

        for medicine_id in missing {
            match self.rebuild_summary(medicine_id).await {
                Ok(_) => report.rebuilt.push(medicine_id),
                Err(err) => {
                    warn!(%medicine_id, error = %err, "failed to rebuild stock summary");
                    report.failed.push((medicine_id, err.to_string()));
                }
            }
        }

        info!(
            rebuilt = report.rebuilt.len(),
            failed = report.failed.len(),
            "missing stock summaries backfilled"
        );
        Ok(report)
    }
}
