//! Inventory alert scanner.
//!
//! Two independent scans over live batch balances (never the cached summary):
//! medicines below their low-stock threshold, and stocked batches nearing
//! expiry. [`InventoryAlertScanner::sweep`] turns findings into
//! [`AlertRequest`]s for the notification dispatcher. Suppression state lives
//! in the store, so separate sweep runs see each other's emissions.

use chrono::{DateTime, Days, Duration, NaiveDate, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use pharmastock_core::{BatchId, MedicineId, UserId};
use pharmastock_notifications::{AlertBus, AlertKind, AlertRequest};

use crate::store::{StockStore, StoreError};

/// Scanner tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertScannerConfig {
    /// Threshold for medicines without their own.
    pub default_low_stock_threshold: i64,
    pub expiry_warning_days: u32,
    /// Minimum gap between two alerts for the same subject, tracked through the
    /// store. `None` re-emits on every sweep.
    pub suppression_window: Option<Duration>,
}

impl Default for AlertScannerConfig {
    fn default() -> Self {
        Self {
            default_low_stock_threshold: 10,
            expiry_warning_days: 30,
            suppression_window: None,
        }
    }
}

impl AlertScannerConfig {
    pub fn with_default_low_stock_threshold(mut self, threshold: i64) -> Self {
        self.default_low_stock_threshold = threshold;
        self
    }

    pub fn with_expiry_warning_days(mut self, days: u32) -> Self {
        self.expiry_warning_days = days;
        self
    }

    pub fn with_suppression_window(mut self, window: Duration) -> Self {
        self.suppression_window = Some(window);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LowStockFinding {
    pub medicine_id: MedicineId,
    pub medicine_name: String,
    pub current_total: i64,
    pub threshold: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpiringBatchFinding {
    pub batch_id: BatchId,
    pub medicine_id: MedicineId,
    pub batch_number: String,
    pub expiry_date: NaiveDate,
    pub current_quantity: i64,
    pub days_until_expiry: i64,
}

/// Counters for one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub low_stock: usize,
    pub expiring: usize,
    pub published: usize,
    pub suppressed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct InventoryAlertScanner<S> {
    store: S,
    config: AlertScannerConfig,
}

impl<S> InventoryAlertScanner<S>
where
    S: StockStore,
{
    pub fn new(store: S, config: AlertScannerConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &AlertScannerConfig {
        &self.config
    }

    pub async fn scan_low_stock(&self) -> Result<Vec<LowStockFinding>, StoreError> {
        self.scan_low_stock_as_of(Utc::now().date_naive()).await
    }

    /// One finding per medicine whose on-hand total is strictly below its threshold.
    ///
    /// Medicines with an unusable threshold or whose total cannot be read are
    /// logged and skipped.
    pub async fn scan_low_stock_as_of(&self, today: NaiveDate) -> Result<Vec<LowStockFinding>, StoreError> {
        let medicines = self.store.medicines().await?;
        let mut findings = Vec::new();

        for medicine in medicines {
            let threshold = medicine.effective_threshold(self.config.default_low_stock_threshold);
            if threshold < 0 {
                warn!(medicine_id = %medicine.id, threshold, "skipping medicine with negative low-stock threshold");
                continue;
            }

            let current_total = match self.store.stock_on_hand(medicine.id, today).await {
                Ok(total) => total,
                Err(err) => {
                    warn!(medicine_id = %medicine.id, error = %err, "skipping medicine: stock total unavailable");
                    continue;
                }
            };

            if current_total < threshold {
                findings.push(LowStockFinding {
                    medicine_id: medicine.id,
                    medicine_name: medicine.name,
                    current_total,
                    threshold,
                });
            }
        }

        Ok(findings)
    }

    pub async fn scan_expiring_soon(&self, window_days: u32) -> Result<Vec<ExpiringBatchFinding>, StoreError> {
        self.scan_expiring_soon_as_of(Utc::now().date_naive(), window_days).await
    }

    /// Stocked batches with `today <= expiry_date <= today + window_days`.
    pub async fn scan_expiring_soon_as_of(
        &self,
        today: NaiveDate,
        window_days: u32,
    ) -> Result<Vec<ExpiringBatchFinding>, StoreError> {
        let until = today
            .checked_add_days(Days::new(u64::from(window_days)))
            .unwrap_or(NaiveDate::MAX);
        let batches = self.store.stocked_batches_expiring_between(today, until).await?;

        Ok(batches
            .into_iter()
            .filter(|b| b.expires_within(today, window_days))
            .map(|b| ExpiringBatchFinding {
                batch_id: b.id_typed(),
                medicine_id: b.medicine_id(),
                batch_number: b.batch_number().to_string(),
                expiry_date: b.expiry_date(),
                current_quantity: b.current_quantity(),
                days_until_expiry: (b.expiry_date() - today).num_days(),
            })
            .collect())
    }

    /// Run both scans and publish one alert per finding to `recipients`.
    ///
    /// Scan failures abort the sweep; a failed publish is logged, counted and
    /// skipped.
    #[instrument(skip(self, recipients, bus), fields(recipients = recipients.len()), err)]
    pub async fn sweep<B>(
        &self,
        recipients: &[UserId],
        bus: &B,
        now: DateTime<Utc>,
    ) -> Result<SweepReport, StoreError>
    where
        B: AlertBus + ?Sized,
    {
        let today = now.date_naive();
        let low_stock = self.scan_low_stock_as_of(today).await?;
        let expiring = self
            .scan_expiring_soon_as_of(today, self.config.expiry_warning_days)
            .await?;

        let mut report = SweepReport {
            low_stock: low_stock.len(),
            expiring: expiring.len(),
            ..SweepReport::default()
        };

        if let Some(window) = self.config.suppression_window {
            match self.store.prune_alert_emissions(now - window).await {
                Ok(pruned) if pruned > 0 => debug!(pruned, "expired alert emission records dropped"),
                Ok(_) => {}
                Err(err) => warn!(error = %err, "failed to prune alert emission records"),
            }
        }

        if recipients.is_empty() {
            warn!(
                low_stock = report.low_stock,
                expiring = report.expiring,
                "no alert recipients configured; findings not published"
            );
            return Ok(report);
        }

        let alerts = low_stock
            .iter()
            .map(|f| low_stock_alert(f, recipients, now))
            .chain(expiring.iter().map(|f| expiring_alert(f, recipients, now)));

        for alert in alerts {
            if self.is_suppressed(alert.kind, alert.subject_id, now).await {
                report.suppressed += 1;
                continue;
            }

            let (kind, subject_id) = (alert.kind, alert.subject_id);
            match bus.publish(alert) {
                Ok(()) => {
                    self.mark_emitted(kind, subject_id, now).await;
                    report.published += 1;
                }
                Err(err) => {
                    warn!(%kind, %subject_id, error = %err, "failed to publish alert");
                    report.failed += 1;
                }
            }
        }

        info!(
            low_stock = report.low_stock,
            expiring = report.expiring,
            published = report.published,
            suppressed = report.suppressed,
            failed = report.failed,
            "inventory alert sweep finished"
        );
        Ok(report)
    }

    /// An unreadable emission record counts as "not emitted": a duplicate
    /// alert beats a lost one.
    async fn is_suppressed(&self, kind: AlertKind, subject_id: Uuid, now: DateTime<Utc>) -> bool {
        let Some(window) = self.config.suppression_window else {
            return false;
        };
        match self.store.last_alert_emitted(kind, subject_id).await {
            Ok(last) => last.is_some_and(|last| now - last < window),
            Err(err) => {
                warn!(%kind, %subject_id, error = %err, "alert emission record unavailable");
                false
            }
        }
    }

    async fn mark_emitted(&self, kind: AlertKind, subject_id: Uuid, now: DateTime<Utc>) {
        if self.config.suppression_window.is_none() {
            return;
        }
        if let Err(err) = self.store.record_alert_emitted(kind, subject_id, now).await {
            warn!(%kind, %subject_id, error = %err, "failed to record alert emission");
        }
    }
}

fn low_stock_alert(finding: &LowStockFinding, recipients: &[UserId], now: DateTime<Utc>) -> AlertRequest {
    AlertRequest::new(
        AlertKind::LowStock,
        *finding.medicine_id.as_uuid(),
        recipients.to_vec(),
        format!(
            "Low stock: {} has {} units on hand (threshold {})",
            finding.medicine_name, finding.current_total, finding.threshold
        ),
        json!({
            "medicineId": finding.medicine_id,
            "medicineName": finding.medicine_name,
            "currentTotal": finding.current_total,
            "threshold": finding.threshold,
        }),
        now,
    )
}

fn expiring_alert(finding: &ExpiringBatchFinding, recipients: &[UserId], now: DateTime<Utc>) -> AlertRequest {
    AlertRequest::new(
        AlertKind::Expiring,
        *finding.batch_id.as_uuid(),
        recipients.to_vec(),
        format!(
            "Batch {} expires on {} ({} days) with {} units left",
            finding.batch_number, finding.expiry_date, finding.days_until_expiry, finding.current_quantity
        ),
        json!({
            "batchId": finding.batch_id,
            "medicineId": finding.medicine_id,
            "batchNumber": finding.batch_number,
            "expiryDate": finding.expiry_date,
            "currentQuantity": finding.current_quantity,
            "daysUntilExpiry": finding.days_until_expiry,
        }),
        now,
    )
}
