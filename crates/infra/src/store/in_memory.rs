use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::OwnedMutexGuard;
use tracing::debug;
use uuid::Uuid;

use pharmastock_core::{BatchId, LedgerEntryId, MedicineId, SupplierId};
use pharmastock_inventory::{
    Batch, LedgerEntry, Medicine, MedicineStockSummary, Movement, NewLedgerEntry, Supplier,
    sort_history,
};
use pharmastock_notifications::AlertKind;

use super::r#trait::{StockStore, StockUnit, StoreError};

const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(3);

#[derive(Debug, Default)]
struct State {
    medicines: HashMap<MedicineId, Medicine>,
    suppliers: HashMap<SupplierId, Supplier>,
    batches: HashMap<BatchId, Batch>,
    deleted: HashSet<BatchId>,
    ledger: Vec<LedgerEntry>,
    summaries: HashMap<MedicineId, MedicineStockSummary>,
    alert_emissions: HashMap<(AlertKind, Uuid), DateTime<Utc>>,
}

impl State {
    fn live_batch(&self, id: BatchId) -> Option<&Batch> {
        if self.deleted.contains(&id) {
            return None;
        }
        self.batches.get(&id)
    }

    fn live_batches(&self) -> impl Iterator<Item = &Batch> {
        self.batches
            .values()
            .filter(|b| !self.deleted.contains(&b.id_typed()))
    }

    fn number_taken(&self, medicine_id: MedicineId, batch_number: &str) -> bool {
        self.live_batches()
            .any(|b| b.medicine_id() == medicine_id && b.batch_number() == batch_number)
    }
}

#[derive(Debug)]
struct Shared {
    state: RwLock<State>,
    batch_locks: Mutex<HashMap<BatchId, Arc<tokio::sync::Mutex<()>>>>,
    next_entry_id: AtomicI64,
    lock_wait: Duration,
}

impl Shared {
    fn read(&self) -> Result<RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Backend("stock state lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Backend("stock state lock poisoned".to_string()))
    }

    fn batch_lock(&self, id: BatchId) -> Result<Arc<tokio::sync::Mutex<()>>, StoreError> {
        let mut locks = self
            .batch_locks
            .lock()
            .map_err(|_| StoreError::Backend("batch lock table poisoned".to_string()))?;
        Ok(locks.entry(id).or_default().clone())
    }

    /// Forget lock entries nobody holds or waits on any more.
    fn prune_batch_locks(&self, ids: impl IntoIterator<Item = BatchId>) {
        let Ok(mut locks) = self.batch_locks.lock() else {
            return;
        };
        for id in ids {
            if locks.get(&id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
                locks.remove(&id);
            }
        }
    }
}

/// In-memory stock store.
///
/// Intended for tests/dev. Row locks are per-batch async mutexes taken with a
/// bounded wait; a unit's writes stay private until commit and are applied
/// under one state write lock.
#[derive(Debug, Clone)]
pub struct InMemoryStockStore {
    shared: Arc<Shared>,
}

impl Default for InMemoryStockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStockStore {
    pub fn new() -> Self {
        Self::with_lock_wait(DEFAULT_LOCK_WAIT)
    }

    pub fn with_lock_wait(lock_wait: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: RwLock::new(State::default()),
                batch_locks: Mutex::new(HashMap::new()),
                next_entry_id: AtomicI64::new(1),
                lock_wait,
            }),
        }
    }

    /// Register a medicine (reference data is managed outside the ledger).
    pub fn insert_medicine(&self, medicine: Medicine) -> Result<(), StoreError> {
        let mut state = self.shared.write()?;
        state.medicines.insert(medicine.id, medicine);
        Ok(())
    }

    pub fn insert_supplier(&self, supplier: Supplier) -> Result<(), StoreError> {
        let mut state = self.shared.write()?;
        state.suppliers.insert(supplier.id, supplier);
        Ok(())
    }

    /// Hide a batch from the engine and the scanners. Its ledger stays.
    pub fn soft_delete_batch(&self, id: BatchId) -> Result<bool, StoreError> {
        let mut state = self.shared.write()?;
        if !state.batches.contains_key(&id) {
            return Ok(false);
        }
        Ok(state.deleted.insert(id))
    }

    #[cfg(test)]
    pub(crate) fn tracked_batch_locks(&self) -> usize {
        self.shared.batch_locks.lock().map(|locks| locks.len()).unwrap_or_default()
    }

    /// Overwrite a stored balance behind the ledger's back, to exercise drift detection.
    #[cfg(test)]
    pub(crate) fn corrupt_batch_quantity(&self, id: BatchId, quantity: i64) -> Result<(), StoreError> {
        let mut state = self.shared.write()?;
        let batch = state
            .batches
            .remove(&id)
            .ok_or_else(|| StoreError::Backend(format!("batch {id} missing")))?;
        let movement = Movement {
            quantity_change: quantity - batch.current_quantity(),
            balance_after: quantity,
        };
        state.batches.insert(id, batch.with_balance(movement));
        Ok(())
    }
}

/// Unit of work over [`InMemoryStockStore`].
///
/// Holds the batch locks it acquired until commit or drop.
#[derive(Debug)]
pub struct InMemoryUnit {
    shared: Arc<Shared>,
    guards: Vec<OwnedMutexGuard<()>>,
    locked: Vec<BatchId>,
    /// Batches this unit locked or created, with any pending balance applied.
    staged: HashMap<BatchId, Batch>,
    inserted: Vec<BatchId>,
    dirty: HashSet<BatchId>,
    entries: Vec<LedgerEntry>,
}

impl InMemoryUnit {
    fn staged_number_taken(&self, medicine_id: MedicineId, batch_number: &str) -> bool {
        self.inserted.iter().filter_map(|id| self.staged.get(id)).any(|b| {
            b.medicine_id() == medicine_id && b.batch_number() == batch_number
        })
    }

    fn load_live_batch(&self, id: BatchId) -> Result<Option<Batch>, StoreError> {
        let state = self.shared.read()?;
        Ok(state.live_batch(id).cloned())
    }
}

#[async_trait]
impl StockUnit for InMemoryUnit {
    async fn medicine(&mut self, id: MedicineId) -> Result<Option<Medicine>, StoreError> {
        let state = self.shared.read()?;
        Ok(state.medicines.get(&id).cloned())
    }

    async fn supplier_exists(&mut self, id: SupplierId) -> Result<bool, StoreError> {
        let state = self.shared.read()?;
        Ok(state.suppliers.contains_key(&id))
    }

    async fn ledger_entry_exists(&mut self, id: LedgerEntryId) -> Result<bool, StoreError> {
        if self.entries.iter().any(|e| e.id == id) {
            return Ok(true);
        }
        let state = self.shared.read()?;
        Ok(state.ledger.iter().any(|e| e.id == id))
    }

    async fn lock_batch(&mut self, id: BatchId) -> Result<Option<Batch>, StoreError> {
        if let Some(batch) = self.staged.get(&id) {
            return Ok(Some(batch.clone()));
        }
        // Skip the lock for ids that do not exist at all.
        if self.load_live_batch(id)?.is_none() {
            return Ok(None);
        }

        let lock = self.shared.batch_lock(id)?;
        let wait = self.shared.lock_wait;
        let guard = tokio::time::timeout(wait, lock.lock_owned())
            .await
            .map_err(|_| {
                StoreError::Contention(format!(
                    "batch {id} still locked after {}ms",
                    wait.as_millis()
                ))
            })?;
        debug!(batch_id = %id, "batch lock acquired");
        self.guards.push(guard);
        self.locked.push(id);

        // Re-read under the lock: the previous holder may have committed.
        let Some(batch) = self.load_live_batch(id)? else {
            return Ok(None);
        };
        self.staged.insert(id, batch.clone());
        Ok(Some(batch))
    }

    async fn latest_entry_date(&mut self, id: BatchId) -> Result<Option<DateTime<Utc>>, StoreError> {
        let state = self.shared.read()?;
        Ok(state
            .ledger
            .iter()
            .chain(self.entries.iter())
            .filter(|e| e.batch_id == Some(id))
            .map(|e| e.transaction_date)
            .max())
    }

    async fn batch_number_taken(
        &mut self,
        medicine_id: MedicineId,
        batch_number: &str,
    ) -> Result<bool, StoreError> {
        if self.staged_number_taken(medicine_id, batch_number) {
            return Ok(true);
        }
        let state = self.shared.read()?;
        Ok(state.number_taken(medicine_id, batch_number))
    }

    async fn insert_batch(&mut self, batch: &Batch) -> Result<(), StoreError> {
        let id = batch.id_typed();
        if self.staged.contains_key(&id) || self.shared.read()?.batches.contains_key(&id) {
            return Err(StoreError::Constraint(format!("batch {id} already exists")));
        }
        if self.staged_number_taken(batch.medicine_id(), batch.batch_number()) {
            return Err(StoreError::Constraint(format!(
                "batch number '{}' already used for medicine {}",
                batch.batch_number(),
                batch.medicine_id()
            )));
        }
        self.staged.insert(id, batch.clone());
        self.inserted.push(id);
        Ok(())
    }

    async fn write_batch_quantity(&mut self, id: BatchId, current_quantity: i64) -> Result<(), StoreError> {
        if current_quantity < 0 {
            return Err(StoreError::Constraint(format!(
                "batch {id} current_quantity {current_quantity} violates non-negative check"
            )));
        }
        let batch = self
            .staged
            .remove(&id)
            .ok_or_else(|| StoreError::Backend(format!("batch {id} is not locked by this unit")))?;
        let movement = Movement {
            quantity_change: current_quantity - batch.current_quantity(),
            balance_after: current_quantity,
        };
        self.staged.insert(id, batch.with_balance(movement));
        self.dirty.insert(id);
        Ok(())
    }

    async fn append_entry(&mut self, entry: NewLedgerEntry) -> Result<LedgerEntry, StoreError> {
        let id = self.shared.next_entry_id.fetch_add(1, Ordering::SeqCst);
        let stored = entry.into_entry(LedgerEntryId::new(id));
        self.entries.push(stored.clone());
        Ok(stored)
    }

    async fn commit(mut self) -> Result<(), StoreError> {
        {
            let mut state = self.shared.write()?;

            // Unique (medicine, batch number) is only final here: inserts do not lock.
            for id in &self.inserted {
                if let Some(batch) = self.staged.get(id) {
                    if state.number_taken(batch.medicine_id(), batch.batch_number()) {
                        return Err(StoreError::Constraint(format!(
                            "batch number '{}' already used for medicine {}",
                            batch.batch_number(),
                            batch.medicine_id()
                        )));
                    }
                }
            }

            for id in self.inserted.iter().chain(self.dirty.iter()) {
                if let Some(batch) = self.staged.get(id) {
                    state.batches.insert(*id, batch.clone());
                }
            }
            state.ledger.append(&mut self.entries);
        }
        Ok(())
    }
}

impl Drop for InMemoryUnit {
    fn drop(&mut self) {
        self.guards.clear();
        self.shared.prune_batch_locks(self.locked.drain(..));
    }
}

#[async_trait]
impl StockStore for InMemoryStockStore {
    type Unit = InMemoryUnit;

    async fn begin(&self) -> Result<Self::Unit, StoreError> {
        Ok(InMemoryUnit {
            shared: self.shared.clone(),
            guards: Vec::new(),
            locked: Vec::new(),
            staged: HashMap::new(),
            inserted: Vec::new(),
            dirty: HashSet::new(),
            entries: Vec::new(),
        })
    }

    async fn medicine(&self, id: MedicineId) -> Result<Option<Medicine>, StoreError> {
        let state = self.shared.read()?;
        Ok(state.medicines.get(&id).cloned())
    }

    async fn medicines(&self) -> Result<Vec<Medicine>, StoreError> {
        let state = self.shared.read()?;
        let mut medicines: Vec<Medicine> = state.medicines.values().cloned().collect();
        medicines.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(medicines)
    }

    async fn batch(&self, id: BatchId) -> Result<Option<Batch>, StoreError> {
        let state = self.shared.read()?;
        Ok(state.live_batch(id).cloned())
    }

    async fn batches_for_medicine(&self, id: MedicineId) -> Result<Vec<Batch>, StoreError> {
        let state = self.shared.read()?;
        let mut batches: Vec<Batch> = state
            .live_batches()
            .filter(|b| b.medicine_id() == id)
            .cloned()
            .collect();
        batches.sort_by(|a, b| {
            a.expiry_date()
                .cmp(&b.expiry_date())
                .then_with(|| a.batch_number().cmp(b.batch_number()))
        });
        Ok(batches)
    }

    async fn stock_on_hand(&self, id: MedicineId, today: NaiveDate) -> Result<i64, StoreError> {
        let state = self.shared.read()?;
        Ok(state
            .live_batches()
            .filter(|b| b.medicine_id() == id)
            .map(|b| b.usable_quantity(today))
            .sum())
    }

    async fn stocked_batches_expiring_between(
        &self,
        from: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<Batch>, StoreError> {
        let state = self.shared.read()?;
        let mut batches: Vec<Batch> = state
            .live_batches()
            .filter(|b| b.current_quantity() > 0 && b.expiry_date() >= from && b.expiry_date() <= until)
            .cloned()
            .collect();
        batches.sort_by(|a, b| {
            a.expiry_date()
                .cmp(&b.expiry_date())
                .then_with(|| a.batch_number().cmp(b.batch_number()))
        });
        Ok(batches)
    }

    async fn ledger_entry(&self, id: LedgerEntryId) -> Result<Option<LedgerEntry>, StoreError> {
        let state = self.shared.read()?;
        Ok(state.ledger.iter().find(|e| e.id == id).cloned())
    }

    async fn batch_history(&self, id: BatchId) -> Result<Vec<LedgerEntry>, StoreError> {
        let state = self.shared.read()?;
        let mut entries: Vec<LedgerEntry> = state
            .ledger
            .iter()
            .filter(|e| e.batch_id == Some(id))
            .cloned()
            .collect();
        sort_history(&mut entries);
        Ok(entries)
    }

    async fn medicine_history(&self, id: MedicineId) -> Result<Vec<LedgerEntry>, StoreError> {
        let state = self.shared.read()?;
        let mut entries: Vec<LedgerEntry> = state
            .ledger
            .iter()
            .filter(|e| e.medicine_id == id)
            .cloned()
            .collect();
        sort_history(&mut entries);
        Ok(entries)
    }

    async fn summary(&self, id: MedicineId) -> Result<Option<MedicineStockSummary>, StoreError> {
        let state = self.shared.read()?;
        Ok(state.summaries.get(&id).cloned())
    }

    async fn upsert_summary(&self, summary: &MedicineStockSummary) -> Result<(), StoreError> {
        let mut state = self.shared.write()?;
        state.summaries.insert(summary.medicine_id, summary.clone());
        Ok(())
    }

    async fn medicines_without_summary(&self) -> Result<Vec<MedicineId>, StoreError> {
        let state = self.shared.read()?;
        let mut missing: Vec<MedicineId> = state
            .medicines
            .keys()
            .filter(|id| !state.summaries.contains_key(id))
            .copied()
            .collect();
        missing.sort();
        Ok(missing)
    }

    async fn last_alert_emitted(
        &self,
        kind: AlertKind,
        subject_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let state = self.shared.read()?;
        Ok(state.alert_emissions.get(&(kind, subject_id)).copied())
    }

    async fn record_alert_emitted(
        &self,
        kind: AlertKind,
        subject_id: Uuid,
        emitted_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.shared.write()?;
        state.alert_emissions.insert((kind, subject_id), emitted_at);
        Ok(())
    }

    async fn prune_alert_emissions(&self, before: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut state = self.shared.write()?;
        let tracked = state.alert_emissions.len();
        state.alert_emissions.retain(|_, emitted_at| *emitted_at >= before);
        Ok((tracked - state.alert_emissions.len()) as u64)
    }
}
