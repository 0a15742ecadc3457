use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use pharmastock_core::{BatchId, DomainError, MedicineId, SupplierId};

use crate::request::NewBatchDetails;
use crate::transaction_type::TransactionType;

/// A received lot of a medicine with its own expiry and remaining quantity.
///
/// Fields are read-only outside this module. `current_quantity` only changes
/// through a [`Movement`] that the transaction engine writes back together
/// with its ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    id: BatchId,
    medicine_id: MedicineId,
    supplier_id: Option<SupplierId>,
    batch_number: String,
    quantity_received: i64,
    current_quantity: i64,
    manufacture_date: Option<NaiveDate>,
    expiry_date: NaiveDate,
    created_at: DateTime<Utc>,
}

/// Outcome of planning a movement against a batch balance.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Movement {
    pub quantity_change: i64,
    pub balance_after: i64,
}

impl Batch {
    /// Create a freshly received batch holding `quantity` units.
    ///
    /// `details` must already have passed request validation.
    pub fn receive(
        id: BatchId,
        medicine_id: MedicineId,
        details: &NewBatchDetails,
        quantity: u32,
        received_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let expiry_date = details
            .expiry_date
            .ok_or_else(|| DomainError::validation("a new batch requires an expiry date"))?;
        let quantity = i64::from(quantity);
        Ok(Self {
            id,
            medicine_id,
            supplier_id: details.supplier_id,
            batch_number: details.batch_number.trim().to_string(),
            quantity_received: quantity,
            current_quantity: quantity,
            manufacture_date: details.manufacture_date,
            expiry_date,
            created_at: received_at,
        })
    }

    /// Rehydrate a batch from storage.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: BatchId,
        medicine_id: MedicineId,
        supplier_id: Option<SupplierId>,
        batch_number: String,
        quantity_received: i64,
        current_quantity: i64,
        manufacture_date: Option<NaiveDate>,
        expiry_date: NaiveDate,
        created_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if current_quantity < 0 {
            return Err(DomainError::invariant(format!(
                "batch {id} has negative current quantity {current_quantity}"
            )));
        }
        Ok(Self {
            id,
            medicine_id,
            supplier_id,
            batch_number,
            quantity_received,
            current_quantity,
            manufacture_date,
            expiry_date,
            created_at,
        })
    }

    pub fn id_typed(&self) -> BatchId {
        self.id
    }

    pub fn medicine_id(&self) -> MedicineId {
        self.medicine_id
    }

    pub fn supplier_id(&self) -> Option<SupplierId> {
        self.supplier_id
    }

    pub fn batch_number(&self) -> &str {
        &self.batch_number
    }

    pub fn quantity_received(&self) -> i64 {
        self.quantity_received
    }

    pub fn current_quantity(&self) -> i64 {
        self.current_quantity
    }

    pub fn manufacture_date(&self) -> Option<NaiveDate> {
        self.manufacture_date
    }

    pub fn expiry_date(&self) -> NaiveDate {
        self.expiry_date
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Expired batches are those whose expiry date is strictly before `today`.
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.expiry_date < today
    }

    /// Quantity that counts toward the medicine's on-hand total.
    pub fn usable_quantity(&self, today: NaiveDate) -> i64 {
        if self.is_expired(today) { 0 } else { self.current_quantity }
    }

    /// Holds stock and expires between `today` and `today + window_days`, inclusive.
    pub fn expires_within(&self, today: NaiveDate, window_days: u32) -> bool {
        if self.current_quantity <= 0 || self.is_expired(today) {
            return false;
        }
        match today.checked_add_days(chrono::Days::new(u64::from(window_days))) {
            Some(horizon) => self.expiry_date <= horizon,
            None => true,
        }
    }

    /// Compute the signed delta and resulting balance for a movement.
    ///
    /// Fails with `InsufficientStock` when a decrease exceeds the balance; the
    /// batch itself is never modified here.
    pub fn plan_movement(
        &self,
        transaction_type: TransactionType,
        magnitude: u32,
    ) -> Result<Movement, DomainError> {
        let quantity_change = transaction_type.signed_delta(magnitude);
        let balance_after = self.current_quantity + quantity_change;
        if balance_after < 0 {
            return Err(DomainError::insufficient_stock(
                self.id,
                i64::from(magnitude),
                self.current_quantity,
            ));
        }
        Ok(Movement {
            quantity_change,
            balance_after,
        })
    }

    /// Apply a planned movement to an in-memory copy (used by stores after commit).
    pub fn with_balance(mut self, movement: Movement) -> Self {
        self.current_quantity = movement.balance_after;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn batch_with(quantity: u32, expiry: NaiveDate) -> Batch {
        let details = NewBatchDetails::new("LOT-7", expiry).with_supplier(SupplierId::new());
        Batch::receive(BatchId::new(), MedicineId::new(), &details, quantity, Utc::now()).unwrap()
    }

    #[test]
    fn received_batch_starts_full() {
        let batch = batch_with(50, date(2027, 1, 1));
        assert_eq!(batch.quantity_received(), 50);
        assert_eq!(batch.current_quantity(), 50);
        assert_eq!(batch.batch_number(), "LOT-7");
    }

    #[test]
    fn dispense_within_balance_is_planned() {
        let batch = batch_with(100, date(2027, 1, 1));
        let movement = batch.plan_movement(TransactionType::OutDispense, 30).unwrap();
        assert_eq!(movement.quantity_change, -30);
        assert_eq!(movement.balance_after, 70);
        // planning does not touch the batch
        assert_eq!(batch.current_quantity(), 100);
    }

    #[test]
    fn overdraw_reports_attempted_and_available() {
        let batch = batch_with(10, date(2027, 1, 1));
        let err = batch.plan_movement(TransactionType::OutDispense, 15).unwrap_err();
        assert_eq!(
            err,
            DomainError::InsufficientStock {
                batch_id: batch.id_typed(),
                attempted: 15,
                available: 10,
            }
        );
    }

    #[test]
    fn draining_to_exactly_zero_is_allowed() {
        let batch = batch_with(10, date(2027, 1, 1));
        let movement = batch.plan_movement(TransactionType::DisposalDamaged, 10).unwrap();
        assert_eq!(movement.balance_after, 0);
    }

    #[test]
    fn expiry_window_is_inclusive_and_skips_empty_batches() {
        let today = date(2026, 3, 1);
        let soon = batch_with(4, date(2026, 3, 11));
        assert!(soon.expires_within(today, 30));
        assert!(soon.expires_within(today, 10));
        assert!(!soon.expires_within(today, 9));

        let empty = batch_with(0, date(2026, 3, 11));
        assert!(!empty.expires_within(today, 30));

        let expired = batch_with(4, date(2026, 2, 28));
        assert!(!expired.expires_within(today, 30));
        assert!(expired.is_expired(today));
        assert_eq!(expired.usable_quantity(today), 0);

        let today_expiry = batch_with(4, today);
        assert!(!today_expiry.is_expired(today));
        assert!(today_expiry.expires_within(today, 0));
    }

    #[test]
    fn restore_refuses_negative_balances() {
        let err = Batch::restore(
            BatchId::new(),
            MedicineId::new(),
            None,
            "B".to_string(),
            5,
            -1,
            None,
            date(2027, 1, 1),
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: no sequence of planned movements drives a batch negative,
        /// and every accepted movement lands exactly on balance + signed delta.
        #[test]
        fn planned_movements_never_go_negative(
            initial in 0u32..500,
            moves in prop::collection::vec((0usize..8, 0u32..200), 1..40)
        ) {
            let mut batch = batch_with(initial, date(2030, 1, 1));
            for (type_idx, magnitude) in moves {
                let t = TransactionType::ALL[type_idx];
                let before = batch.current_quantity();
                match batch.plan_movement(t, magnitude) {
                    Ok(m) => {
                        prop_assert!(m.balance_after >= 0);
                        prop_assert_eq!(m.balance_after, before + t.signed_delta(magnitude));
                        batch = batch.with_balance(m);
                    }
                    Err(DomainError::InsufficientStock { attempted, available, .. }) => {
                        prop_assert!(t.is_decrease());
                        prop_assert!(attempted > available);
                        prop_assert_eq!(available, before);
                    }
                    Err(other) => prop_assert!(false, "unexpected error {other:?}"),
                }
            }
        }
    }
}
