//! Integration tests for the stock pipeline.
//!
//! Tests: Request → Engine → Store (batch balance + ledger) → Summary → Scanner → AlertBus
//!
//! Verifies:
//! - Movements land on the batch balance and the ledger together, or not at all
//! - Ledger history replays to every recorded balance
//! - Concurrent movements on one batch are serialized
//! - Scans read live balances and hand alerts to the bus

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::{DateTime, NaiveDate, TimeZone, Utc};
    use proptest::prelude::*;

    use pharmastock_core::{BatchId, EntityKind, LedgerEntryId, MedicineId, SupplierId, UserId};
    use pharmastock_inventory::{
        BatchTarget, Medicine, NewBatchDetails, StockTransactionRequest, Supplier, TransactionType,
    };
    use pharmastock_notifications::{
        AlertBus, AlertBusError, AlertKind, AlertRequest, InMemoryAlertBus, Subscription,
    };

    use crate::alerts::{AlertScannerConfig, InventoryAlertScanner};
    use crate::engine::{FailureKind, StockTransactionEngine, StockTransactionError, TransactionOutcome};
    use crate::store::{InMemoryStockStore, StockStore, StockUnit};

    struct Pharmacy {
        store: InMemoryStockStore,
        engine: StockTransactionEngine<InMemoryStockStore>,
        medicine: Medicine,
        supplier: SupplierId,
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn noon(day: NaiveDate) -> DateTime<Utc> {
        Utc.from_utc_datetime(&day.and_hms_opt(12, 0, 0).unwrap())
    }

    fn far_expiry() -> NaiveDate {
        date(2031, 12, 31)
    }

    fn pharmacy_with(store: InMemoryStockStore) -> Pharmacy {
        let medicine = Medicine::new(MedicineId::new(), "Amoxicillin 500mg");
        let supplier = Supplier::new(SupplierId::new(), "Acme Pharma");
        store.insert_medicine(medicine.clone()).unwrap();
        store.insert_supplier(supplier.clone()).unwrap();
        Pharmacy {
            engine: StockTransactionEngine::new(store.clone()),
            store,
            medicine,
            supplier: supplier.id,
        }
    }

    fn pharmacy() -> Pharmacy {
        pharmacy_with(InMemoryStockStore::new())
    }

    impl Pharmacy {
        fn add_medicine(&self, name: &str, threshold: Option<i64>) -> Medicine {
            let mut medicine = Medicine::new(MedicineId::new(), name);
            medicine.low_stock_threshold = threshold;
            self.store.insert_medicine(medicine.clone()).unwrap();
            medicine
        }

        async fn receive_for(
            &self,
            medicine_id: MedicineId,
            number: &str,
            quantity: u32,
            expiry: NaiveDate,
        ) -> TransactionOutcome {
            let details = NewBatchDetails::new(number, expiry).with_supplier(self.supplier);
            self.engine
                .apply_transaction(StockTransactionRequest::receive_new_batch(medicine_id, details, quantity))
                .await
                .unwrap()
        }

        async fn receive(&self, number: &str, quantity: u32) -> TransactionOutcome {
            self.receive_for(self.medicine.id, number, quantity, far_expiry()).await
        }

        async fn balance(&self, batch_id: BatchId) -> i64 {
            self.store.batch(batch_id).await.unwrap().unwrap().current_quantity()
        }
    }

    // ---------------------------------------------------------------------
    // Engine scenarios
    // ---------------------------------------------------------------------

    #[tokio::test]
    async fn dispense_reduces_balance_and_records_signed_entry() {
        let p = pharmacy();
        let received = p.receive("LOT-100", 100).await;
        let actor = UserId::new();

        let outcome = p
            .engine
            .apply_transaction(
                StockTransactionRequest::dispense(p.medicine.id, received.batch_id, 30)
                    .by(actor)
                    .with_notes("prescription #8812"),
            )
            .await
            .unwrap();

        assert_eq!(outcome.new_balance, 70);
        assert_eq!(outcome.entry.quantity_change, -30);
        assert_eq!(outcome.entry.quantity_after_transaction, 70);
        assert_eq!(outcome.entry.transaction_type, TransactionType::OutDispense);
        assert_eq!(outcome.entry.user_id, Some(actor));
        assert_eq!(outcome.entry.notes.as_deref(), Some("prescription #8812"));
        assert_eq!(p.balance(received.batch_id).await, 70);
        assert!(outcome.ledger_entry_id > received.ledger_entry_id);
    }

    #[tokio::test]
    async fn overdraw_is_rejected_without_side_effects() {
        let p = pharmacy();
        let received = p.receive("LOT-10", 10).await;

        let err = p
            .engine
            .apply_transaction(StockTransactionRequest::dispense(p.medicine.id, received.batch_id, 15))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            StockTransactionError::InsufficientStock {
                batch_id: received.batch_id,
                attempted: 15,
                available: 10,
            }
        );
        assert_eq!(p.balance(received.batch_id).await, 10);
        assert_eq!(p.engine.batch_history(received.batch_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn receiving_a_new_batch_opens_it_full() {
        let p = pharmacy();
        let outcome = p.receive("LOT-50", 50).await;

        assert_eq!(outcome.new_balance, 50);
        assert_eq!(outcome.entry.quantity_change, 50);
        assert_eq!(outcome.entry.quantity_after_transaction, 50);
        assert_eq!(outcome.entry.transaction_type, TransactionType::InNewBatch);

        let batch = p.store.batch(outcome.batch_id).await.unwrap().unwrap();
        assert_eq!(batch.quantity_received(), 50);
        assert_eq!(batch.current_quantity(), 50);
        assert_eq!(batch.supplier_id(), Some(p.supplier));
    }

    #[tokio::test]
    async fn initial_stock_opens_or_tops_up_a_batch() {
        let p = pharmacy();
        let opening = p
            .engine
            .apply_transaction(StockTransactionRequest::new(
                TransactionType::InitialStock,
                p.medicine.id,
                BatchTarget::New(NewBatchDetails::new("OPENING", far_expiry())),
                12,
            ))
            .await
            .unwrap();
        assert_eq!(opening.new_balance, 12);
        let batch = p.store.batch(opening.batch_id).await.unwrap().unwrap();
        assert_eq!(batch.supplier_id(), None);

        let topped = p
            .engine
            .apply_transaction(StockTransactionRequest::on_batch(
                TransactionType::InitialStock,
                p.medicine.id,
                opening.batch_id,
                8,
            ))
            .await
            .unwrap();
        assert_eq!(topped.new_balance, 20);
        assert_eq!(topped.entry.quantity_change, 8);
    }

    #[tokio::test]
    async fn every_decrease_type_subtracts_and_every_increase_adds() {
        let p = pharmacy();
        let batch = p.receive("LOT-MIX", 100).await.batch_id;
        let mut expected = 100;

        for t in TransactionType::ALL {
            if t == TransactionType::InNewBatch {
                continue;
            }
            let outcome = p
                .engine
                .apply_transaction(StockTransactionRequest::on_batch(t, p.medicine.id, batch, 5))
                .await
                .unwrap();
            expected += if t.is_increase() { 5 } else { -5 };
            assert_eq!(outcome.new_balance, expected, "{t}");
            assert_eq!(outcome.entry.quantity_change, t.signed_delta(5), "{t}");
        }
    }

    #[tokio::test]
    async fn invalid_and_unknown_references_are_rejected() {
        let p = pharmacy();
        let received = p.receive("LOT-1", 10).await;

        // unknown medicine
        let err = p
            .engine
            .apply_transaction(StockTransactionRequest::dispense(MedicineId::new(), received.batch_id, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, StockTransactionError::NotFound { entity: EntityKind::Medicine, .. }));

        // unknown batch
        let err = p
            .engine
            .apply_transaction(StockTransactionRequest::dispense(p.medicine.id, BatchId::new(), 1))
            .await
            .unwrap_err();
        assert!(matches!(err, StockTransactionError::NotFound { entity: EntityKind::Batch, .. }));

        // batch of another medicine
        let other = p.add_medicine("Ibuprofen 200mg", None);
        let err = p
            .engine
            .apply_transaction(StockTransactionRequest::dispense(other.id, received.batch_id, 1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::InvalidTransaction);

        // duplicate batch number for the same medicine
        let details = NewBatchDetails::new(" LOT-1 ", far_expiry()).with_supplier(p.supplier);
        let err = p
            .engine
            .apply_transaction(StockTransactionRequest::receive_new_batch(p.medicine.id, details, 5))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::InvalidTransaction);

        // the same number is fine for another medicine
        p.receive_for(other.id, "LOT-1", 5, far_expiry()).await;

        // unknown supplier
        let details = NewBatchDetails::new("LOT-2", far_expiry()).with_supplier(SupplierId::new());
        let err = p
            .engine
            .apply_transaction(StockTransactionRequest::receive_new_batch(p.medicine.id, details, 5))
            .await
            .unwrap_err();
        assert!(matches!(err, StockTransactionError::NotFound { entity: EntityKind::Supplier, .. }));

        // unknown related entry
        let err = p
            .engine
            .apply_transaction(
                StockTransactionRequest::dispense(p.medicine.id, received.batch_id, 1)
                    .related_to(LedgerEntryId::new(9_999)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StockTransactionError::NotFound { entity: EntityKind::LedgerEntry, .. }));

        // expiry before manufacture
        let details = NewBatchDetails::new("LOT-3", date(2025, 1, 1))
            .with_supplier(p.supplier)
            .with_manufacture_date(date(2026, 1, 1));
        let err = p
            .engine
            .apply_transaction(StockTransactionRequest::receive_new_batch(p.medicine.id, details, 5))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::InvalidTransaction);

        // none of the above touched the batch or its ledger
        assert_eq!(p.balance(received.batch_id).await, 10);
        assert_eq!(p.engine.batch_history(received.batch_id).await.unwrap().len(), 1);
        assert_eq!(p.store.batches_for_medicine(p.medicine.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn soft_deleted_batches_cannot_be_moved() {
        let p = pharmacy();
        let received = p.receive("LOT-GONE", 10).await;
        p.store.soft_delete_batch(received.batch_id).unwrap();

        let err = p
            .engine
            .apply_transaction(StockTransactionRequest::dispense(p.medicine.id, received.batch_id, 1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::NotFound);

        // the lot number can be reused once the old batch is gone
        p.receive("LOT-GONE", 4).await;
    }

    #[tokio::test]
    async fn busy_batch_surfaces_retryable_contention() {
        let p = pharmacy_with(InMemoryStockStore::with_lock_wait(Duration::from_millis(20)));
        let received = p.receive("LOT-BUSY", 10).await;

        let mut holder = p.store.begin().await.unwrap();
        holder.lock_batch(received.batch_id).await.unwrap();

        let err = p
            .engine
            .apply_transaction(StockTransactionRequest::dispense(p.medicine.id, received.batch_id, 1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::Contention);
        assert!(err.is_retryable());

        drop(holder);
        let outcome = p
            .engine
            .apply_transaction(StockTransactionRequest::dispense(p.medicine.id, received.batch_id, 1))
            .await
            .unwrap();
        assert_eq!(outcome.new_balance, 9);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_dispenses_exceeding_stock_let_exactly_one_through() {
        let p = pharmacy();
        let batch_id = p.receive("LOT-RACE", 10).await.batch_id;
        let medicine_id = p.medicine.id;

        let tasks: Vec<_> = (0..2)
            .map(|_| {
                let engine = p.engine.clone();
                tokio::spawn(async move {
                    engine
                        .apply_transaction(StockTransactionRequest::dispense(medicine_id, batch_id, 6))
                        .await
                })
            })
            .collect();

        let mut ok = 0;
        let mut insufficient = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(outcome) => {
                    ok += 1;
                    assert_eq!(outcome.new_balance, 4);
                }
                Err(StockTransactionError::InsufficientStock { attempted, available, .. }) => {
                    insufficient += 1;
                    assert_eq!((attempted, available), (6, 4));
                }
                Err(other) => panic!("unexpected failure: {other:?}"),
            }
        }

        assert_eq!((ok, insufficient), (1, 1));
        assert_eq!(p.balance(batch_id).await, 4);
        assert!(p.engine.reconcile_batch(batch_id).await.unwrap().is_consistent());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn many_concurrent_movements_keep_the_ledger_consistent() {
        let p = pharmacy();
        let batch_id = p.receive("LOT-BUSY-DAY", 500).await.batch_id;
        let medicine_id = p.medicine.id;

        let tasks: Vec<_> = (0..40u32)
            .map(|i| {
                let engine = p.engine.clone();
                let t = if i % 4 == 0 { TransactionType::AdjustAdd } else { TransactionType::OutDispense };
                tokio::spawn(async move {
                    engine
                        .apply_transaction(StockTransactionRequest::on_batch(t, medicine_id, batch_id, 7))
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        // 30 dispenses of 7, 10 additions of 7
        assert_eq!(p.balance(batch_id).await, 500 - 30 * 7 + 10 * 7);
        let report = p.engine.reconcile_batch(batch_id).await.unwrap();
        assert!(report.is_consistent(), "{report:?}");
        assert_eq!(report.entries_replayed, 41);
    }

    // ---------------------------------------------------------------------
    // Corrections and reconciliation
    // ---------------------------------------------------------------------

    #[tokio::test]
    async fn reversing_a_dispense_posts_a_linked_counter_entry() {
        let p = pharmacy();
        let batch_id = p.receive("LOT-REV", 40).await.batch_id;
        let dispensed = p
            .engine
            .apply_transaction(StockTransactionRequest::dispense(p.medicine.id, batch_id, 15))
            .await
            .unwrap();

        let reversal = p
            .engine
            .reverse_entry(dispensed.ledger_entry_id, Some(UserId::new()), None)
            .await
            .unwrap();

        assert_eq!(reversal.new_balance, 40);
        assert_eq!(reversal.entry.transaction_type, TransactionType::AdjustAdd);
        assert_eq!(reversal.entry.quantity_change, 15);
        assert_eq!(reversal.entry.related_transaction_id, Some(dispensed.ledger_entry_id));

        // the original entry is untouched
        let history = p.engine.batch_history(batch_id).await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[1], dispensed.entry);
    }

    #[tokio::test]
    async fn reversing_a_consumed_receipt_fails_without_writing() {
        let p = pharmacy();
        let received = p.receive("LOT-USED", 20).await;
        p.engine
            .apply_transaction(StockTransactionRequest::dispense(p.medicine.id, received.batch_id, 18))
            .await
            .unwrap();

        let err = p
            .engine
            .reverse_entry(received.ledger_entry_id, None, Some("supplier recall".into()))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            StockTransactionError::InsufficientStock {
                batch_id: received.batch_id,
                attempted: 20,
                available: 2,
            }
        );
        assert_eq!(p.engine.batch_history(received.batch_id).await.unwrap().len(), 2);

        let err = p.engine.reverse_entry(LedgerEntryId::new(424_242), None, None).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::NotFound);
    }

    #[tokio::test]
    async fn reconciliation_detects_a_balance_written_behind_the_ledger() {
        let p = pharmacy();
        let batch_id = p.receive("LOT-DRIFT", 30).await.batch_id;
        p.engine
            .apply_transaction(StockTransactionRequest::dispense(p.medicine.id, batch_id, 5))
            .await
            .unwrap();
        assert!(p.engine.reconcile_batch(batch_id).await.unwrap().is_consistent());

        p.store.corrupt_batch_quantity(batch_id, 26).unwrap();
        let report = p.engine.reconcile_batch(batch_id).await.unwrap();
        assert!(!report.is_consistent());
        assert_eq!(report.replayed_balance, 25);
        assert_eq!(report.current_quantity, 26);
    }

    #[tokio::test]
    async fn histories_are_ordered_by_date_then_id() {
        let p = pharmacy();
        let t0 = noon(date(2026, 4, 1));
        let receive_at = |number: &str| {
            let details = NewBatchDetails::new(number, far_expiry()).with_supplier(p.supplier);
            StockTransactionRequest::receive_new_batch(p.medicine.id, details, 10).at(t0)
        };
        let a = p.engine.apply_transaction(receive_at("LOT-A")).await.unwrap();
        let b = p.engine.apply_transaction(receive_at("LOT-B")).await.unwrap();

        let dispense_at = |batch_id: BatchId, at: DateTime<Utc>| {
            StockTransactionRequest::dispense(p.medicine.id, batch_id, 1).at(at)
        };
        let late_b = p
            .engine
            .apply_transaction(dispense_at(b.batch_id, t0 + chrono::Duration::hours(3)))
            .await
            .unwrap();
        let early_a = p
            .engine
            .apply_transaction(dispense_at(a.batch_id, t0 + chrono::Duration::hours(1)))
            .await
            .unwrap();
        let tied_a = p
            .engine
            .apply_transaction(dispense_at(a.batch_id, t0 + chrono::Duration::hours(1)))
            .await
            .unwrap();

        let history = p.engine.medicine_history(p.medicine.id).await.unwrap();
        let ids: Vec<LedgerEntryId> = history.iter().map(|e| e.id).collect();
        assert_eq!(
            ids,
            vec![
                a.ledger_entry_id,
                b.ledger_entry_id,
                early_a.ledger_entry_id,
                tied_a.ledger_entry_id,
                late_b.ledger_entry_id
            ]
        );

        // a movement dated before the batch's latest entry would break replay order
        let err = p
            .engine
            .apply_transaction(dispense_at(a.batch_id, t0 + chrono::Duration::minutes(30)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::InvalidTransaction);
        assert!(p.engine.reconcile_batch(a.batch_id).await.unwrap().is_consistent());

        assert_eq!(
            p.engine.batch_history(BatchId::new()).await.unwrap_err().kind(),
            FailureKind::NotFound
        );
        assert_eq!(
            p.engine.medicine_history(MedicineId::new()).await.unwrap_err().kind(),
            FailureKind::NotFound
        );
    }

    #[tokio::test]
    async fn future_dates_are_refused_and_never_block_the_batch() {
        let p = pharmacy();
        let batch_id = p.receive("LOT-CLOCK", 100).await.batch_id;

        let err = p
            .engine
            .apply_transaction(
                StockTransactionRequest::on_batch(TransactionType::AdjustAdd, p.medicine.id, batch_id, 1)
                    .at(Utc::now() + chrono::Duration::days(1)),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::InvalidTransaction);
        assert_eq!(p.balance(batch_id).await, 100);

        // within the skew tolerance, as a host with a slightly faster clock would stamp it
        let ahead = Utc::now() + chrono::Duration::seconds(30);
        p.engine
            .apply_transaction(
                StockTransactionRequest::on_batch(TransactionType::AdjustAdd, p.medicine.id, batch_id, 1)
                    .at(ahead),
            )
            .await
            .unwrap();

        let dispensed = p
            .engine
            .apply_transaction(StockTransactionRequest::dispense(p.medicine.id, batch_id, 1))
            .await
            .unwrap();
        assert_eq!(dispensed.new_balance, 100);
        assert!(dispensed.entry.transaction_date >= ahead);
        assert!(p.engine.reconcile_batch(batch_id).await.unwrap().is_consistent());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            ..ProptestConfig::default()
        })]

        /// Property: whatever mix of movements is attempted, the batch never
        /// goes negative, rejected movements write nothing, and the ledger
        /// replays to the stored balance.
        #[test]
        fn ledger_always_replays_to_the_batch_balance(
            initial in 0u32..200,
            moves in prop::collection::vec((1usize..8, 0u32..60), 1..25)
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            rt.block_on(async {
                let p = pharmacy();
                let batch_id = p.receive("LOT-PROP", initial).await.batch_id;
                let mut expected = i64::from(initial);
                let mut entries = 1;

                for (type_idx, magnitude) in moves {
                    let t = TransactionType::ALL[type_idx];
                    let result = p
                        .engine
                        .apply_transaction(StockTransactionRequest::on_batch(t, p.medicine.id, batch_id, magnitude))
                        .await;
                    match result {
                        Ok(outcome) => {
                            expected += t.signed_delta(magnitude);
                            entries += 1;
                            prop_assert_eq!(outcome.new_balance, expected);
                        }
                        Err(StockTransactionError::InsufficientStock { attempted, available, .. }) => {
                            prop_assert!(t.is_decrease());
                            prop_assert_eq!(available, expected);
                            prop_assert!(attempted > available);
                        }
                        Err(other) => prop_assert!(false, "unexpected failure {other:?}"),
                    }
                    prop_assert!(p.balance(batch_id).await >= 0);
                }

                let report = p.engine.reconcile_batch(batch_id).await.unwrap();
                prop_assert!(report.is_consistent());
                prop_assert_eq!(report.current_quantity, expected);
                prop_assert_eq!(report.entries_replayed, entries);
                Ok(())
            })?;
        }
    }

    // ---------------------------------------------------------------------
    // Summaries
    // ---------------------------------------------------------------------

    #[tokio::test]
    async fn live_total_skips_expired_batches() {
        let p = pharmacy();
        let today = date(2026, 3, 1);
        p.receive_for(p.medicine.id, "FRESH-5", 5, date(2026, 9, 1)).await;
        p.receive_for(p.medicine.id, "TODAY-3", 3, today).await;
        p.receive_for(p.medicine.id, "STALE-20", 20, date(2026, 2, 28)).await;

        assert_eq!(p.engine.medicine_total_as_of(p.medicine.id, noon(today)).await.unwrap(), 8);
        let summary = p
            .engine
            .summaries()
            .rebuild_summary_as_of(p.medicine.id, noon(today))
            .await
            .unwrap();
        assert_eq!(summary.total_quantity_in_stock, 8);
    }

    #[tokio::test]
    async fn committed_transactions_refresh_the_summary() {
        let p = pharmacy();
        let batch_id = p.receive("LOT-SUM", 40).await.batch_id;
        assert_eq!(
            p.store.summary(p.medicine.id).await.unwrap().unwrap().total_quantity_in_stock,
            40
        );

        p.engine
            .apply_transaction(StockTransactionRequest::dispense(p.medicine.id, batch_id, 15))
            .await
            .unwrap();
        assert_eq!(
            p.store.summary(p.medicine.id).await.unwrap().unwrap().total_quantity_in_stock,
            25
        );
    }

    #[tokio::test]
    async fn backfilling_missing_summaries_is_idempotent() {
        let p = pharmacy();
        p.receive("LOT-1", 7).await;
        let quiet = p.add_medicine("Cetirizine 10mg", None);
        let also_quiet = p.add_medicine("Loratadine 10mg", Some(3));

        let aggregator = p.engine.summaries();
        let first = aggregator.rebuild_missing_summaries().await.unwrap();
        let mut rebuilt = first.rebuilt.clone();
        rebuilt.sort();
        let mut expected = vec![quiet.id, also_quiet.id];
        expected.sort();
        assert_eq!(rebuilt, expected);
        assert!(first.failed.is_empty());

        let second = aggregator.rebuild_missing_summaries().await.unwrap();
        assert!(second.rebuilt.is_empty());
        assert!(p.store.medicines_without_summary().await.unwrap().is_empty());
        assert_eq!(
            p.store.summary(quiet.id).await.unwrap().unwrap().total_quantity_in_stock,
            0
        );
        assert_eq!(
            p.store.summary(p.medicine.id).await.unwrap().unwrap().total_quantity_in_stock,
            7
        );
    }

    // ---------------------------------------------------------------------
    // Alert scanning
    // ---------------------------------------------------------------------

    #[tokio::test]
    async fn low_stock_uses_medicine_threshold_or_the_default() {
        let p = pharmacy();
        let today = date(2026, 3, 1);
        // Amoxicillin: 5 + 3 live, 20 expired, default threshold 10 -> flagged
        p.receive_for(p.medicine.id, "A-5", 5, date(2026, 9, 1)).await;
        p.receive_for(p.medicine.id, "A-3", 3, date(2026, 6, 1)).await;
        p.receive_for(p.medicine.id, "A-20", 20, date(2026, 1, 31)).await;

        // threshold 8 with exactly 8 on hand -> not flagged (strictly below only)
        let exact = p.add_medicine("Metformin 850mg", Some(8));
        p.receive_for(exact.id, "M-8", 8, date(2026, 9, 1)).await;

        // negative threshold -> skipped
        p.add_medicine("Broken threshold", Some(-5));

        let scanner = InventoryAlertScanner::new(p.store.clone(), AlertScannerConfig::default());
        let findings = scanner.scan_low_stock_as_of(today).await.unwrap();

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].medicine_id, p.medicine.id);
        assert_eq!(findings[0].current_total, 8);
        assert_eq!(findings[0].threshold, 10);

        let lenient = InventoryAlertScanner::new(
            p.store.clone(),
            AlertScannerConfig::default().with_default_low_stock_threshold(8),
        );
        assert!(lenient.scan_low_stock_as_of(today).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn expiring_scan_covers_the_window_and_skips_empty_batches() {
        let p = pharmacy();
        let today = date(2026, 3, 1);
        let soon = p.receive_for(p.medicine.id, "SOON-4", 4, date(2026, 3, 11)).await;
        let emptied = p.receive_for(p.medicine.id, "SOON-0", 4, date(2026, 3, 11)).await;
        p.engine
            .apply_transaction(StockTransactionRequest::on_batch(
                TransactionType::DisposalDamaged,
                p.medicine.id,
                emptied.batch_id,
                4,
            ))
            .await
            .unwrap();
        p.receive_for(p.medicine.id, "LATER", 4, date(2026, 6, 1)).await;
        p.receive_for(p.medicine.id, "GONE", 4, date(2026, 2, 27)).await;

        let scanner = InventoryAlertScanner::new(p.store.clone(), AlertScannerConfig::default());
        let findings = scanner.scan_expiring_soon_as_of(today, 30).await.unwrap();

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].batch_id, soon.batch_id);
        assert_eq!(findings[0].current_quantity, 4);
        assert_eq!(findings[0].days_until_expiry, 10);

        assert!(scanner.scan_expiring_soon_as_of(today, 9).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sweep_hands_alerts_to_the_bus_for_the_given_recipients() {
        let p = pharmacy();
        let today = date(2026, 3, 1);
        let batch = p.receive_for(p.medicine.id, "SOON-4", 4, date(2026, 3, 11)).await;

        let bus = Arc::new(InMemoryAlertBus::new());
        let inbox = bus.subscribe();
        let admins = vec![UserId::new(), UserId::new()];

        let scanner = InventoryAlertScanner::new(p.store.clone(), AlertScannerConfig::default());
        let report = scanner.sweep(&admins, bus.as_ref(), noon(today)).await.unwrap();
        assert_eq!((report.low_stock, report.expiring, report.published), (1, 1, 2));

        let alerts = inbox.drain();
        assert_eq!(alerts.len(), 2);
        let low = alerts.iter().find(|a| a.kind == AlertKind::LowStock).unwrap();
        assert_eq!(low.subject_id, *p.medicine.id.as_uuid());
        assert_eq!(low.recipient_ids, admins);
        assert_eq!(low.data["currentTotal"], 4);
        let expiring = alerts.iter().find(|a| a.kind == AlertKind::Expiring).unwrap();
        assert_eq!(expiring.subject_id, *batch.batch_id.as_uuid());
        assert_eq!(expiring.data["daysUntilExpiry"], 10);

        // without a suppression window every run re-emits
        scanner.sweep(&admins, bus.as_ref(), noon(today)).await.unwrap();
        assert_eq!(inbox.drain().len(), 2);

        // no recipients: findings are counted but nothing is published
        let report = scanner.sweep(&[], bus.as_ref(), noon(today)).await.unwrap();
        assert_eq!(report.published, 0);
        assert!(inbox.drain().is_empty());
    }

    #[tokio::test]
    async fn suppression_window_holds_back_repeat_alerts() {
        let p = pharmacy();
        let today = date(2026, 3, 1);
        p.receive_for(p.medicine.id, "LOW-2", 2, date(2027, 1, 1)).await;

        let bus = InMemoryAlertBus::new();
        let inbox = bus.subscribe();
        let admins = vec![UserId::new()];
        let scanner = InventoryAlertScanner::new(
            p.store.clone(),
            AlertScannerConfig::default().with_suppression_window(chrono::Duration::hours(6)),
        );

        let first = scanner.sweep(&admins, &bus, noon(today)).await.unwrap();
        assert_eq!(first.published, 1);

        let again = scanner
            .sweep(&admins, &bus, noon(today) + chrono::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!((again.published, again.suppressed), (0, 1));

        let later = scanner
            .sweep(&admins, &bus, noon(today) + chrono::Duration::hours(7))
            .await
            .unwrap();
        assert_eq!(later.published, 1);
        assert_eq!(inbox.drain().len(), 2);
    }

    #[tokio::test]
    async fn suppression_carries_across_separate_scanner_runs() {
        let p = pharmacy();
        let today = date(2026, 3, 1);
        p.receive_for(p.medicine.id, "LOW-3", 3, date(2026, 3, 20)).await;

        let bus = InMemoryAlertBus::new();
        let inbox = bus.subscribe();
        let admins = vec![UserId::new()];
        let config = AlertScannerConfig::default().with_suppression_window(chrono::Duration::minutes(90));

        // each scheduled run builds its own scanner
        let first_run = InventoryAlertScanner::new(p.store.clone(), config.clone());
        let first = first_run.sweep(&admins, &bus, noon(today)).await.unwrap();
        assert_eq!((first.published, first.suppressed), (2, 0));

        let second_run = InventoryAlertScanner::new(p.store.clone(), config.clone());
        let second = second_run
            .sweep(&admins, &bus, noon(today) + chrono::Duration::minutes(5))
            .await
            .unwrap();
        assert_eq!((second.published, second.suppressed), (0, 2));
        assert_eq!(inbox.drain().len(), 2);

        let subject = *p.medicine.id.as_uuid();
        assert_eq!(
            p.store.last_alert_emitted(AlertKind::LowStock, subject).await.unwrap(),
            Some(noon(today))
        );

        // once the window has passed the stale record is dropped and the alert re-emitted
        let later = noon(today) + chrono::Duration::hours(3);
        let third_run = InventoryAlertScanner::new(p.store.clone(), config);
        let third = third_run.sweep(&admins, &bus, later).await.unwrap();
        assert_eq!(third.published, 2);
        assert_eq!(
            p.store.last_alert_emitted(AlertKind::LowStock, subject).await.unwrap(),
            Some(later)
        );
    }

    struct OfflineDispatcher;

    impl AlertBus for OfflineDispatcher {
        fn publish(&self, _alert: AlertRequest) -> Result<(), AlertBusError> {
            Err(AlertBusError::Rejected("dispatcher offline".to_string()))
        }

        fn subscribe(&self) -> Subscription<AlertRequest> {
            let (_tx, rx) = std::sync::mpsc::channel();
            Subscription::new(rx)
        }
    }

    #[tokio::test]
    async fn publish_failures_are_counted_and_the_sweep_continues() {
        let p = pharmacy();
        let today = date(2026, 3, 1);
        p.receive_for(p.medicine.id, "SOON-1", 1, date(2026, 3, 5)).await;

        let scanner = InventoryAlertScanner::new(p.store.clone(), AlertScannerConfig::default());
        let report = scanner
            .sweep(&[UserId::new()], &OfflineDispatcher, noon(today))
            .await
            .unwrap();
        assert_eq!((report.low_stock, report.expiring), (1, 1));
        assert_eq!((report.published, report.failed), (0, 2));
    }
}
