//! End-to-end service tests against the in-memory store.
//!
//! Covers:
//! - ledger arithmetic and the no-overdraw rule, also under concurrency
//! - order posting as an all-or-nothing step
//! - the picking lifecycle, bin resolution and the picklist view
//! - per-order shipment tracking
//! - catalog maintenance and the audit trail

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use wms_core::{DomainError, Entity};
    use wms_inventory::MovementType;
    use wms_orders::{OrderStatus, OrderType};
    use wms_picking::{PickListStatus, PickTaskStatus};

    use crate::error::ServiceError;
    use crate::store::{InMemoryStore, WarehouseStore};
    use crate::warehouse::{Warehouse, WarehouseBuilder};

    fn warehouse() -> Warehouse {
        let store: Arc<dyn WarehouseStore> = Arc::new(InMemoryStore::new());
        WarehouseBuilder::new(store).with_audit_trail("tester").build()
    }

    /// Items SKU1/SKU2 and locations L1/L2.
    async fn seeded() -> Warehouse {
        let wh = warehouse();
        wh.catalog.create_item("SKU1", "Widget", "blue").await.unwrap();
        wh.catalog.create_item("SKU2", "Gadget", "").await.unwrap();
        wh.catalog.create_location("L1", "Main").await.unwrap();
        wh.catalog.create_location("L2", "Overflow").await.unwrap();
        wh
    }

    fn domain(err: ServiceError) -> DomainError {
        match err {
            ServiceError::Domain(e) => e,
            other => panic!("expected a domain error, got {other:?}"),
        }
    }

    // --- ledger ----------------------------------------------------------------

    #[tokio::test]
    async fn issue_beyond_balance_is_rejected_and_nothing_is_recorded() {
        let wh = seeded().await;
        wh.ledger.record_in("SKU1", "L1", 10, None).await.unwrap();

        let err = domain(wh.ledger.record_out("SKU1", "L1", 20, None).await.unwrap_err());
        assert!(matches!(
            err,
            DomainError::InsufficientStock { available: 10, requested: 20, .. }
        ));
        assert_eq!(wh.ledger.stock_at("SKU1", "L1").await.unwrap(), 10);
        assert_eq!(wh.reporting.movement_history("SKU1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn balances_are_per_location_and_totals_span_locations() {
        let wh = seeded().await;
        wh.ledger.record_in("SKU1", "L1", 7, Some("PO-1")).await.unwrap();
        wh.ledger.record_in("SKU1", "L2", 5, None).await.unwrap();
        wh.ledger.record_out("SKU1", "L1", 3, None).await.unwrap();

        assert_eq!(wh.ledger.stock_at("SKU1", "L1").await.unwrap(), 4);
        assert_eq!(wh.ledger.stock_at("SKU1", "L2").await.unwrap(), 5);
        assert_eq!(wh.ledger.stock_total("SKU1").await.unwrap(), 9);
        assert_eq!(wh.ledger.stock_total("SKU2").await.unwrap(), 0);

        // L2 has stock, but not L1 beyond its own balance.
        let err = domain(wh.ledger.record_out("SKU1", "L1", 5, None).await.unwrap_err());
        assert!(matches!(err, DomainError::InsufficientStock { available: 4, .. }));
    }

    #[tokio::test]
    async fn ledger_rejects_bad_input() {
        let wh = seeded().await;

        let err = domain(wh.ledger.record_in("SKU1", "L1", 0, None).await.unwrap_err());
        assert!(matches!(err, DomainError::Validation(_)));

        let err = domain(wh.ledger.record_in("NOPE", "L1", 1, None).await.unwrap_err());
        assert_eq!(err, DomainError::not_found("item", "NOPE"));

        let err = domain(wh.ledger.record_out("SKU1", "NOPE", 1, None).await.unwrap_err());
        assert_eq!(err, DomainError::not_found("location", "NOPE"));
    }

    #[tokio::test]
    async fn identifiers_and_references_are_trimmed() {
        let wh = seeded().await;
        wh.ledger
            .record_in("  SKU1 ", " L1", 2, Some("   "))
            .await
            .unwrap();
        wh.ledger
            .record_in("SKU1", "L1", 1, Some(" GRN-7 "))
            .await
            .unwrap();

        let history = wh.reporting.movement_history("SKU1").await.unwrap();
        assert_eq!(history[0].reference, None);
        assert_eq!(history[1].reference.as_deref(), Some("GRN-7"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_withdrawals_never_overdraw() {
        let wh = seeded().await;
        wh.ledger.record_in("SKU1", "L1", 10, None).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..25 {
            let ledger = wh.ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger.record_out("SKU1", "L1", 1, None).await
            }));
        }

        let mut succeeded = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(e) => assert!(matches!(
                    domain(e),
                    DomainError::InsufficientStock { available: 0, .. }
                )),
            }
        }
        assert_eq!(succeeded, 10);
        assert_eq!(wh.ledger.stock_at("SKU1", "L1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn receipt_past_maximum_balance_is_rejected() {
        let wh = seeded().await;
        wh.ledger.record_in("SKU1", "L1", i64::MAX, None).await.unwrap();

        let err = domain(wh.ledger.record_in("SKU1", "L1", 1, None).await.unwrap_err());
        assert!(
            matches!(&err, DomainError::Validation(msg) if msg.contains("SKU1") && msg.contains("L1")),
            "{err:?}"
        );
        assert_eq!(wh.ledger.stock_at("SKU1", "L1").await.unwrap(), i64::MAX);
        assert_eq!(wh.reporting.movement_history("SKU1").await.unwrap().len(), 1);

        wh.ledger.record_in("SKU1", "L2", 1, None).await.unwrap();
        assert_eq!(wh.ledger.stock_at("SKU1", "L2").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn recent_movements_are_newest_first_and_limited() {
        let wh = seeded().await;
        for qty in 1..=5 {
            wh.ledger.record_in("SKU1", "L1", qty, None).await.unwrap();
        }

        let recent = wh.reporting.recent_movements("SKU1", Some(3)).await.unwrap();
        let quantities: Vec<i64> = recent.iter().map(|m| m.quantity.get()).collect();
        assert_eq!(quantities, vec![5, 4, 3]);

        let all = wh.reporting.recent_movements("SKU1", None).await.unwrap();
        assert_eq!(all.len(), 5);

        let one = wh.reporting.recent_movements("SKU1", Some(0)).await.unwrap();
        assert_eq!(one.len(), 1);
    }

    // --- orders ----------------------------------------------------------------

    #[tokio::test]
    async fn posting_an_inbound_order_receives_every_line() {
        let wh = seeded().await;
        wh.orders.create_inbound("IN-1").await.unwrap();
        let first = wh.orders.add_line("IN-1", "SKU1", "L1", 4).await.unwrap();
        let second = wh.orders.add_line("IN-1", "SKU2", "L2", 6).await.unwrap();
        assert_eq!((first.line_no, second.line_no), (1, 2));

        let movements = wh.orders.post("IN-1").await.unwrap();
        assert_eq!(movements.len(), 2);
        assert!(movements.iter().all(|m| m.movement_type == MovementType::In));
        assert!(
            movements
                .iter()
                .all(|m| m.reference.as_deref() == Some("ORDER-IN-1"))
        );

        assert_eq!(wh.orders.get("IN-1").await.unwrap().status(), OrderStatus::Posted);
        assert_eq!(wh.ledger.stock_at("SKU1", "L1").await.unwrap(), 4);
        assert_eq!(wh.ledger.stock_at("SKU2", "L2").await.unwrap(), 6);
    }

    #[tokio::test]
    async fn failed_posting_leaves_order_draft_and_ledger_untouched() {
        let wh = seeded().await;
        wh.ledger.record_in("SKU1", "L1", 5, None).await.unwrap();
        wh.orders.create_outbound("OUT-1").await.unwrap();
        wh.orders.add_line("OUT-1", "SKU1", "L1", 3).await.unwrap();
        // Cumulative demand on the same pair exceeds the balance.
        wh.orders.add_line("OUT-1", "SKU1", "L1", 3).await.unwrap();

        let err = domain(wh.orders.post("OUT-1").await.unwrap_err());
        assert!(matches!(
            err,
            DomainError::InsufficientStock { available: 2, requested: 3, .. }
        ));

        assert_eq!(wh.orders.get("OUT-1").await.unwrap().status(), OrderStatus::Draft);
        assert_eq!(wh.ledger.stock_at("SKU1", "L1").await.unwrap(), 5);
        assert_eq!(wh.reporting.movement_history("SKU1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn posting_an_outbound_order_issues_stock() {
        let wh = seeded().await;
        wh.ledger.record_in("SKU1", "L1", 5, None).await.unwrap();
        wh.orders.create_outbound("OUT-2").await.unwrap();
        wh.orders.add_line("OUT-2", "SKU1", "L1", 5).await.unwrap();

        let movements = wh.orders.post("OUT-2").await.unwrap();
        assert_eq!(movements[0].movement_type, MovementType::Out);
        assert_eq!(wh.ledger.stock_at("SKU1", "L1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn inbound_posting_past_maximum_balance_leaves_order_draft() {
        let wh = seeded().await;
        wh.ledger.record_in("SKU1", "L1", i64::MAX - 2, None).await.unwrap();
        wh.orders.create_inbound("IN-MAX").await.unwrap();
        wh.orders.add_line("IN-MAX", "SKU2", "L1", 5).await.unwrap();
        wh.orders.add_line("IN-MAX", "SKU1", "L1", 2).await.unwrap();
        wh.orders.add_line("IN-MAX", "SKU1", "L1", 1).await.unwrap();

        let err = domain(wh.orders.post("IN-MAX").await.unwrap_err());
        assert!(
            matches!(&err, DomainError::Validation(msg) if msg.contains("SKU1") && msg.contains("L1")),
            "{err:?}"
        );
        assert_eq!(wh.orders.get("IN-MAX").await.unwrap().status(), OrderStatus::Draft);
        assert_eq!(wh.ledger.stock_at("SKU1", "L1").await.unwrap(), i64::MAX - 2);
        assert_eq!(wh.ledger.stock_at("SKU2", "L1").await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_outbound_postings_never_overdraw() {
        let wh = seeded().await;
        wh.ledger.record_in("SKU1", "L1", 10, None).await.unwrap();
        let numbers: Vec<String> = (1..=5).map(|n| format!("OUT-C{n}")).collect();
        for number in &numbers {
            wh.orders.create_outbound(number).await.unwrap();
            wh.orders.add_line(number, "SKU1", "L1", 4).await.unwrap();
        }

        let mut handles = Vec::new();
        for number in numbers.clone() {
            let orders = wh.orders.clone();
            handles.push(tokio::spawn(async move { orders.post(&number).await }));
        }

        let mut posted = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => posted += 1,
                Err(e) => assert!(matches!(
                    domain(e),
                    DomainError::InsufficientStock { available: 2, requested: 4, .. }
                )),
            }
        }
        assert_eq!(posted, 2);
        assert_eq!(wh.ledger.stock_at("SKU1", "L1").await.unwrap(), 2);

        let mut statuses = Vec::new();
        for number in &numbers {
            statuses.push(wh.orders.get(number).await.unwrap().status());
        }
        assert_eq!(statuses.iter().filter(|s| **s == OrderStatus::Posted).count(), 2);
        assert_eq!(statuses.iter().filter(|s| **s == OrderStatus::Draft).count(), 3);
    }

    #[tokio::test]
    async fn only_draft_orders_accept_changes() {
        let wh = seeded().await;
        wh.orders.create_inbound("IN-2").await.unwrap();
        wh.orders.add_line("IN-2", "SKU1", "L1", 1).await.unwrap();
        wh.orders.post("IN-2").await.unwrap();

        for err in [
            wh.orders.add_line("IN-2", "SKU1", "L1", 1).await.unwrap_err(),
            wh.orders.post("IN-2").await.unwrap_err(),
            wh.orders.cancel("IN-2").await.unwrap_err(),
        ] {
            assert!(matches!(
                domain(err),
                DomainError::InvalidStatusTransition { .. }
            ));
        }

        wh.orders.create_outbound("OUT-3").await.unwrap();
        let cancelled = wh.orders.cancel("OUT-3").await.unwrap();
        assert_eq!(cancelled.status(), OrderStatus::Cancelled);
        let err = domain(wh.orders.post("OUT-3").await.unwrap_err());
        assert!(matches!(err, DomainError::InvalidStatusTransition { .. }));
    }

    #[tokio::test]
    async fn posting_without_lines_fails() {
        let wh = seeded().await;
        wh.orders.create_inbound("IN-3").await.unwrap();

        let err = domain(wh.orders.post("IN-3").await.unwrap_err());
        assert_eq!(
            err,
            DomainError::NoLines {
                order_number: "IN-3".to_string()
            }
        );
    }

    #[tokio::test]
    async fn duplicate_order_number_is_a_conflict() {
        let wh = seeded().await;
        wh.orders.create_inbound("DUP").await.unwrap();

        let err = domain(wh.orders.create(" DUP ", OrderType::Outbound).await.unwrap_err());
        assert!(matches!(err, DomainError::Conflict(msg) if msg.contains("DUP")));
    }

    #[tokio::test]
    async fn orders_are_listed_newest_first() {
        let wh = seeded().await;
        for n in ["A", "B", "C"] {
            wh.orders.create_inbound(n).await.unwrap();
        }

        let listed: Vec<String> = wh
            .orders
            .list(Some(2))
            .await
            .unwrap()
            .iter()
            .map(|o| o.order_number().to_string())
            .collect();
        assert_eq!(listed, vec!["C".to_string(), "B".to_string()]);
    }

    // --- picking ---------------------------------------------------------------

    async fn posted_outbound(wh: &Warehouse, number: &str) {
        wh.ledger.record_in("SKU1", "L1", 10, None).await.unwrap();
        wh.ledger.record_in("SKU2", "L1", 10, None).await.unwrap();
        wh.orders.create_outbound(number).await.unwrap();
        wh.orders.add_line(number, "SKU1", "L1", 2).await.unwrap();
        wh.orders.add_line(number, "SKU2", "L1", 3).await.unwrap();
        wh.orders.post(number).await.unwrap();
    }

    #[tokio::test]
    async fn picking_lifecycle_runs_to_done() {
        let wh = seeded().await;
        posted_outbound(&wh, "OUT-P").await;

        let picklist = wh.picking.create_picklist("OUT-P").await.unwrap();
        assert_eq!(picklist.status(), PickListStatus::Created);
        assert_eq!(picklist.tasks().len(), 2);
        assert!(picklist.tasks().iter().all(|t| t.status == PickTaskStatus::Open));

        let started = wh.picking.start(*picklist.id()).await.unwrap();
        assert_eq!(started.status(), PickListStatus::InProgress);
        assert!(started.started_at().is_some());

        let first = picklist.tasks()[0].id;
        let picked = wh.picking.mark_task_picked(first).await.unwrap();
        assert_eq!(picked.status, PickTaskStatus::Picked);
        assert!(picked.picked_at.is_some());

        let err = domain(wh.picking.done(*picklist.id()).await.unwrap_err());
        assert!(matches!(err, DomainError::OpenTasksRemaining { open: 1, .. }));

        let err = domain(wh.picking.mark_task_picked(first).await.unwrap_err());
        assert!(matches!(err, DomainError::InvalidStatusTransition { .. }));

        wh.picking
            .mark_task_picked(picklist.tasks()[1].id)
            .await
            .unwrap();
        let done = wh.picking.done(*picklist.id()).await.unwrap();
        assert_eq!(done.status(), PickListStatus::Done);
        assert!(done.done_at().is_some());
    }

    #[tokio::test]
    async fn picklist_requires_a_posted_order() {
        let wh = seeded().await;
        wh.orders.create_outbound("DRAFT-1").await.unwrap();
        wh.orders.add_line("DRAFT-1", "SKU1", "L1", 1).await.unwrap();

        let err = domain(wh.picking.create_picklist("DRAFT-1").await.unwrap_err());
        assert!(matches!(err, DomainError::InvalidStatusTransition { .. }));

        let err = domain(wh.picking.create_picklist("MISSING").await.unwrap_err());
        assert!(err.is_not_found());

        let err = wh.picking.show_for_order("DRAFT-1").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn second_picklist_for_an_order_is_a_conflict() {
        let wh = seeded().await;
        posted_outbound(&wh, "OUT-Q").await;
        wh.picking.create_picklist("OUT-Q").await.unwrap();

        let err = domain(wh.picking.create_picklist("OUT-Q").await.unwrap_err());
        assert_eq!(
            err,
            DomainError::conflict("picklist already exists for order OUT-Q")
        );
    }

    #[tokio::test]
    async fn start_requires_a_created_picklist() {
        let wh = seeded().await;
        posted_outbound(&wh, "OUT-S").await;
        let picklist = wh.picking.create_picklist("OUT-S").await.unwrap();

        let err = domain(wh.picking.done(*picklist.id()).await.unwrap_err());
        assert!(matches!(err, DomainError::InvalidStatusTransition { .. }));

        wh.picking.start(*picklist.id()).await.unwrap();
        let err = domain(wh.picking.start(*picklist.id()).await.unwrap_err());
        assert!(matches!(err, DomainError::InvalidStatusTransition { .. }));
    }

    #[tokio::test]
    async fn bin_is_set_only_when_exactly_one_candidate_exists() {
        let wh = seeded().await;
        wh.catalog.create_zone("L1", "Z1", "Aisle 1").await.unwrap();
        for bin in ["B1", "B2", "B3"] {
            wh.catalog.create_bin("L1", "Z1", bin, "").await.unwrap();
        }
        // SKU1 lives in one bin, SKU2 in two.
        wh.catalog.assign_item("L1", "B1", "SKU1").await.unwrap();
        wh.catalog.assign_item("L1", "B2", "SKU2").await.unwrap();
        wh.catalog.assign_item("L1", "B3", "SKU2").await.unwrap();
        posted_outbound(&wh, "OUT-B").await;

        let picklist = wh.picking.create_picklist("OUT-B").await.unwrap();
        let view = wh.picking.show(*picklist.id()).await.unwrap();

        assert_eq!(view.order_number, "OUT-B");
        assert_eq!(view.tasks.len(), 2);
        let sku1 = &view.tasks[0];
        assert_eq!(sku1.sku.as_deref(), Some("SKU1"));
        assert_eq!(sku1.item_name.as_deref(), Some("Widget"));
        assert_eq!(sku1.location_code.as_deref(), Some("L1"));
        assert_eq!(sku1.line_no, Some(1));
        assert_eq!(sku1.quantity, 2);
        assert_eq!(sku1.bin_code.as_deref(), Some("B1"));

        let sku2 = &view.tasks[1];
        assert_eq!(sku2.sku.as_deref(), Some("SKU2"));
        assert_eq!(sku2.bin_code, None);

        assert_eq!(wh.picking.show_for_order("OUT-B").await.unwrap(), view);
    }

    #[tokio::test]
    async fn bins_in_other_locations_are_not_candidates() {
        let wh = seeded().await;
        wh.catalog.create_zone("L2", "Z1", "").await.unwrap();
        wh.catalog.create_bin("L2", "Z1", "B9", "").await.unwrap();
        wh.catalog.assign_item("L2", "B9", "SKU1").await.unwrap();
        posted_outbound(&wh, "OUT-X").await;

        let picklist = wh.picking.create_picklist("OUT-X").await.unwrap();
        assert!(picklist.tasks().iter().all(|t| t.bin_id.is_none()));
    }

    #[tokio::test]
    async fn unknown_task_or_picklist_is_not_found() {
        let wh = seeded().await;

        let err = wh
            .picking
            .mark_task_picked(wms_core::PickTaskId::new())
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let err = wh.picking.show(wms_core::PickListId::new()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    // --- catalog ---------------------------------------------------------------

    #[tokio::test]
    async fn catalog_rejects_duplicates() {
        let wh = seeded().await;

        let err = domain(wh.catalog.create_item("SKU1", "Again", "").await.unwrap_err());
        assert!(matches!(err, DomainError::Conflict(_)));

        let err = domain(wh.catalog.create_location("L1", "Again").await.unwrap_err());
        assert!(matches!(err, DomainError::Conflict(_)));

        wh.catalog.create_zone("L1", "Z1", "").await.unwrap();
        let err = domain(wh.catalog.create_zone("L1", "Z1", "").await.unwrap_err());
        assert!(matches!(err, DomainError::Conflict(_)));
        // Zone codes are scoped to their location.
        wh.catalog.create_zone("L2", "Z1", "").await.unwrap();

        wh.catalog.create_bin("L1", "Z1", "B1", "").await.unwrap();
        let err = domain(wh.catalog.create_bin("L1", "Z1", "B1", "").await.unwrap_err());
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[tokio::test]
    async fn item_description_can_be_updated() {
        let wh = seeded().await;
        let updated = wh
            .catalog
            .update_item_description("SKU1", "  green  ")
            .await
            .unwrap();
        assert_eq!(updated.description, "green");
        assert_eq!(wh.catalog.get_item("SKU1").await.unwrap().description, "green");
    }

    #[tokio::test]
    async fn referenced_items_cannot_be_deleted() {
        let wh = seeded().await;
        wh.ledger.record_in("SKU1", "L1", 1, None).await.unwrap();

        let err = domain(wh.catalog.delete_item("SKU1").await.unwrap_err());
        assert!(matches!(err, DomainError::Conflict(_)));

        wh.catalog.delete_item("SKU2").await.unwrap();
        assert!(wh.catalog.get_item("SKU2").await.unwrap_err().is_not_found());
        assert_eq!(wh.catalog.list_items().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn bins_holding_items_cannot_be_deleted() {
        let wh = seeded().await;
        wh.catalog.create_zone("L1", "Z1", "").await.unwrap();
        wh.catalog.create_bin("L1", "Z1", "B1", "").await.unwrap();
        wh.catalog.assign_item("L1", "B1", "SKU1").await.unwrap();
        // Assigning twice is a no-op.
        wh.catalog.assign_item("L1", "B1", "SKU1").await.unwrap();
        assert_eq!(wh.catalog.bin_items("L1", "B1").await.unwrap().len(), 1);

        let err = domain(wh.catalog.delete_bin("L1", "B1").await.unwrap_err());
        assert!(matches!(err, DomainError::Conflict(_)));

        // The zone still contains the bin.
        let err = domain(wh.catalog.delete_zone("L1", "Z1").await.unwrap_err());
        assert!(matches!(err, DomainError::Conflict(_)));

        wh.catalog.unassign_item("L1", "B1", "SKU1").await.unwrap();
        let err = wh.catalog.unassign_item("L1", "B1", "SKU1").await.unwrap_err();
        assert!(err.is_not_found());

        wh.catalog.delete_bin("L1", "B1").await.unwrap();
        wh.catalog.delete_zone("L1", "Z1").await.unwrap();
        assert!(wh.catalog.list_bins("L1").await.unwrap().is_empty());
        assert!(wh.catalog.list_zones("L1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn zone_of_another_location_is_not_found() {
        let wh = seeded().await;
        wh.catalog.create_zone("L2", "Z2", "").await.unwrap();

        let err = wh.catalog.create_bin("L1", "Z2", "B1", "").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn empty_locations_can_be_deleted() {
        let wh = seeded().await;
        wh.ledger.record_in("SKU1", "L1", 1, None).await.unwrap();

        let err = domain(wh.catalog.delete_location("L1").await.unwrap_err());
        assert!(matches!(err, DomainError::Conflict(_)));

        wh.catalog.delete_location("L2").await.unwrap();
        let codes: Vec<String> = wh
            .catalog
            .list_locations()
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.code)
            .collect();
        assert_eq!(codes, vec!["L1".to_string()]);
    }

    // --- tracking --------------------------------------------------------------

    #[tokio::test]
    async fn tracking_is_set_replaced_and_cleared() {
        let wh = seeded().await;
        wh.orders.create_outbound("OUT-T").await.unwrap();
        assert_eq!(wh.tracking.get("OUT-T").await.unwrap(), None);

        let first = wh
            .tracking
            .set(" OUT-T ", " 1Z999 ", "https://t.example/1Z999", "UPS")
            .await
            .unwrap();
        assert_eq!(first.tracking_id, "1Z999");

        let second = wh.tracking.set("OUT-T", "1Z000", "", "").await.unwrap();
        assert_eq!(second.tracking_id, "1Z000");
        assert_eq!(second.tracking_url, "");
        assert_eq!(second.carrier, "UPS");
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(wh.tracking.get("OUT-T").await.unwrap(), Some(second));

        assert!(wh.tracking.clear("OUT-T").await.unwrap());
        assert!(!wh.tracking.clear("OUT-T").await.unwrap());
        assert_eq!(wh.tracking.get("OUT-T").await.unwrap(), None);
    }

    #[tokio::test]
    async fn tracking_is_kept_per_order() {
        let wh = seeded().await;
        wh.orders.create_outbound("OUT-T1").await.unwrap();
        wh.orders.create_inbound("IN-T2").await.unwrap();
        wh.tracking.set("OUT-T1", "A", "", "DHL").await.unwrap();
        wh.tracking.set("IN-T2", "B", "", "").await.unwrap();

        wh.tracking.clear("IN-T2").await.unwrap();
        let kept = wh.tracking.get("OUT-T1").await.unwrap().unwrap();
        assert_eq!((kept.tracking_id.as_str(), kept.carrier.as_str()), ("A", "DHL"));
    }

    #[tokio::test]
    async fn tracking_rejects_unknown_orders_and_blank_ids() {
        let wh = seeded().await;
        for err in [
            wh.tracking.set("NOPE", "1Z", "", "").await.unwrap_err(),
            wh.tracking.get("NOPE").await.unwrap_err(),
            wh.tracking.clear("NOPE").await.unwrap_err(),
        ] {
            assert!(err.is_not_found(), "{err:?}");
        }

        wh.orders.create_outbound("OUT-B").await.unwrap();
        let err = domain(wh.tracking.set("OUT-B", "  ", "", "UPS").await.unwrap_err());
        assert_eq!(err, DomainError::validation("tracking id cannot be empty"));
        let err = domain(wh.tracking.get(" ").await.unwrap_err());
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(wh.tracking.get("OUT-B").await.unwrap(), None);
    }

    #[tokio::test]
    async fn tracking_changes_are_audited() {
        let wh = seeded().await;
        wh.orders.create_outbound("OUT-TA").await.unwrap();
        wh.tracking.set("OUT-TA", "1Z", "", "UPS").await.unwrap();
        wh.tracking.clear("OUT-TA").await.unwrap();
        wh.tracking.clear("OUT-TA").await.unwrap();

        let entries = wh.audit.recent(Some(2)).await.unwrap();
        let actions: Vec<&str> = entries.iter().map(|e| e.action.as_str()).collect();
        assert_eq!(actions, vec!["orders.tracking.cleared", "orders.tracking.set"]);
        assert!(entries.iter().all(|e| e.entity == "tracking" && e.entity_ref == "OUT-TA"));
    }

    // --- audit -----------------------------------------------------------------

    #[tokio::test]
    async fn committed_changes_are_audited_with_the_actor() {
        let wh = seeded().await;
        wh.orders.create_inbound("IN-A").await.unwrap();
        wh.orders.add_line("IN-A", "SKU1", "L1", 2).await.unwrap();
        wh.orders.post("IN-A").await.unwrap();

        let entries = wh.audit.recent(Some(3)).await.unwrap();
        let actions: Vec<&str> = entries.iter().map(|e| e.action.as_str()).collect();
        assert_eq!(
            actions,
            vec![
                "orders.order.posted",
                "orders.order.line_added",
                "orders.order.created"
            ]
        );
        assert!(entries.iter().all(|e| e.actor == "tester"));
        assert!(entries.iter().all(|e| e.entity == "order" && e.entity_ref == "IN-A"));
    }

    #[tokio::test]
    async fn rolled_back_changes_leave_no_audit_entry() {
        let wh = seeded().await;
        let before = wh.audit.recent(Some(200)).await.unwrap().len();

        wh.ledger.record_out("SKU1", "L1", 1, None).await.unwrap_err();
        wh.catalog.create_item("SKU1", "dup", "").await.unwrap_err();

        assert_eq!(wh.audit.recent(Some(200)).await.unwrap().len(), before);
    }

    #[tokio::test]
    async fn audit_can_be_left_out() {
        let wh = Warehouse::in_memory();
        wh.catalog.create_item("SKU1", "Widget", "").await.unwrap();
        assert!(wh.audit.recent(None).await.unwrap().is_empty());
        assert!(wh.low_stock.is_none());
    }

    #[tokio::test]
    async fn configured_warehouse_registers_the_low_stock_monitor() {
        let config = crate::config::WmsConfig::default();
        let wh = Warehouse::from_config(&config).await.unwrap();
        wh.catalog.create_item("SKU1", "Widget", "").await.unwrap();
        wh.catalog.create_location("L1", "Main").await.unwrap();
        wh.ledger.record_in("SKU1", "L1", 4, None).await.unwrap();

        let monitor = wh.low_stock.as_ref().unwrap();
        let alert = monitor.check("SKU1").await.unwrap().unwrap();
        assert_eq!((alert.total, alert.threshold), (4, 10));
        assert!(monitor.check_with_threshold("SKU1", 4).await.unwrap().is_none());

        assert_eq!(wh.audit.recent(Some(1)).await.unwrap()[0].actor, "system");
    }

    // --- properties ------------------------------------------------------------

    mod properties {
        use proptest::prelude::*;

        use super::*;

        #[derive(Debug, Clone, Copy)]
        enum Op {
            In(i64),
            Out(i64),
        }

        fn op() -> impl Strategy<Value = Op> {
            prop_oneof![(1i64..50).prop_map(Op::In), (1i64..50).prop_map(Op::Out)]
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(64))]

            #[test]
            fn balance_is_the_sum_of_accepted_movements(ops in prop::collection::vec(op(), 1..40)) {
                let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
                let (expected, balance, movements, accepted) = rt.block_on(async {
                    let wh = seeded().await;
                    let mut expected = 0i64;
                    let mut accepted = 0usize;
                    for op in &ops {
                        match *op {
                            Op::In(q) => {
                                wh.ledger.record_in("SKU1", "L1", q, None).await.unwrap();
                                expected += q;
                                accepted += 1;
                            }
                            Op::Out(q) => match wh.ledger.record_out("SKU1", "L1", q, None).await {
                                Ok(_) => {
                                    expected -= q;
                                    accepted += 1;
                                }
                                Err(e) => assert!(q > expected, "rejected {q} with {expected} on hand: {e}"),
                            },
                        }
                    }
                    let balance = wh.ledger.stock_at("SKU1", "L1").await.unwrap();
                    let movements = wh.reporting.movement_history("SKU1").await.unwrap().len();
                    (expected, balance, movements, accepted)
                });

                prop_assert!(balance >= 0);
                prop_assert_eq!(balance, expected);
                prop_assert_eq!(movements, accepted);
            }
        }
    }
}
