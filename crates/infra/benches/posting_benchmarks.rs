use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::Utc;
use tokio::runtime::Runtime;
use wms_core::{ItemId, LocationId, Quantity};
use wms_infra::Warehouse;
use wms_inventory::{Balances, ItemRef, LocationRef, MovementType, StockKey, StockMovement, balance_of};

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

/// Warehouse with `items` SKUs stocked at one location.
fn stocked_warehouse(rt: &Runtime, items: usize) -> Warehouse {
    let wh = Warehouse::in_memory();
    rt.block_on(async {
        wh.catalog.create_location("L1", "Main").await.unwrap();
        for i in 0..items {
            let sku = format!("SKU{i}");
            wh.catalog.create_item(&sku, "Bench item", "").await.unwrap();
            wh.ledger
                .record_in(&sku, "L1", 1_000_000, None)
                .await
                .unwrap();
        }
    });
    wh
}

fn bench_order_posting(c: &mut Criterion) {
    let mut group = c.benchmark_group("order_posting");
    let rt = runtime();

    for lines in [1usize, 10, 50] {
        group.throughput(Throughput::Elements(lines as u64));
        group.bench_with_input(BenchmarkId::new("outbound_lines", lines), &lines, |b, &lines| {
            let wh = stocked_warehouse(&rt, lines);
            let mut n = 0u64;
            b.iter(|| {
                n += 1;
                let number = format!("OUT-{n}");
                rt.block_on(async {
                    wh.orders.create_outbound(&number).await.unwrap();
                    for i in 0..lines {
                        wh.orders
                            .add_line(&number, &format!("SKU{i}"), "L1", 1)
                            .await
                            .unwrap();
                    }
                    black_box(wh.orders.post(&number).await.unwrap());
                });
            });
        });
    }

    group.finish();
}

fn bench_record_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("record_out");
    let rt = runtime();

    for history in [0usize, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::new("ledger_history", history), &history, |b, &history| {
            let wh = stocked_warehouse(&rt, 1);
            rt.block_on(async {
                for _ in 0..history {
                    wh.ledger.record_in("SKU0", "L1", 1, None).await.unwrap();
                }
            });
            b.iter(|| {
                rt.block_on(async {
                    black_box(wh.ledger.record_out("SKU0", "L1", 1, None).await.unwrap());
                });
            });
        });
    }

    group.finish();
}

fn bench_balance_arithmetic(c: &mut Criterion) {
    let mut group = c.benchmark_group("balance_arithmetic");
    let item = ItemRef {
        id: ItemId::new(),
        sku: "SKU0".to_string(),
    };
    let location = LocationRef {
        id: LocationId::new(),
        code: "L1".to_string(),
    };

    let movements: Vec<StockMovement> = (0..10_000)
        .map(|i| {
            let movement_type = if i % 3 == 0 { MovementType::Out } else { MovementType::In };
            StockMovement::new(
                movement_type,
                item.id,
                location.id,
                Quantity::new(1 + i % 7).unwrap(),
                None,
                Utc::now(),
            )
        })
        .collect();
    group.throughput(Throughput::Elements(movements.len() as u64));
    group.bench_function("balance_of_10k", |b| {
        b.iter(|| black_box(balance_of(movements.iter())));
    });

    group.bench_function("withdraw_running_balance", |b| {
        let key = StockKey::new(item.id, location.id);
        let qty = Quantity::new(1).unwrap();
        b.iter(|| {
            let mut balances: Balances = [(key, 1_000)].into_iter().collect();
            for _ in 0..1_000 {
                balances.withdraw(&item, &location, qty).unwrap();
            }
            black_box(balances.get(&key))
        });
    });

    group.finish();
}

criterion_group!(benches, bench_order_posting, bench_record_out, bench_balance_arithmetic);
criterion_main!(benches);
