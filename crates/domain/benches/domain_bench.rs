use common::{FaultToggles, OrderId};
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{
    DEFAULT_ACCOUNT, InMemoryLedger, InMemoryOrders, InMemoryPayments, LedgerService,
    OrderService, PaymentService,
};
use rust_decimal_macros::dec;

fn bench_create_order(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let orders = InMemoryOrders::new();

    c.bench_function("domain/create_order", |b| {
        b.iter(|| {
            rt.block_on(async {
                orders.create(dec!(100)).await.unwrap();
            });
        });
    });
}

fn bench_debit_and_reverse(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let ledger = InMemoryLedger::new();

    c.bench_function("domain/debit_and_reverse", |b| {
        b.iter(|| {
            rt.block_on(async {
                let order_id = OrderId::new();
                ledger
                    .debit(order_id, DEFAULT_ACCOUNT, dec!(1), "bench")
                    .await
                    .unwrap();
                ledger.reverse(order_id, "bench").await.unwrap();
            });
        });
    });
}

fn bench_full_checkout(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let ledger = InMemoryLedger::new();
    let payments = InMemoryPayments::new();
    let orders = InMemoryOrders::new();
    let toggles = FaultToggles::default();

    c.bench_function("domain/full_checkout", |b| {
        b.iter(|| {
            rt.block_on(async {
                let order = orders.create(dec!(1)).await.unwrap();
                let receipt = ledger
                    .debit(order.id, DEFAULT_ACCOUNT, order.amount, "bench")
                    .await
                    .unwrap();
                let payment = payments
                    .charge(order.id, receipt.transaction.id, receipt.transaction.amount)
                    .await
                    .unwrap();
                payments
                    .request_gateway(payment.id, payment.amount, &toggles)
                    .await
                    .unwrap();
                ledger.reverse(order.id, "bench").await.unwrap();
                orders.mark_success(order.id).await.unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_create_order,
    bench_debit_and_reverse,
    bench_full_checkout
);
criterion_main!(benches);
