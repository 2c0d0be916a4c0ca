use criterion::{Criterion, criterion_group, criterion_main};
use message_bus::{CommitMode, InMemoryBus, MessageBus, MessageBusExt};

fn bench_publish_single(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let bus = InMemoryBus::new();

    c.bench_function("bus/publish_single", |b| {
        b.iter(|| {
            rt.block_on(async {
                bus.publish_json("Bench", "order-1", &serde_json::json!({ "amount": 100 }))
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_publish_then_poll_100(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("bus/publish_then_poll_100", |b| {
        b.iter(|| {
            rt.block_on(async {
                let bus = InMemoryBus::new();
                let topics = vec!["Bench".to_string()];
                let mut sub = bus
                    .subscribe(&topics, "bench", CommitMode::Manual)
                    .await
                    .unwrap();

                for i in 0..100u32 {
                    bus.publish_json("Bench", &format!("order-{}", i % 10), &i)
                        .await
                        .unwrap();
                }
                for _ in 0..100 {
                    let message = sub.poll().await.unwrap();
                    sub.commit(&message).await.unwrap();
                }
            });
        });
    });
}

criterion_group!(benches, bench_publish_single, bench_publish_then_poll_100);
criterion_main!(benches);
