use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use feedbridge::Broker;

fn bench_subscribe_unsubscribe(c: &mut Criterion) {
    let broker = Broker::<u64>::new();
    c.bench_function("broker_subscribe_unsubscribe", |b| {
        b.iter(|| {
            let id = broker.subscribe("chan", |_: &u64| {}).unwrap();
            black_box(broker.unsubscribe(id))
        })
    });
}

fn bench_publish_no_listeners(c: &mut Criterion) {
    let broker = Broker::<u64>::new();
    c.bench_function("publish_0_listeners", |b| {
        b.iter(|| broker.publish("chan", black_box(1)).unwrap())
    });
}

fn bench_publish_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("publish_fanout");
    for listeners in [1usize, 10, 100] {
        let broker = Broker::<u64>::new();
        for _ in 0..listeners {
            broker
                .subscribe("chan", |n: &u64| {
                    black_box(*n);
                })
                .unwrap();
        }
        group.bench_with_input(
            BenchmarkId::from_parameter(listeners),
            &listeners,
            |b, _| b.iter(|| broker.publish("chan", black_box(42)).unwrap()),
        );
    }
    group.finish();
}

fn bench_publish_many_topics(c: &mut Criterion) {
    let broker = Broker::<u64>::new();
    let topics: Vec<String> = (0..256).map(|i| format!("topic:{i}")).collect();
    for topic in &topics {
        broker.subscribe(topic, |_: &u64| {}).unwrap();
    }
    c.bench_function("publish_256_topics_round_robin", |b| {
        let mut i = 0usize;
        b.iter(|| {
            let topic = &topics[i % topics.len()];
            i += 1;
            broker.publish(topic, black_box(7)).unwrap()
        })
    });
}

criterion_group!(
    benches,
    bench_subscribe_unsubscribe,
    bench_publish_no_listeners,
    bench_publish_fanout,
    bench_publish_many_topics,
);
criterion_main!(benches);
