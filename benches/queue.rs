//! Queue benchmarks
//!
//! - Single-threaded push/pop round trips for both backends
//! - Multi-producer throughput into a single draining consumer

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use epochlog::queue::{LinkedQueue, RecordQueue, RingQueue};

const OPS_PER_THREAD: usize = 10_000;

fn bench_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("round_trip");
    group.throughput(Throughput::Elements(1));

    let linked = LinkedQueue::new();
    group.bench_function("linked", |b| {
        b.iter(|| {
            linked.push(black_box(42u64));
            black_box(linked.pop());
        })
    });
    linked.epoch().collect();

    let ring = RingQueue::new(1024);
    group.bench_function("ring", |b| {
        b.iter(|| {
            ring.try_push(black_box(42u64)).ok();
            black_box(ring.try_pop());
        })
    });

    group.finish();
}

/// `producers` threads push into `queue` while the bench thread drains it.
fn run_mpsc(queue: Arc<dyn RecordQueue<u64>>, producers: usize) {
    let handles: Vec<_> = (0..producers)
        .map(|_| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for i in 0..OPS_PER_THREAD as u64 {
                    let mut value = i;
                    while let Err(full) = queue.enqueue(value) {
                        value = full.into_inner();
                        thread::yield_now();
                    }
                }
            })
        })
        .collect();

    let total = producers * OPS_PER_THREAD;
    let mut received = 0;
    while received < total {
        match queue.dequeue() {
            Some(v) => {
                black_box(v);
                received += 1;
            }
            None => thread::yield_now(),
        }
    }
    for h in handles {
        h.join().unwrap();
    }
    queue.collect_garbage();
}

fn bench_concurrent_producers(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_producers");

    for producers in [1usize, 2, 4, 8] {
        group.throughput(Throughput::Elements((producers * OPS_PER_THREAD) as u64));

        group.bench_with_input(BenchmarkId::new("linked", producers), &producers, |b, &n| {
            b.iter(|| run_mpsc(Arc::new(LinkedQueue::new()), n))
        });

        group.bench_with_input(BenchmarkId::new("ring", producers), &producers, |b, &n| {
            b.iter(|| run_mpsc(Arc::new(RingQueue::new(4096)), n))
        });
    }

    group.finish();
}

criterion_group!(basic_benches, bench_round_trip);

criterion_group!(
    name = concurrent_benches;
    config = Criterion::default()
        .sample_size(20)
        .measurement_time(Duration::from_secs(5));
    targets = bench_concurrent_producers
);

criterion_main!(basic_benches, concurrent_benches);
