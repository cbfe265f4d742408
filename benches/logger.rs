//! Logger benchmarks
//!
//! - Line formatting cost for event and commit records
//! - End-to-end append-to-disk throughput with concurrent producers

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::prelude::*;
use tempfile::tempdir;

use epochlog::logger::{format_record, AsyncLogger, LoggerConfig, QueueBackend};
use epochlog::record::{Operation, Outcome, OutcomeCode, Record, Severity};

const RECORDS_PER_THREAD: usize = 5_000;

fn random_params(rng: &mut StdRng) -> String {
    let len = rng.gen_range(8..128);
    (0..len).map(|_| rng.gen_range(b'a'..=b'z') as char).collect()
}

fn bench_format(c: &mut Criterion) {
    let mut group = c.benchmark_group("format");
    let mut rng = StdRng::seed_from_u64(7);

    let event = Record::event(Severity::Info, random_params(&mut rng));
    let commit = Record::commit(
        "0f0e0d0c-0b0a-4908-8706-050403020100",
        Operation::Upload,
        "ipv4:10.1.2.3:50000",
        "127.0.0.1:50051",
        random_params(&mut rng),
        Outcome::failed(
            OutcomeCode::UNAVAILABLE,
            Duration::from_micros(1_250),
            "backend unavailable",
        ),
    );

    let mut line = String::with_capacity(256);
    group.bench_function("event", |b| {
        b.iter(|| {
            line.clear();
            format_record(black_box(&event), &mut line);
        })
    });
    group.bench_function("commit", |b| {
        b.iter(|| {
            line.clear();
            format_record(black_box(&commit), &mut line);
        })
    });

    group.finish();
}

fn run_logger(queue: QueueBackend, producers: usize) {
    let dir = tempdir().unwrap();
    let config = LoggerConfig::new(dir.path()).with_queue(queue);
    let logger = Arc::new(AsyncLogger::new(config).unwrap());
    logger.start().unwrap();

    let handles: Vec<_> = (0..producers)
        .map(|t| {
            let logger = Arc::clone(&logger);
            thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(t as u64);
                for _ in 0..RECORDS_PER_THREAD {
                    logger.append(Record::event(Severity::Info, random_params(&mut rng)));
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    logger.stop().unwrap();
}

fn bench_end_to_end(c: &mut Criterion) {
    let mut group = c.benchmark_group("end_to_end");

    for producers in [1usize, 4] {
        group.throughput(Throughput::Elements(
            (producers * RECORDS_PER_THREAD) as u64,
        ));
        group.bench_with_input(BenchmarkId::new("linked", producers), &producers, |b, &n| {
            b.iter(|| run_logger(QueueBackend::Linked, n))
        });
        group.bench_with_input(BenchmarkId::new("ring", producers), &producers, |b, &n| {
            b.iter(|| {
                run_logger(
                    QueueBackend::Ring {
                        capacity: 8192,
                        policy: epochlog::queue::FullPolicy::Block {
                            timeout: Duration::from_secs(1),
                        },
                    },
                    n,
                )
            })
        });
    }

    group.finish();
}

criterion_group!(basic_benches, bench_format);

criterion_group!(
    name = disk_benches;
    config = Criterion::default()
        .sample_size(10)
        .measurement_time(Duration::from_secs(10));
    targets = bench_end_to_end
);

criterion_main!(basic_benches, disk_benches);
