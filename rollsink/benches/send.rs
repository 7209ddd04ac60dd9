//! Microbenchmarks for the `send_stringified()` hot path.
//!
//! Measures per-record latency through the lock, status check, encoding,
//! and buffered write.
//!
//! Run with: `cargo bench -p rollsink -- send`

#![allow(missing_docs)]

use std::time::Duration;

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use rollsink::backend::{LocalFsBackend, MemoryBackend};
use rollsink::clock::ManualClock;
use rollsink::config::DestinationConfig;
use rollsink::destination::RollingDestination;
use tempfile::tempdir;

/// 2024-01-01T00:00:00Z
const BASE_MILLIS: i64 = 1_704_067_200_000;

fn audit_line(len: usize) -> String {
    let prefix = "user=alice action=read resource=/data/";
    let mut line = String::with_capacity(len.max(prefix.len()));
    line.push_str(prefix);
    while line.len() < len {
        line.push('x');
    }
    line
}

fn memory_destination(
    config: DestinationConfig,
) -> (RollingDestination<MemoryBackend, ManualClock>, ManualClock) {
    let clock = ManualClock::at_millis(BASE_MILLIS);
    let destination =
        RollingDestination::with_clock(config, MemoryBackend::new(), clock.clone()).unwrap();
    destination.start();
    (destination, clock)
}

fn bench_send_line_size(c: &mut Criterion) {
    let mut group = c.benchmark_group("send/line_size");

    for len in [64, 256, 1024, 4096] {
        let config = DestinationConfig::new("/audit", "app.log")
            .with_flush_interval_seconds(3600)
            .with_rollover_interval_seconds(86_400);
        let (destination, _clock) = memory_destination(config);
        let line = audit_line(len);

        group.throughput(Throughput::Bytes(len as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), &line, |b, line| {
            b.iter(|| destination.send_stringified(black_box(line)));
        });
    }

    group.finish();
}

fn bench_send_utf16(c: &mut Criterion) {
    let config = DestinationConfig::new("/audit", "app.log")
        .with_flush_interval_seconds(3600)
        .with_encoding("UTF-16LE");
    let (destination, _clock) = memory_destination(config);
    let line = audit_line(256);

    c.bench_function("send/utf16le_256", |b| {
        b.iter(|| destination.send_stringified(black_box(&line)));
    });
}

fn bench_send_with_rollover(c: &mut Criterion) {
    let config = DestinationConfig::new("/audit/{time:%Y%m%d}", "app-{time:%H%M%S}.log")
        .with_flush_interval_seconds(1)
        .with_rollover_interval_seconds(1);
    let (destination, clock) = memory_destination(config);
    let line = audit_line(128);

    // Every iteration lands in a new window: close, resolve, create.
    c.bench_function("send/rollover_every_record", |b| {
        b.iter(|| {
            clock.advance(Duration::from_secs(1));
            destination.send_stringified(black_box(&line))
        });
    });
}

fn bench_send_local_fs(c: &mut Criterion) {
    let temp_dir = tempdir().unwrap();
    let config = DestinationConfig::new("/audit", "app.log").with_flush_interval_seconds(3600);
    let clock = ManualClock::at_millis(BASE_MILLIS);
    let destination =
        RollingDestination::with_clock(config, LocalFsBackend::with_root(temp_dir.path()), clock)
            .unwrap();
    destination.start();
    let line = audit_line(256);

    c.bench_function("send/local_fs_256", |b| {
        b.iter(|| destination.send_stringified(black_box(&line)));
    });

    destination.stop();
}

criterion_group!(
    benches,
    bench_send_line_size,
    bench_send_utf16,
    bench_send_with_rollover,
    bench_send_local_fs,
);
criterion_main!(benches);
