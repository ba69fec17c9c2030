//! Priority Queue Benchmarks
//!
//! Measures `PriorityQueue::drain` ordering cost under the queue depths a
//! proxy might accumulate while waiting for a server to (re)connect: a
//! small burst of mixed-priority frames, and a larger burst dominated by
//! notifications (the lowest priority class, so the worst case for the
//! stable sort).
//!
//! Benchmarks:
//! - Drain 16 mixed-priority entries
//! - Drain 1000 mostly-notification entries

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use mcp_dev_proxy::protocol::PriorityQueue;

fn push_mixed(queue: &mut PriorityQueue, count: usize) {
    for i in 0..count {
        let (raw, priority) = match i % 4 {
            0 => (Bytes::from_static(b"{\"method\":\"initialize\"}\n"), 100),
            1 => (Bytes::from_static(b"{\"id\":1,\"method\":\"x\"}\n"), 50),
            _ => (Bytes::from_static(b"{\"method\":\"notify\"}\n"), 10),
        };
        queue.push(raw, priority);
    }
}

fn bench_drain_small(c: &mut Criterion) {
    let mut group = c.benchmark_group("priority_queue/drain_16");
    group.throughput(Throughput::Elements(16));
    group.bench_function("mixed_priority", |b| {
        b.iter(|| {
            let mut queue = PriorityQueue::new();
            push_mixed(&mut queue, 16);
            black_box(queue.drain());
        });
    });
    group.finish();
}

fn bench_drain_large(c: &mut Criterion) {
    let mut group = c.benchmark_group("priority_queue/drain_1000");
    group.throughput(Throughput::Elements(1000));
    group.bench_function("notification_heavy", |b| {
        b.iter(|| {
            let mut queue = PriorityQueue::new();
            for i in 0..1000usize {
                if i % 50 == 0 {
                    queue.push(Bytes::from_static(b"{\"id\":1,\"method\":\"x\"}\n"), 50);
                } else {
                    queue.push(Bytes::from_static(b"{\"method\":\"notify\"}\n"), 10);
                }
            }
            black_box(queue.drain());
        });
    });
    group.finish();
}

criterion_group!(benches, bench_drain_small, bench_drain_large);
criterion_main!(benches);
