//! Frame Parser Benchmarks
//!
//! Measures the `FrameParser`'s line-splitting throughput under the shapes
//! that matter for the proxy's hot path: whole frames delivered in one
//! chunk, a frame deliberately split across chunks, and a batch of frames
//! concatenated into a single chunk.
//!
//! Benchmarks:
//! - Single small frame, one chunk
//! - Frame split across two chunks (mid-frame boundary)
//! - 100 frames concatenated into one chunk

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use mcp_dev_proxy::protocol::FrameParser;

fn sample_frame(id: u64) -> Vec<u8> {
    format!(
        "{{\"jsonrpc\":\"2.0\",\"id\":{id},\"method\":\"tools/call\",\"params\":{{\"name\":\"getText\",\"arguments\":{{\"message\":\"hello world\"}}}}}}\n"
    )
    .into_bytes()
}

fn bench_single_frame(c: &mut Criterion) {
    let frame = sample_frame(1);
    let mut group = c.benchmark_group("parser/single_frame");
    group.throughput(Throughput::Bytes(frame.len() as u64));
    group.bench_function("feed", |b| {
        b.iter(|| {
            let mut parser = FrameParser::new();
            black_box(parser.feed(black_box(&frame)));
        });
    });
    group.finish();
}

fn bench_split_frame(c: &mut Criterion) {
    let frame = sample_frame(1);
    let midpoint = frame.len() / 2;
    let (first_half, second_half) = frame.split_at(midpoint);
    let mut group = c.benchmark_group("parser/split_frame");
    group.throughput(Throughput::Bytes(frame.len() as u64));
    group.bench_function("feed_two_chunks", |b| {
        b.iter(|| {
            let mut parser = FrameParser::new();
            black_box(parser.feed(black_box(first_half)));
            black_box(parser.feed(black_box(second_half)));
        });
    });
    group.finish();
}

fn bench_batch_of_frames(c: &mut Criterion) {
    let mut batch = Vec::new();
    for i in 0..100u64 {
        batch.extend_from_slice(&sample_frame(i));
    }
    let mut group = c.benchmark_group("parser/batch_100_frames");
    group.throughput(Throughput::Bytes(batch.len() as u64));
    group.bench_function("feed", |b| {
        b.iter(|| {
            let mut parser = FrameParser::new();
            black_box(parser.feed(black_box(&batch)));
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_single_frame,
    bench_split_frame,
    bench_batch_of_frames
);
criterion_main!(benches);
