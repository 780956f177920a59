//! Criterion benchmarks for the SwordFish envelope codec.
//!
//! Measures framing, parsing and stream reassembly for every catalog message.
//!
//! Run with:
//! ```bash
//! cargo bench --package swordfish-core --bench envelope_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use swordfish_core::{Direction, Envelope, FrameAccumulator, Ping, SwordFishMessage, VersionData};

// ── Message fixtures ──────────────────────────────────────────────────────────

fn fixtures() -> Vec<(&'static str, SwordFishMessage)> {
    vec![
        ("Ping", Ping.into()),
        ("VersionData", VersionData::new(3, 0x0102, [0xA5; 8]).into()),
    ]
}

/// Device replies as they would appear on the wire.
fn reply_stream(count: u16) -> Vec<u8> {
    let mut stream = Vec::new();
    for id in 0..count {
        let request = Envelope::wrap(id, VersionData::empty());
        let reply = Envelope::reply_to(&request, VersionData::new(1, id, [0x11; 8]));
        stream.extend_from_slice(&reply.to_bytes());
    }
    stream
}

// ── Benchmark groups ──────────────────────────────────────────────────────────

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("envelope_encode");
    for (name, msg) in fixtures() {
        group.bench_with_input(BenchmarkId::new("msg", name), &msg, |b, msg| {
            b.iter(|| Envelope::wrap(black_box(1), msg.clone()).to_bytes())
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("envelope_decode");
    for (name, msg) in fixtures() {
        let bytes = Envelope::wrap(1, msg).to_bytes();
        group.bench_with_input(BenchmarkId::new("msg", name), &bytes, |b, bytes| {
            b.iter(|| Envelope::from_bytes(black_box(bytes)).expect("decode must succeed"))
        });
    }
    group.finish();
}

/// Feeds a stream of 32 replies in 7-byte chunks, the worst case for a slow
/// serial driver.
fn bench_accumulate(c: &mut Criterion) {
    let stream = reply_stream(32);
    c.bench_function("accumulate_chunked_32", |b| {
        b.iter(|| {
            let mut acc = FrameAccumulator::new(Direction::FromDevice);
            let mut frames = 0;
            for chunk in black_box(&stream).chunks(7) {
                acc.push(chunk);
                while acc.next_envelope().is_some() {
                    frames += 1;
                }
            }
            frames
        })
    });
}

criterion_group!(benches, bench_encode, bench_decode, bench_accumulate);
criterion_main!(benches);
