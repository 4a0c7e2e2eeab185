//! Benchmarks for the live frame parser.
//!
//! A reply of a few hundred tokens arrives as many small `data: ` lines, cut
//! at arbitrary byte boundaries. Parsing must stay well below the network
//! latency per fragment.

use std::time::Duration;

use cadence_delivery::frame::ChunkFrameParser;
use criterion::{criterion_group, criterion_main, Criterion};

/// Build a body of `tokens` content frames followed by a model and a done frame.
fn generate_body(tokens: usize) -> Vec<u8> {
    let mut body = String::new();
    for i in 0..tokens {
        body.push_str(&format!("data: {{\"content\":\"word{} \"}}\n", i));
        if i % 25 == 0 {
            body.push_str("event: keepalive\n\n");
        }
    }
    body.push_str("data: {\"model\":\"bench-model\"}\n");
    body.push_str("data: {\"done\":true}\n");
    body.into_bytes()
}

/// Cut `body` into fragments of `size` bytes, ignoring line boundaries.
fn fragment(body: &[u8], size: usize) -> Vec<&[u8]> {
    body.chunks(size).collect()
}

fn bench_frame_parsing(c: &mut Criterion) {
    let body = generate_body(500);

    let mut group = c.benchmark_group("frame_parsing");
    group.sample_size(100);
    group.measurement_time(Duration::from_secs(5));

    // Whole body in one fragment
    group.bench_function("single_fragment_500_tokens", |b| {
        b.iter(|| {
            let mut parser = ChunkFrameParser::new();
            parser.feed(&body)
        });
    });

    // Network-sized fragments
    let fragments = fragment(&body, 1024);
    group.bench_function("kib_fragments_500_tokens", |b| {
        b.iter(|| {
            let mut parser = ChunkFrameParser::new();
            let mut events = Vec::new();
            for f in &fragments {
                events.extend(parser.feed(f));
            }
            events
        });
    });

    // Worst case: every line split mid-payload
    let tiny = fragment(&body, 7);
    group.bench_function("seven_byte_fragments_500_tokens", |b| {
        b.iter(|| {
            let mut parser = ChunkFrameParser::new();
            let mut count = 0usize;
            for f in &tiny {
                count += parser.feed(f).len();
            }
            count
        });
    });

    group.finish();
}

criterion_group!(benches, bench_frame_parsing);
criterion_main!(benches);
