//! Benchmarks for the request/decision hot path.
//!
//! Covers what happens between a card read and the actuator decision:
//! UID formatting, request encoding and decision decoding.
//!
//! Run benchmarks with:
//! ```sh
//! cargo bench --bench message_bench
//! ```

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use latchkey_bus::{AccessDecision, AccessRequest};
use latchkey_core::{CredentialId, format_uid};
use std::hint::black_box;

fn bench_format_uid(c: &mut Criterion) {
    let mut group = c.benchmark_group("format_uid");

    for len in [4usize, 7, 10] {
        let uid: Vec<u8> = (0..len as u8).map(|b| b.wrapping_mul(37)).collect();
        group.throughput(Throughput::Bytes(len as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), &uid, |b, uid| {
            b.iter(|| black_box(format_uid(black_box(uid))));
        });
    }

    group.finish();
}

fn bench_encode_request(c: &mut Criterion) {
    let credential = CredentialId::new([0x04, 0xA2, 0x3B, 0x9C]).unwrap();

    c.bench_function("encode_access_request", |b| {
        b.iter(|| {
            let payload = AccessRequest::new(black_box(&credential)).to_payload().unwrap();
            black_box(payload);
        });
    });
}

fn bench_decode_decision(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_decision");
    group.throughput(Throughput::Elements(1));

    let cases: [(&str, &[u8]); 3] = [
        ("open", br#"{"door":"open","message":"welcome"}"#),
        ("refused", br#"{"door":"closed","message":"unknown card"}"#),
        ("malformed", b"{\"door\":"),
    ];

    for (name, payload) in cases {
        group.bench_with_input(BenchmarkId::from_parameter(name), &payload, |b, payload| {
            b.iter(|| {
                let verdict = AccessDecision::decode(black_box(*payload)).map(|d| d.verdict());
                black_box(verdict).ok();
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_format_uid,
    bench_encode_request,
    bench_decode_decision
);
criterion_main!(benches);
