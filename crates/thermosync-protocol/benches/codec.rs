//! Codec benchmarks for the Thermosync protocol.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use serde_json::json;
use thermosync_protocol::{codec, Frame, MessageBody};

fn sample_body(text_len: usize) -> MessageBody {
    MessageBody::new("x".repeat(text_len))
        .with_sender("thermostat-42")
        .with_field("celsius", json!(21.5))
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    for (name, size) in [("64B", 64), ("1KB", 1024), ("64KB", 65536)] {
        let body = sample_body(size);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(name, |b| b.iter(|| codec::encode(black_box(&body))));
    }

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    for (name, size) in [("64B", 64), ("1KB", 1024), ("64KB", 65536)] {
        let body = sample_body(size);
        let text = codec::encode(&body).unwrap();
        let binary = codec::encode_binary(&body).unwrap();

        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_function(format!("json/{name}"), |b| {
            b.iter(|| codec::decode(black_box(&text)))
        });

        group.throughput(Throughput::Bytes(binary.len() as u64));
        group.bench_function(format!("msgpack/{name}"), |b| {
            b.iter(|| codec::decode(black_box(&binary)))
        });
    }

    group.finish();
}

fn bench_reencode(c: &mut Criterion) {
    let inbound = Frame::text(r#"{"sender":"a","text":"hi","room":"kitchen"}"#);

    c.bench_function("decode_then_encode", |b| {
        b.iter(|| {
            let body = codec::decode(black_box(&inbound)).unwrap();
            codec::encode(&body)
        })
    });
}

criterion_group!(benches, bench_encode, bench_decode, bench_reencode);
criterion_main!(benches);
