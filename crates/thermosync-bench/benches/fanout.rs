//! Fan-out benchmarks for Thermosync.
//!
//! `dispatch` measures one message written to N in-memory connections;
//! `hub_roundtrip` measures a message travelling from one client through the
//! whole hub back out to every client.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thermosync_core::{broadcast, Dispatcher, Hub, HubConfig, HubStats, Message, Registry};
use thermosync_protocol::MessageBody;
use thermosync_transport::memory;
use tokio::runtime::Runtime;
use tokio::sync::watch;

const SIZES: [usize; 4] = [1, 10, 100, 1000];

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
}

/// Benchmark a single fan-out through the dispatcher.
fn bench_dispatch(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("dispatch");

    for size in SIZES {
        let registry = Arc::new(Registry::new());
        let (_sender, receiver) = broadcast::channel(16);
        let (_shutdown, shutdown_rx) = watch::channel(false);
        let dispatcher = Dispatcher::new(
            Arc::clone(&registry),
            receiver,
            Arc::new(HubStats::default()),
            Duration::from_secs(5),
            shutdown_rx,
        );

        for _ in 0..size {
            let (connection, mut client) = memory::pair(memory::DEFAULT_CAPACITY);
            let (id, addr, sink, _stream) = connection.into_parts();
            registry.register(Arc::new(thermosync_core::ConnectionHandle::new(id, addr, sink)));
            // keep the client buffer from filling up
            rt.spawn(async move { while client.recv().await.is_some() {} });
        }

        let message = Message::new("bench".into(), MessageBody::new("x".repeat(64)));
        let dispatcher = &dispatcher;

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.to_async(&rt)
                .iter(|| dispatcher.dispatch(black_box(message.clone())));
        });
    }

    group.finish();
}

/// Benchmark client → hub → every client.
fn bench_hub_roundtrip(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("hub_roundtrip");

    for size in [1usize, 10, 100] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.to_async(&rt).iter_custom(move |iters| async move {
                let (hub, _dispatcher) = Hub::start(HubConfig::default());
                let mut clients = Vec::with_capacity(size);
                for _ in 0..size {
                    let (connection, client) = memory::pair(memory::DEFAULT_CAPACITY);
                    hub.accept(connection).await.unwrap();
                    clients.push(client);
                }
                let mut sender = clients.remove(0);

                let readers: Vec<_> = clients
                    .into_iter()
                    .map(|mut client| {
                        tokio::spawn(async move {
                            for _ in 0..iters {
                                client.recv().await;
                            }
                        })
                    })
                    .collect();

                let start = Instant::now();
                for _ in 0..iters {
                    sender.send_text(r#"{"text":"bench"}"#).await.unwrap();
                    sender.recv().await;
                }
                for reader in readers {
                    reader.await.unwrap();
                }
                let elapsed = start.elapsed();

                hub.shutdown().await;
                elapsed
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_dispatch, bench_hub_roundtrip);
criterion_main!(benches);
