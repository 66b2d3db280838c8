//! Benchmarks for rumor handling and frame dispatch

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};

use tidings_core::{RumorTimestamp, Rumor};
use tidings_crypto::{sign_message, Identity};
use tidings_state::{AutoCreateChannels, InMemoryRepository, Ingest, RumorEngine, Subscribers};
use tidings_test::Mesh;
use tidings_wire::Incoming;

fn rumor_with(messages: usize) -> Rumor {
    let identity = Identity::from_bytes(&[3u8; 32]);
    let batch = (0..messages)
        .map(|n| sign_message(&identity, format!("payload-{n}").as_bytes()).unwrap())
        .collect();
    let mut rumor = Rumor::new("origin", 0, RumorTimestamp::new());
    rumor.messages.insert("/root/lao".to_string(), batch);
    rumor
}

fn bench_store_rumor(c: &mut Criterion) {
    let rumor = rumor_with(16);

    c.bench_function("store_rumor_16_messages", |b| {
        b.iter_batched(
            || (InMemoryRepository::new(), Subscribers::new(), RumorEngine::new("local")),
            |(repo, subs, engine)| {
                let ingest = Ingest::new(&repo, &subs, &AutoCreateChannels);
                engine.store_rumor(&ingest, black_box(&rumor)).unwrap()
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_parse_rumor_frame(c: &mut Criterion) {
    let frame = tidings_wire::rumor(&rumor_with(16)).unwrap();

    c.bench_function("parse_rumor_frame", |b| {
        b.iter(|| {
            let Ok(Incoming::Query(envelope)) = Incoming::parse(black_box(&frame)) else {
                panic!("rumor frame did not parse");
            };
            envelope.decode().unwrap()
        })
    });
}

fn bench_mesh_publish(c: &mut Criterion) {
    let identity = Identity::from_bytes(&[4u8; 32]);

    c.bench_function("mesh_4_hubs_publish", |b| {
        b.iter_batched(
            || {
                let mut mesh = Mesh::new(4);
                mesh.connect_all().unwrap();
                mesh.pump();
                mesh
            },
            |mut mesh| {
                let mut client = mesh.client(0, "bench");
                for n in 0..8 {
                    let message = sign_message(&identity, format!("m{n}").as_bytes()).unwrap();
                    client.publish("/root/lao", &message);
                }
                mesh.pump()
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_store_rumor, bench_parse_rumor_frame, bench_mesh_publish);
criterion_main!(benches);
