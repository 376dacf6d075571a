use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use rand::{Rng, SeedableRng, rngs::StdRng};

use mqlink::bridge;
use mqlink::codec::{Codec, V311Codec};
use mqlink::{QoS, topic};

fn random_payload(len: usize) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(0x6d71);
    (0..len).map(|_| rng.r#gen()).collect()
}

pub fn bench_topic_matching(c: &mut Criterion) {
    let cases = [
        ("sensors/+/temp", "sensors/kitchen/temp"),
        ("sensors/#", "sensors/kitchen/humidity/raw"),
        ("a/b/c/d/e/f", "a/b/c/d/e/f"),
        ("sensors/+/temp", "actuators/kitchen/temp"),
    ];
    let mut group = c.benchmark_group("topic_matching");
    group.bench_function("match_four_filters", |b| {
        b.iter(|| {
            let mut hits = 0;
            for (filter, name) in cases {
                if topic::matches(std::hint::black_box(filter), std::hint::black_box(name)) {
                    hits += 1;
                }
            }
            hits
        })
    });
    group.finish();
}

pub fn bench_publish_codec(c: &mut Criterion) {
    let payload = random_payload(256);
    let mut group = c.benchmark_group("publish_codec");
    group.throughput(Throughput::Bytes(payload.len() as u64));

    group.bench_function("encode", |b| {
        let mut buf = [0u8; 512];
        b.iter(|| {
            V311Codec
                .encode_publish(
                    false,
                    QoS::AtLeastOnce,
                    false,
                    42,
                    "tele/device/state",
                    std::hint::black_box(&payload),
                    &mut buf,
                )
                .unwrap()
        })
    });

    let mut frame = [0u8; 512];
    let len = V311Codec
        .encode_publish(
            false,
            QoS::AtLeastOnce,
            false,
            42,
            "tele/device/state",
            &payload,
            &mut frame,
        )
        .unwrap();
    group.bench_function("decode", |b| {
        b.iter(|| {
            V311Codec
                .decode_publish(std::hint::black_box(&frame[..len]))
                .unwrap()
        })
    });
    group.finish();
}

pub fn bench_envelope(c: &mut Criterion) {
    let payload = random_payload(256);
    let mut group = c.benchmark_group("envelope");
    group.throughput(Throughput::Bytes(payload.len() as u64));

    group.bench_function("encode_decode", |b| {
        let mut buf = [0u8; 512];
        b.iter(|| {
            let len = bridge::encode_envelope(
                QoS::AtLeastOnce,
                false,
                false,
                0,
                "tele/device/state",
                std::hint::black_box(&payload),
                &mut buf,
            )
            .unwrap();
            bridge::decode_envelope(&buf[..len]).unwrap()
        })
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_topic_matching,
    bench_publish_codec,
    bench_envelope
);
criterion_main!(benches);
