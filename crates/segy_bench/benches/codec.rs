use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::Rng;
use segy_core::samples::{decode, encode};
use segy_core::{ByteOrder, IndexType, KeyStats, SampleFormat, TraceIndex, TraceKey};

fn bench_samples(c: &mut Criterion) {
    let mut rng = rand::rng();
    let trace: Vec<f32> = (0..2000).map(|_| rng.random_range(-1.0e4f32..1.0e4)).collect();
    let ibm = encode(&trace, SampleFormat::IbmFloat, ByteOrder::BigEndian).unwrap();
    let ieee = encode(&trace, SampleFormat::IeeeFloat, ByteOrder::BigEndian).unwrap();
    c.bench_function("ibm_encode", |b| {
        b.iter(|| black_box(encode(&trace, SampleFormat::IbmFloat, ByteOrder::BigEndian).unwrap()))
    });
    c.bench_function("ibm_decode", |b| {
        b.iter(|| black_box(decode(&ibm, SampleFormat::IbmFloat, ByteOrder::BigEndian)))
    });
    c.bench_function("ieee_decode", |b| {
        b.iter(|| black_box(decode(&ieee, SampleFormat::IeeeFloat, ByteOrder::BigEndian)))
    });
}

fn bench_index(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let mut il = KeyStats::new(189);
    let mut xl = KeyStats::new(193);
    let mut entries = Vec::new();
    for i in 1..=500 {
        for x in 1..=500 {
            il.observe(i);
            xl.observe(x);
            entries.push((TraceKey::inline_xline(i, x), 3600 + entries.len() as u64 * 8240));
        }
    }
    let ix = TraceIndex::create(dir.path().join("b.ndx"), IndexType::PostStack3d, &[il, xl], &entries, 1 << 24)
        .unwrap();
    let mut rng = rand::rng();
    let probes: Vec<TraceKey> = (0..1024)
        .map(|_| TraceKey::inline_xline(rng.random_range(0..=520), rng.random_range(0..=520)))
        .collect();
    c.bench_function("index_lookup_1k", |b| {
        b.iter(|| probes.iter().filter_map(|k| black_box(ix.lookup(k))).count())
    });
}

criterion_group!(benches, bench_samples, bench_index);
criterion_main!(benches);
