//! Cost of sealing and opening records.
//!
//! Run with: `cargo bench --bench field_codec_benchmark`

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;

use incident_vault::codec::Document;
use incident_vault::keys::DEFAULT_KDF_SALT;
use incident_vault::{FieldCodec, FieldKey, KeyManager};

fn record(medical_len: usize) -> Document {
    let value = json!({
        "id": "bench-record",
        "summary": "Verbal altercation escalated to shoving",
        "location": "Dorm B common room",
        "youthName": "Jordan Smith",
        "youthDob": "2010-04-02",
        "medicalDetails": "x".repeat(medical_len),
    });
    match value {
        serde_json::Value::Object(map) => map,
        _ => unreachable!(),
    }
}

fn benchmark_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("field_codec");

    let key = incident_vault::generate_field_key().unwrap();
    let codec = FieldCodec::new(Arc::new(KeyManager::with_key(key, 1)));

    let sizes = [("100B", 100), ("1KB", 1024), ("10KB", 10 * 1024)];
    for (name, size) in sizes {
        let doc = record(size);
        let sealed = codec.encrypt_sensitive(doc.clone()).unwrap();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("seal", name), &doc, |b, doc| {
            b.iter(|| codec.encrypt_sensitive(black_box(doc.clone())).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("open", name), &sealed, |b, sealed| {
            b.iter(|| codec.decrypt_sensitive(black_box(sealed)).unwrap());
        });
    }

    group.finish();
}

fn benchmark_key_derivation(c: &mut Criterion) {
    let mut group = c.benchmark_group("key_derivation");
    group.sample_size(10); // PBKDF2 at 100k iterations is deliberately slow

    group.bench_function("pbkdf2_passphrase", |b| {
        b.iter(|| FieldKey::from_secret(black_box("correct horse battery staple"), DEFAULT_KDF_SALT).unwrap());
    });

    group.finish();
}

criterion_group!(benches, benchmark_codec, benchmark_key_derivation);
criterion_main!(benches);
